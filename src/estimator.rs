use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{combination::{combine, CombinationOperator, CombinedInterpolant, PartialResults}, config::{ApproximationMode, ErrorStrategy}, domain::BoundingBox, errors::{CombiError, Result}, grids::full_grid::evaluate_expansion, multi_index::{lower_corners, LevelVector}, objective::Objective};

///
/// Known solution used by the analytic strategy: the exact integral for
/// quadrature, sample points with values for interpolation and spectral mode.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSolution
{
    pub integral: Option<Vec<f64>>,
    pub points: Vec<Vec<f64>>,
    pub values: Vec<Vec<f64>>,
}

impl ReferenceSolution
{
    pub fn from_integral(integral: Vec<f64>) -> Self
    {
        Self { integral: Some(integral), ..Default::default() }
    }

    ///
    /// Sample `objective` at `points` to build a reference set.
    ///
    pub fn sample(objective: &dyn Objective, points: Vec<Vec<f64>>) -> Result<Self>
    {
        let values = points.iter()
            .map(|p| objective.eval(p).map_err(|e| CombiError::EvaluationFailed { point: p.clone(), cause: e.to_string() }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { integral: None, points, values })
    }
}

///
/// Signed stencil `{(l - e, (-1)^|e|)}` whose combination is the surplus of `level`.
///
pub fn surplus_stencil(level: &[u32], minimum: &[u32]) -> Vec<(LevelVector, i64)>
{
    lower_corners(level, minimum)
}

///
/// Scores frontier candidates by the error reduction they are expected to
/// bring. Scores are non-negative and comparable across candidates.
///
#[derive(Debug, Clone)]
pub struct ErrorEstimator
{
    strategy: ErrorStrategy,
    mode: ApproximationMode,
    num_outputs: usize,
    cost_weight: f64,
    bounding_box: BoundingBox,
    minimum: LevelVector,
    reference: Option<ReferenceSolution>,
}

impl ErrorEstimator
{
    pub fn new(strategy: ErrorStrategy, mode: ApproximationMode, num_outputs: usize, cost_weight: f64, bounding_box: BoundingBox, minimum: LevelVector) -> Self
    {
        Self { strategy, mode, num_outputs, cost_weight, bounding_box, minimum, reference: None }
    }

    pub fn strategy(&self) -> ErrorStrategy
    {
        self.strategy
    }

    pub fn reference(&self) -> Option<&ReferenceSolution>
    {
        self.reference.as_ref()
    }

    ///
    /// Attach the reference solution, checking it carries what the mode needs.
    ///
    pub fn set_reference(&mut self, reference: ReferenceSolution) -> Result<()>
    {
        match self.mode
        {
            ApproximationMode::Quadrature =>
            {
                let Some(integral) = &reference.integral else {
                    return Err(CombiError::InvalidConfiguration("the analytic quadrature strategy needs a reference integral".to_string()));
                };
                if integral.len() != self.num_outputs
                {
                    return Err(CombiError::DimensionMismatch { expected: self.num_outputs, found: integral.len() });
                }
            },
            ApproximationMode::Interpolation | ApproximationMode::Spectral =>
            {
                if reference.points.is_empty() || reference.points.len() != reference.values.len()
                {
                    return Err(CombiError::InvalidConfiguration("the analytic strategy needs reference points with one value each".to_string()));
                }
                let ndim = self.bounding_box.ndim();
                if let Some(p) = reference.points.iter().find(|p| p.len() != ndim)
                {
                    return Err(CombiError::DimensionMismatch { expected: ndim, found: p.len() });
                }
                if let Some(p) = reference.points.iter().find(|p| !self.bounding_box.contains(p))
                {
                    return Err(CombiError::InvalidConfiguration(format!("reference point {p:?} lies outside the domain")));
                }
                if let Some(v) = reference.values.iter().find(|v| v.len() != self.num_outputs)
                {
                    return Err(CombiError::DimensionMismatch { expected: self.num_outputs, found: v.len() });
                }
            },
        }
        self.reference = Some(reference);
        Ok(())
    }

    ///
    /// Whether scores depend on the current combination and must be refreshed
    /// after every activation.
    ///
    pub fn requires_rescoring(&self) -> bool
    {
        self.strategy == ErrorStrategy::Analytic
    }

    /// Relevance: `max(w |delta|, (1 - w) / N)` with `N` the candidate's point count.
    #[inline]
    fn weighted(&self, norm: f64, num_points: usize) -> f64
    {
        (self.cost_weight * norm).max((1.0 - self.cost_weight) / num_points as f64)
    }

    ///
    /// Size of the surplus of `level` in the norm of the approximation mode.
    ///
    pub fn surplus_norm(&self, level: &[u32], partials: &PartialResults) -> Result<f64>
    {
        let stencil: BTreeMap<LevelVector, i64> = surplus_stencil(level, &self.minimum).into_iter().collect();
        let norm = match self.mode
        {
            ApproximationMode::Quadrature =>
            {
                let delta = combine(self.mode, self.num_outputs, &stencil, partials)?;
                delta.integral.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
            },
            ApproximationMode::Interpolation =>
            {
                let candidate = partials.get(level)
                    .ok_or_else(|| CombiError::NumericalDegeneracy(format!("no evaluated full grid for {level:?}")))?;
                let delta = CombinedInterpolant::new(self.num_outputs, &stencil, partials)?;
                candidate.grid.points()
                    .flat_map(|p| delta.eval(&p))
                    .fold(0.0_f64, |m, v| m.max(v.abs()))
            },
            ApproximationMode::Spectral =>
            {
                let delta = combine(self.mode, self.num_outputs, &stencil, partials)?;
                delta.spectral.unwrap_or_default().values().flatten().map(|c| c * c).sum::<f64>().sqrt()
            },
        };
        Ok(norm)
    }

    /// Error of the combination with `terms` against the reference solution.
    fn reference_error(&self, terms: &BTreeMap<LevelVector, i64>, partials: &PartialResults) -> Result<f64>
    {
        let reference = self.reference.as_ref()
            .ok_or_else(|| CombiError::InvalidConfiguration("the analytic strategy needs a reference solution".to_string()))?;
        let rms = |approximations: Vec<Vec<f64>>| -> f64 {
            let (sum, count) = approximations.iter().zip(&reference.values)
                .flat_map(|(a, v)| a.iter().zip(v))
                .fold((0.0, 0usize), |(s, n), (a, v)| (s + (a - v) * (a - v), n + 1));
            (sum / count.max(1) as f64).sqrt()
        };
        match self.mode
        {
            ApproximationMode::Quadrature =>
            {
                let integral = reference.integral.as_ref()
                    .ok_or_else(|| CombiError::InvalidConfiguration("the analytic quadrature strategy needs a reference integral".to_string()))?;
                let aggregate = combine(self.mode, self.num_outputs, terms, partials)?;
                Ok(aggregate.integral.iter().zip(integral).fold(0.0_f64, |m, (a, r)| m.max((a - r).abs())))
            },
            ApproximationMode::Interpolation =>
            {
                let interpolant = CombinedInterpolant::new(self.num_outputs, terms, partials)?;
                Ok(rms(reference.points.iter().map(|p| interpolant.eval(p)).collect()))
            },
            ApproximationMode::Spectral =>
            {
                let coefficients = combine(self.mode, self.num_outputs, terms, partials)?.spectral.unwrap_or_default();
                Ok(rms(reference.points.iter()
                    .map(|p| evaluate_expansion(&coefficients, &self.bounding_box.to_unit_coordinate(p), self.num_outputs))
                    .collect()))
            },
        }
    }

    ///
    /// Score of a candidate that has not been evaluated: the mean surplus norm
    /// of its downward neighbors, weighted against the candidate's `num_points`.
    /// Every downward neighbor must be active with a recorded surplus.
    ///
    pub fn estimate_priority(&self, level: &[u32], surpluses: &BTreeMap<LevelVector, f64>, num_points: usize) -> Result<f64>
    {
        let mut sum = 0.0;
        let mut count = 0;
        for d in (0..level.len()).filter(|&d| level[d] > self.minimum[d])
        {
            let mut below = level.to_owned();
            below[d] -= 1;
            sum += surpluses.get(&below)
                .ok_or_else(|| CombiError::NumericalDegeneracy(format!("no surplus recorded for {below:?}")))?;
            count += 1;
        }
        if count == 0
        {
            return Err(CombiError::NumericalDegeneracy(format!("{level:?} has no downward neighbors to estimate from")));
        }
        let score = self.weighted(sum / count as f64, num_points);
        if !score.is_finite()
        {
            return Err(CombiError::NumericalDegeneracy(format!("priority of {level:?} is not finite")));
        }
        Ok(score)
    }

    ///
    /// Score of the evaluated candidate `level` given the current combination.
    ///
    pub fn estimate(&self, level: &[u32], current: &CombinationOperator, partials: &PartialResults) -> Result<f64>
    {
        let candidate = partials.get(level)
            .ok_or_else(|| CombiError::NumericalDegeneracy(format!("no evaluated full grid for {level:?}")))?;
        let norm = match self.strategy
        {
            ErrorStrategy::Surplus => self.surplus_norm(level, partials)?,
            ErrorStrategy::Analytic =>
            {
                let before = self.reference_error(current.terms(), partials)?;
                let after = self.reference_error(&current.merged_terms(&surplus_stencil(level, &self.minimum)), partials)?;
                (before - after).max(0.0)
            },
        };
        let score = self.weighted(norm, candidate.grid.len());
        if !score.is_finite()
        {
            return Err(CombiError::NumericalDegeneracy(format!("score of {level:?} is not finite")));
        }
        Ok(score)
    }
}

#[cfg(test)]
use crate::{cache::EvaluationCache, evaluator::FullGridEvaluator, multi_index::MultiIndexSet, objective::ScalarFunction, one_dimensional_nodes::NodeRule, rules::NodeRuleKind};

#[cfg(test)]
fn setup(mode: ApproximationMode, levels: &[[u32; 2]], f: &dyn Objective) -> (CombinationOperator, PartialResults)
{
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal); 2], 1, mode);
    let mut cache = EvaluationCache::new(2, 1);
    let mut set = MultiIndexSet::new(2);
    let mut operator = CombinationOperator::new(mode, 1);
    let mut partials = PartialResults::default();
    for level in levels
    {
        partials.insert(level.to_vec(), evaluator.evaluate(level, f, &mut cache).unwrap().0);
        operator.apply(&set.activate(level).unwrap());
    }
    (operator, partials)
}

#[test]
fn check_surplus_stencil()
{
    let stencil = surplus_stencil(&[1, 2], &[0, 0]);
    assert_eq!(stencil, vec![(vec![1, 2], 1), (vec![0, 2], -1), (vec![1, 1], -1), (vec![0, 1], 1)]);
    assert_eq!(surplus_stencil(&[0, 2], &[0, 0]), vec![(vec![0, 2], 1), (vec![0, 1], -1)]);
}

#[test]
fn check_surplus_is_integral_increment()
{
    let f = ScalarFunction(|x: &[f64]| (x[0] * 3.0).exp() + x[1] * x[1]);
    let (operator, mut partials) = setup(ApproximationMode::Quadrature, &[[0, 0], [1, 0], [0, 1]], &f);
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal); 2], 1, ApproximationMode::Quadrature);
    let mut cache = EvaluationCache::new(2, 1);
    partials.insert(vec![2, 0], evaluator.evaluate(&[2, 0], &f, &mut cache).unwrap().0);
    let estimator = ErrorEstimator::new(ErrorStrategy::Surplus, ApproximationMode::Quadrature, 1, 1.0, BoundingBox::unit(2), vec![0, 0]);
    let score = estimator.estimate(&[2, 0], &operator, &partials).unwrap();
    // adding (2,0) changes the combined integral by exactly the surplus
    let before = operator.combine(&partials).unwrap().integral[0];
    let after = combine(ApproximationMode::Quadrature, 1, &operator.merged_terms(&surplus_stencil(&[2, 0], &[0, 0])), &partials).unwrap().integral[0];
    assert!((score - (after - before).abs()).abs() < 1e-14);
    assert!(score > 0.0);
    // cost weighting favours cheap candidates when the surplus vanishes
    let cheap = ErrorEstimator::new(ErrorStrategy::Surplus, ApproximationMode::Quadrature, 1, 0.0, BoundingBox::unit(2), vec![0, 0]);
    assert_eq!(cheap.estimate(&[2, 0], &operator, &partials).unwrap(), 1.0 / 10.0);
}

#[test]
fn check_interpolation_surplus()
{
    // linear functions are reproduced by every trapezoidal grid: zero surplus
    let f = ScalarFunction(|x: &[f64]| 2.0 * x[0] - x[1]);
    let (operator, partials) = setup(ApproximationMode::Interpolation, &[[0, 0], [1, 0], [0, 1], [1, 1]], &f);
    let estimator = ErrorEstimator::new(ErrorStrategy::Surplus, ApproximationMode::Interpolation, 1, 1.0, BoundingBox::unit(2), vec![0, 0]);
    assert!(estimator.estimate(&[1, 1], &operator, &partials).unwrap() < 1e-14);
}

#[test]
fn check_analytic_strategy()
{
    let f = ScalarFunction(|x: &[f64]| x[0] * x[0]);
    let (operator, partials) = setup(ApproximationMode::Quadrature, &[[0, 0], [1, 0]], &f);
    let mut estimator = ErrorEstimator::new(ErrorStrategy::Analytic, ApproximationMode::Quadrature, 1, 1.0, BoundingBox::unit(2), vec![0, 0]);
    assert!(estimator.set_reference(ReferenceSolution::default()).is_err());
    estimator.set_reference(ReferenceSolution::from_integral(vec![1.0 / 3.0])).unwrap();
    assert!(estimator.requires_rescoring());
    // refining y cannot improve the integral of a function of x alone
    let mut partials = partials;
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal); 2], 1, ApproximationMode::Quadrature);
    let mut cache = EvaluationCache::new(2, 1);
    partials.insert(vec![0, 1], evaluator.evaluate(&[0, 1], &f, &mut cache).unwrap().0);
    partials.insert(vec![2, 0], evaluator.evaluate(&[2, 0], &f, &mut cache).unwrap().0);
    assert_eq!(estimator.estimate(&[0, 1], &operator, &partials).unwrap(), 0.0);
    let gain = estimator.estimate(&[2, 0], &operator, &partials).unwrap();
    // trapezoidal errors of x^2: 1/24 at level 1, 1/96 at level 2
    assert!((gain - (1.0 / 24.0 - 1.0 / 96.0)).abs() < 1e-14);
}

#[test]
fn check_reference_sampling()
{
    let f = ScalarFunction(|x: &[f64]| x[0] + x[1]);
    let reference = ReferenceSolution::sample(&f, vec![vec![0.1, 0.2], vec![0.5, 0.5]]).unwrap();
    assert_eq!(reference.values, vec![vec![0.1 + 0.2], vec![1.0]]);
    let mut estimator = ErrorEstimator::new(ErrorStrategy::Analytic, ApproximationMode::Interpolation, 1, 1.0, BoundingBox::unit(2), vec![0, 0]);
    estimator.set_reference(reference).unwrap();
    let mut estimator_3d = ErrorEstimator::new(ErrorStrategy::Analytic, ApproximationMode::Spectral, 1, 1.0, BoundingBox::unit(3), vec![0, 0, 0]);
    assert!(matches!(estimator_3d.set_reference(estimator.reference().cloned().unwrap_or_default()), Err(CombiError::DimensionMismatch { .. })));
    let outside = ReferenceSolution::sample(&f, vec![vec![0.5, 1.5]]).unwrap();
    assert!(matches!(estimator.set_reference(outside), Err(CombiError::InvalidConfiguration(_))));
}

#[test]
fn check_priority_estimate()
{
    let estimator = ErrorEstimator::new(ErrorStrategy::Surplus, ApproximationMode::Quadrature, 1, 1.0, BoundingBox::unit(2), vec![0, 0]);
    let surpluses: BTreeMap<LevelVector, f64> = [(vec![0, 0], 0.5), (vec![1, 0], 0.1), (vec![0, 1], 0.3)].into_iter().collect();
    assert_eq!(estimator.estimate_priority(&[1, 1], &surpluses, 9).unwrap(), 0.2);
    assert_eq!(estimator.estimate_priority(&[2, 0], &surpluses, 5).unwrap(), 0.1);
    assert!(matches!(estimator.estimate_priority(&[2, 1], &surpluses, 15), Err(CombiError::NumericalDegeneracy(_))));
    assert!(estimator.estimate_priority(&[0, 0], &surpluses, 1).is_err());
    let cheap = ErrorEstimator::new(ErrorStrategy::Surplus, ApproximationMode::Quadrature, 1, 0.0, BoundingBox::unit(2), vec![0, 0]);
    assert_eq!(cheap.estimate_priority(&[1, 1], &surpluses, 8).unwrap(), 1.0 / 8.0);
}
