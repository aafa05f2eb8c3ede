use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{config::ApproximationMode, errors::{CombiError, Result}, evaluator::PartialResult, grids::full_grid::SpectralCoefficients, multi_index::{ActivationDelta, LevelVector}};

/// Evaluated full grids by level vector.
pub type PartialResults = FxHashMap<LevelVector, PartialResult>;

///
/// Combined sparse grid result. The integral is always available, spectral
/// coefficients only in spectral mode.
///
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate
{
    pub integral: Vec<f64>,
    #[serde_as(as = "Option<Vec<(_, _)>>")]
    pub spectral: Option<SpectralCoefficients>,
}

fn lookup<'a>(partials: &'a PartialResults, level: &[u32]) -> Result<&'a PartialResult>
{
    partials.get(level).ok_or_else(|| CombiError::NumericalDegeneracy(format!("no evaluated full grid for {level:?}")))
}

///
/// Weighted sum `sum_l c(l) R(l)` over `terms`. Terms are visited in
/// lexicographic order so the result only depends on the set of terms.
///
pub fn combine(mode: ApproximationMode, num_outputs: usize, terms: &BTreeMap<LevelVector, i64>, partials: &PartialResults) -> Result<Aggregate>
{
    let mut integral = vec![0.0; num_outputs];
    let mut spectral = match mode
    {
        ApproximationMode::Spectral => Some(SpectralCoefficients::new()),
        _ => None,
    };
    for (level, &coefficient) in terms.iter().filter(|(_, &c)| c != 0)
    {
        let partial = lookup(partials, level)?;
        let c = coefficient as f64;
        integral.iter_mut().zip(&partial.integral).for_each(|(a, &v)| *a += c * v);
        if let Some(spectral) = spectral.as_mut()
        {
            let coefficients = partial.spectral.as_ref()
                .ok_or_else(|| CombiError::NumericalDegeneracy(format!("full grid {level:?} has no spectral coefficients")))?;
            for (degree, values) in coefficients
            {
                let entry = spectral.entry(degree.clone()).or_insert_with(|| vec![0.0; num_outputs]);
                entry.iter_mut().zip(values).for_each(|(a, &v)| *a += c * v);
            }
        }
    }
    Ok(Aggregate { integral, spectral })
}

///
/// Callable combined interpolant, borrowing the evaluated full grids.
///
pub struct CombinedInterpolant<'a>
{
    num_outputs: usize,
    terms: Vec<(f64, &'a PartialResult)>,
}

impl<'a> CombinedInterpolant<'a>
{
    pub fn new(num_outputs: usize, terms: &BTreeMap<LevelVector, i64>, partials: &'a PartialResults) -> Result<Self>
    {
        let terms = terms.iter().filter(|(_, &c)| c != 0)
            .map(|(level, &c)| lookup(partials, level).map(|p| (c as f64, p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { num_outputs, terms })
    }

    pub fn len(&self) -> usize
    {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn eval(&self, x: &[f64]) -> Vec<f64>
    {
        let mut y = vec![0.0; self.num_outputs];
        for (coefficient, partial) in &self.terms
        {
            partial.grid.interpolate(x, &partial.values, &mut y, *coefficient);
        }
        y
    }
}

///
/// Maintains the non-zero combination coefficients of the active set and
/// combines partial results with them.
///
#[derive(Debug, Clone)]
pub struct CombinationOperator
{
    mode: ApproximationMode,
    num_outputs: usize,
    terms: BTreeMap<LevelVector, i64>,
}

impl CombinationOperator
{
    pub fn new(mode: ApproximationMode, num_outputs: usize) -> Self
    {
        Self { mode, num_outputs, terms: BTreeMap::new() }
    }

    pub fn mode(&self) -> ApproximationMode
    {
        self.mode
    }

    /// Non-zero coefficients in lexicographic order.
    pub fn terms(&self) -> &BTreeMap<LevelVector, i64>
    {
        &self.terms
    }

    ///
    /// Update the coefficient table with the changes of one activation.
    /// Only the touched terms change.
    ///
    pub fn apply(&mut self, delta: &ActivationDelta)
    {
        for (level, coefficient) in &delta.coefficient_changes
        {
            if *coefficient == 0
            {
                self.terms.remove(level);
            }
            else
            {
                self.terms.insert(level.clone(), *coefficient);
            }
        }
    }

    pub fn combine(&self, partials: &PartialResults) -> Result<Aggregate>
    {
        combine(self.mode, self.num_outputs, &self.terms, partials)
    }

    pub fn interpolant<'a>(&self, partials: &'a PartialResults) -> Result<CombinedInterpolant<'a>>
    {
        CombinedInterpolant::new(self.num_outputs, &self.terms, partials)
    }

    ///
    /// Terms of the combination after adding `extra` (signed) terms, used to
    /// evaluate what-if combinations without touching the operator.
    ///
    pub fn merged_terms(&self, extra: &[(LevelVector, i64)]) -> BTreeMap<LevelVector, i64>
    {
        let mut terms = self.terms.clone();
        for (level, c) in extra
        {
            *terms.entry(level.clone()).or_insert(0) += c;
        }
        terms.retain(|_, c| *c != 0);
        terms
    }
}

#[cfg(test)]
use crate::{cache::EvaluationCache, evaluator::FullGridEvaluator, multi_index::MultiIndexSet, objective::ScalarFunction, one_dimensional_nodes::NodeRule, rules::NodeRuleKind};

#[test]
fn check_classical_combination()
{
    // regular sparse grid of level 3 integrates x^2 y^2 on the CC rule exactly
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::ClenshawCurtis); 2], 1, ApproximationMode::Interpolation);
    let f = ScalarFunction(|x: &[f64]| x[0] * x[0] * x[1] * x[1] + x[0]);
    let mut cache = EvaluationCache::new(2, 1);
    let mut set = MultiIndexSet::new(2);
    let mut operator = CombinationOperator::new(ApproximationMode::Interpolation, 1);
    let mut partials = PartialResults::default();
    for level in MultiIndexSet::regular_simplex(2, 3)
    {
        let (partial, _) = evaluator.evaluate(&level, &f, &mut cache).unwrap();
        partials.insert(level.clone(), partial);
        operator.apply(&set.activate(&level).unwrap());
    }
    assert_eq!(operator.terms().len(), 7);
    let aggregate = operator.combine(&partials).unwrap();
    assert!((aggregate.integral[0] - (1.0 / 9.0 + 0.5)).abs() < 1e-14);
    assert!(aggregate.spectral.is_none());
    // the combined interpolant reproduces this polynomial
    let interpolant = operator.interpolant(&partials).unwrap();
    let y = interpolant.eval(&[0.3, 0.8]);
    assert!((y[0] - (f.0)(&[0.3, 0.8])).abs() < 1e-13);
}

#[test]
fn check_missing_partial()
{
    let mut operator = CombinationOperator::new(ApproximationMode::Quadrature, 1);
    let mut set = MultiIndexSet::new(1);
    operator.apply(&set.activate(&[0]).unwrap());
    assert!(matches!(operator.combine(&PartialResults::default()), Err(CombiError::NumericalDegeneracy(_))));
}

#[test]
fn check_merged_terms()
{
    let mut operator = CombinationOperator::new(ApproximationMode::Quadrature, 1);
    let mut set = MultiIndexSet::new(2);
    operator.apply(&set.activate(&[0, 0]).unwrap());
    operator.apply(&set.activate(&[1, 0]).unwrap());
    assert_eq!(operator.terms().iter().map(|(l, c)| (l.clone(), *c)).collect::<Vec<_>>(), vec![(vec![1, 0], 1)]);
    let merged = operator.merged_terms(&[(vec![0, 1], 1), (vec![0, 0], -1)]);
    assert_eq!(merged.into_iter().collect::<Vec<_>>(), vec![(vec![0, 0], -1), (vec![0, 1], 1), (vec![1, 0], 1)]);
}
