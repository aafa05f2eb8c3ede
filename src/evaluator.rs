use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::{cache::EvaluationCache, config::ApproximationMode, errors::{CombiError, Result}, grids::full_grid::{FullGrid, SpectralCoefficients}, multi_index::LevelVector, objective::{Objective, ObjectiveError}, one_dimensional_nodes::NodeRule};

/// Point accounting of one full-grid evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats
{
    pub requested: usize,
    pub hits: usize,
    pub misses: usize,
}

///
/// Everything the combination needs from one evaluated full grid.
///
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult
{
    pub grid: FullGrid,
    /// Point values in enumeration order, `num_outputs` per point.
    pub values: Vec<f64>,
    pub integral: Vec<f64>,
    pub spectral: Option<SpectralCoefficients>,
}

impl PartialResult
{
    pub fn level(&self) -> &[u32]
    {
        &self.grid.level
    }

    pub fn num_outputs(&self) -> usize
    {
        self.integral.len()
    }

    /// Interpolant of this full grid alone.
    pub fn interpolate(&self, x: &[f64]) -> Vec<f64>
    {
        let mut y = vec![0.0; self.num_outputs()];
        self.grid.interpolate(x, &self.values, &mut y, 1.0);
        y
    }
}

///
/// Builds full grids and evaluates them through the shared cache.
///
#[derive(Debug, Clone)]
pub struct FullGridEvaluator
{
    rules: Vec<NodeRule>,
    num_outputs: usize,
    mode: ApproximationMode,
    parallel: bool,
}

impl FullGridEvaluator
{
    pub fn new(rules: Vec<NodeRule>, num_outputs: usize, mode: ApproximationMode) -> Self
    {
        Self { rules, num_outputs, mode, parallel: false }
    }

    /// Evaluate the objective on the rayon thread pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self
    {
        self.parallel = parallel;
        self
    }

    pub fn rules(&self) -> &[NodeRule]
    {
        &self.rules
    }

    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    pub fn mode(&self) -> ApproximationMode
    {
        self.mode
    }

    pub fn grid(&self, level: &[u32]) -> Result<FullGrid>
    {
        FullGrid::new(&self.rules, level)
    }

    /// Number of points of `level` that are not cached yet (the evaluations it would cost).
    pub fn uncached_points(&self, level: &[u32], cache: &EvaluationCache) -> Result<usize>
    {
        Ok(self.grid(level)?.points().filter(|p| !cache.contains(p)).count())
    }

    /// Check one objective result.
    fn accept(&self, point: &[f64], value: std::result::Result<Vec<f64>, ObjectiveError>) -> Result<Vec<f64>>
    {
        let failed = |cause: String| CombiError::EvaluationFailed { point: point.to_owned(), cause };
        let value = value.map_err(|e| failed(e.to_string()))?;
        if value.len() != self.num_outputs
        {
            return Err(failed(format!("expected {} outputs, found {}", self.num_outputs, value.len())));
        }
        if value.iter().any(|v| !v.is_finite())
        {
            return Err(failed(format!("non-finite value {value:?}")));
        }
        Ok(value)
    }

    ///
    /// Evaluate the full grid of `level`: cached points are looked up, every
    /// miss calls `objective` and is stored. A failing point aborts with
    /// `EvaluationFailed`; values evaluated before that stay cached.
    ///
    pub fn evaluate(&self, level: &[u32], objective: &dyn Objective, cache: &mut EvaluationCache) -> Result<(PartialResult, EvaluationStats)>
    {
        if objective.num_outputs() != self.num_outputs
        {
            return Err(CombiError::DimensionMismatch { expected: self.num_outputs, found: objective.num_outputs() });
        }
        let grid = self.grid(level)?;
        let (hits, misses) = (cache.hits(), cache.misses());
        let values = if self.parallel
        {
            self.evaluate_parallel(&grid, objective, cache)
        }
        else
        {
            self.evaluate_sequential(&grid, objective, cache)
        };
        let stats = EvaluationStats { requested: cache.requests() - hits - misses, hits: cache.hits() - hits, misses: cache.misses() - misses };
        let values = values.inspect_err(|e| error!("evaluation of {level:?} failed: {e}"))?;
        trace!("evaluated {level:?}: {} points, {} hits, {} misses", stats.requested, stats.hits, stats.misses);

        let integral = grid.integral(&values, self.num_outputs);
        let spectral = match self.mode
        {
            ApproximationMode::Spectral => Some(grid.spectral(&values, self.num_outputs)),
            _ => None,
        };
        Ok((PartialResult { grid, values, integral, spectral }, stats))
    }

    fn evaluate_sequential(&self, grid: &FullGrid, objective: &dyn Objective, cache: &mut EvaluationCache) -> Result<Vec<f64>>
    {
        let mut values = Vec::with_capacity(grid.len() * self.num_outputs);
        for point in grid.points()
        {
            if let Some(value) = cache.get(&point)
            {
                values.extend_from_slice(value);
                continue;
            }
            let value = self.accept(&point, objective.eval(&point))?;
            values.extend_from_slice(&value);
            cache.put(&point, value)?;
        }
        Ok(values)
    }

    ///
    /// Misses are evaluated concurrently and stored in enumeration order,
    /// so values and statistics match the sequential path.
    ///
    fn evaluate_parallel(&self, grid: &FullGrid, objective: &dyn Objective, cache: &mut EvaluationCache) -> Result<Vec<f64>>
    {
        let points: Vec<Vec<f64>> = grid.points().collect();
        let mut values = vec![0.0; points.len() * self.num_outputs];
        let mut missing: Vec<usize> = Vec::new();
        for (i, point) in points.iter().enumerate()
        {
            match cache.get(point)
            {
                Some(value) => values[i * self.num_outputs..(i + 1) * self.num_outputs].copy_from_slice(value),
                None => missing.push(i),
            }
        }
        let results: Vec<std::result::Result<Vec<f64>, ObjectiveError>> = missing.par_iter().map(|&i| objective.eval(&points[i])).collect();

        let mut failure = None;
        for (&i, result) in missing.iter().zip(results)
        {
            match self.accept(&points[i], result)
            {
                Ok(value) =>
                {
                    values[i * self.num_outputs..(i + 1) * self.num_outputs].copy_from_slice(&value);
                    cache.put(&points[i], value)?;
                },
                Err(e) => if failure.is_none() { failure = Some(e) },
            }
        }
        match failure
        {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }
}

#[cfg(test)]
use crate::{objective::{FallibleFunction, ScalarFunction}, rules::NodeRuleKind};

#[test]
fn check_cache_reuse()
{
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal); 2], 1, ApproximationMode::Quadrature);
    let mut cache = EvaluationCache::new(2, 1);
    let f = ScalarFunction(|x: &[f64]| x[0] * x[1]);
    let (coarse, stats) = evaluator.evaluate(&[1, 0], &f, &mut cache).unwrap();
    assert_eq!(stats, EvaluationStats { requested: 6, hits: 0, misses: 6 });
    assert!((coarse.integral[0] - 0.25).abs() < 1e-15);
    assert_eq!(evaluator.uncached_points(&[2, 0], &cache).unwrap(), 4);
    // nested: the coarse points are found again
    let (_, stats) = evaluator.evaluate(&[2, 0], &f, &mut cache).unwrap();
    assert_eq!(stats, EvaluationStats { requested: 10, hits: 6, misses: 4 });
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.requests(), 16);
}

#[test]
fn check_parallel_matches_sequential()
{
    let rules = vec![NodeRule::unit(NodeRuleKind::ClenshawCurtis); 3];
    let f = ScalarFunction(|x: &[f64]| (x[0] + 2.0 * x[1]).sin() * x[2].exp());
    let sequential = FullGridEvaluator::new(rules.clone(), 1, ApproximationMode::Spectral);
    let parallel = sequential.clone().with_parallel(true);
    let mut cache_a = EvaluationCache::new(3, 1);
    let mut cache_b = EvaluationCache::new(3, 1);
    for level in [[0, 0, 0], [1, 0, 0], [1, 2, 1], [2, 2, 1]]
    {
        let (a, stats_a) = sequential.evaluate(&level, &f, &mut cache_a).unwrap();
        let (b, stats_b) = parallel.evaluate(&level, &f, &mut cache_b).unwrap();
        assert_eq!(a, b);
        assert_eq!(stats_a, stats_b);
    }
    assert_eq!(cache_a.export(), cache_b.export());
}

#[test]
fn check_evaluation_failure()
{
    let f = FallibleFunction(|x: &[f64]| if x[0] > 0.7 { Err(ObjectiveError::new("out of range")) } else { Ok(x[0]) });
    for parallel in [false, true]
    {
        let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal)], 1, ApproximationMode::Quadrature).with_parallel(parallel);
        let mut cache = EvaluationCache::new(1, 1);
        let err = evaluator.evaluate(&[2], &f, &mut cache).unwrap_err();
        assert_eq!(err.point(), Some(&[0.75][..]));
        // points before the failure are valid and stay cached
        assert!(cache.contains(&[0.5]));
        assert!(!cache.contains(&[0.75]));
    }
    let nan = ScalarFunction(|_: &[f64]| f64::NAN);
    let evaluator = FullGridEvaluator::new(vec![NodeRule::unit(NodeRuleKind::Trapezoidal)], 1, ApproximationMode::Quadrature);
    let err = evaluator.evaluate(&[0], &nan, &mut EvaluationCache::new(1, 1)).unwrap_err();
    assert!(matches!(err, CombiError::EvaluationFailed { .. }));
}
