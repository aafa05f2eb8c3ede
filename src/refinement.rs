use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{cache::EvaluationCache, combination::{Aggregate, CombinationOperator, PartialResults}, config::{ApproximationMode, CandidateSelection, CombiConfig, ErrorStrategy}, domain::BoundingBox, errors::{CombiError, Result}, estimator::{ErrorEstimator, ReferenceSolution}, evaluator::FullGridEvaluator, grids::full_grid::SpectralCoefficients, multi_index::{ActivationDelta, LevelVector, MultiIndexSet}, objective::{CacheOnly, Objective}, state::EngineState, utilities::multi_index_manipulation::make_downward_closed};

/// States of the refinement loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementState
{
    Initializing,
    Iterating,
    /// The best remaining candidate scored below the tolerance (or none is left).
    Converged,
    /// The evaluation budget or the iteration cap stopped the run.
    BudgetExhausted,
    /// An objective evaluation failed; see [`RunReport::failure`].
    Failed,
}

impl RefinementState
{
    pub fn is_terminal(&self) -> bool
    {
        matches!(self, RefinementState::Converged | RefinementState::BudgetExhausted | RefinementState::Failed)
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport
{
    pub state: RefinementState,
    pub iterations: usize,
    /// Objective evaluations, i.e. cache misses.
    pub evaluations: usize,
    /// Best candidate score when the run stopped.
    pub error_estimate: f64,
    /// Last valid combined result.
    pub aggregate: Aggregate,
    pub failure: Option<CombiError>,
}

///
/// Dimension-adaptive combination technique. Starting from the minimum level
/// vector, the candidate with the largest estimated error is activated until
/// the estimate drops below the tolerance or the budget is spent.
///
/// With [`CandidateSelection::Evaluated`] candidates are evaluated as soon as
/// they become admissible, so their evaluations count toward the budget and
/// activating one costs nothing. With [`CandidateSelection::Estimated`] they
/// are ranked from the surpluses of their active downward neighbors and only
/// the chosen one is evaluated.
///
pub struct AdaptiveCombinationGrid
{
    config: CombiConfig,
    bounding_box: BoundingBox,
    num_outputs: usize,
    evaluator: FullGridEvaluator,
    estimator: ErrorEstimator,
    indices: MultiIndexSet,
    cache: EvaluationCache,
    partials: PartialResults,
    combination: CombinationOperator,
    /// Scores of the evaluated frontier candidates.
    scores: BTreeMap<LevelVector, f64>,
    /// Surplus norms of the active grids, kept for estimated selection.
    surpluses: BTreeMap<LevelVector, f64>,
    rejected: BTreeSet<LevelVector>,
    state: RefinementState,
    iterations: usize,
    error_estimate: f64,
    failure: Option<CombiError>,
}

impl AdaptiveCombinationGrid
{
    ///
    /// Create an engine for a scalar objective. The number of outputs is
    /// adjusted to the objective on initialization.
    ///
    pub fn new(config: CombiConfig) -> Result<Self>
    {
        Self::with_outputs(config, 1)
    }

    pub fn with_outputs(config: CombiConfig, num_outputs: usize) -> Result<Self>
    {
        config.validate()?;
        if num_outputs == 0
        {
            return Err(CombiError::InvalidConfiguration("objective must have at least one output".to_string()));
        }
        let bounding_box = config.bounding_box();
        let mut indices = MultiIndexSet::new(config.dimension);
        indices.set_level_limits(config.level_limits.clone())?;
        let evaluator = FullGridEvaluator::new(config.node_rules(), num_outputs, config.mode).with_parallel(config.parallel);
        let estimator = ErrorEstimator::new(config.error_strategy, config.mode, num_outputs, config.cost_weight, bounding_box.clone(), indices.minimum().to_vec());
        Ok(Self
        {
            cache: EvaluationCache::new(config.dimension, num_outputs),
            combination: CombinationOperator::new(config.mode, num_outputs),
            config,
            bounding_box,
            num_outputs,
            evaluator,
            estimator,
            indices,
            partials: PartialResults::default(),
            scores: BTreeMap::new(),
            surpluses: BTreeMap::new(),
            rejected: BTreeSet::new(),
            state: RefinementState::Initializing,
            iterations: 0,
            error_estimate: f64::INFINITY,
            failure: None,
        })
    }

    ///
    /// Size every component for `num_outputs`. Only possible before anything was evaluated.
    ///
    fn bind_outputs(&mut self, num_outputs: usize) -> Result<()>
    {
        if num_outputs == self.num_outputs
        {
            return Ok(());
        }
        if !self.cache.is_empty() || !self.indices.is_empty()
        {
            return Err(CombiError::DimensionMismatch { expected: self.num_outputs, found: num_outputs });
        }
        let reference = self.estimator.reference().cloned();
        let mut rebuilt = Self::with_outputs(self.config.clone(), num_outputs)?;
        if let Some(reference) = reference
        {
            rebuilt.set_reference(reference)?;
        }
        *self = rebuilt;
        Ok(())
    }

    /// Reference solution for the analytic error strategy.
    pub fn set_reference(&mut self, reference: ReferenceSolution) -> Result<()>
    {
        self.estimator.set_reference(reference)
    }

    pub fn config(&self) -> &CombiConfig
    {
        &self.config
    }

    pub fn bounding_box(&self) -> &BoundingBox
    {
        &self.bounding_box
    }

    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    pub fn state(&self) -> RefinementState
    {
        self.state
    }

    pub fn iterations(&self) -> usize
    {
        self.iterations
    }

    /// Objective evaluations so far.
    pub fn evaluations(&self) -> usize
    {
        self.cache.misses()
    }

    pub fn error_estimate(&self) -> f64
    {
        self.error_estimate
    }

    pub fn failure(&self) -> Option<&CombiError>
    {
        self.failure.as_ref()
    }

    pub fn active_set(&self) -> &MultiIndexSet
    {
        &self.indices
    }

    pub fn frontier(&self) -> &BTreeSet<LevelVector>
    {
        self.indices.frontier()
    }

    /// Scores of the evaluated frontier candidates.
    pub fn candidate_scores(&self) -> &BTreeMap<LevelVector, f64>
    {
        &self.scores
    }

    ///
    /// Estimated priorities of the frontier candidates, from the mean surplus
    /// of their downward neighbors. Only available with estimated selection.
    ///
    pub fn candidate_priorities(&self) -> Result<BTreeMap<LevelVector, f64>>
    {
        if self.config.candidate_selection != CandidateSelection::Estimated
        {
            return Err(CombiError::InvalidConfiguration("candidate priorities need estimated selection".to_string()));
        }
        let mut priorities = BTreeMap::new();
        if self.indices.is_empty()
        {
            return Ok(priorities);
        }
        for level in self.indices.frontier()
        {
            let num_points = self.evaluator.grid(level)?.len();
            priorities.insert(level.clone(), self.estimator.estimate_priority(level, &self.surpluses, num_points)?);
        }
        Ok(priorities)
    }

    pub fn cache(&self) -> &EvaluationCache
    {
        &self.cache
    }

    pub fn partial_results(&self) -> &PartialResults
    {
        &self.partials
    }

    ///
    /// Evaluate `level` unless the budget forbids it. Returns the terminal
    /// state the run has to stop in, if any. Failed candidates are dropped
    /// when `skip` is set.
    ///
    fn evaluate_level(&mut self, level: &[u32], objective: &dyn Objective, skip: bool) -> Result<Option<RefinementState>>
    {
        let cost = self.evaluator.uncached_points(level, &self.cache)?;
        if self.cache.misses() + cost > self.config.evaluation_budget
        {
            warn!("evaluating {level:?} needs {cost} more evaluations, budget of {} reached", self.config.evaluation_budget);
            return Ok(Some(RefinementState::BudgetExhausted));
        }
        match self.evaluator.evaluate(level, objective, &mut self.cache)
        {
            Ok((partial, stats)) =>
            {
                debug!("evaluated {level:?}: {} new points", stats.misses);
                self.partials.insert(level.to_owned(), partial);
                Ok(None)
            },
            Err(e @ CombiError::EvaluationFailed { .. }) =>
            {
                if skip
                {
                    warn!("dropping candidate {level:?}: {e}");
                    self.indices.reject(level);
                    self.rejected.insert(level.to_owned());
                    Ok(None)
                }
                else
                {
                    self.failure = Some(e);
                    Ok(Some(RefinementState::Failed))
                }
            },
            Err(e) => Err(e),
        }
    }

    fn activate_evaluated(&mut self, level: &[u32]) -> Result<ActivationDelta>
    {
        let surplus = match self.config.candidate_selection
        {
            CandidateSelection::Estimated => Some(self.estimator.surplus_norm(level, &self.partials)?),
            CandidateSelection::Evaluated => None,
        };
        let delta = self.indices.activate(level)?;
        self.combination.apply(&delta);
        self.scores.remove(level);
        if let Some(surplus) = surplus
        {
            self.surpluses.insert(level.to_owned(), surplus);
        }
        Ok(delta)
    }

    ///
    /// Evaluate and score every frontier candidate that has not been evaluated yet.
    ///
    fn evaluate_frontier(&mut self, objective: &dyn Objective) -> Result<Option<RefinementState>>
    {
        let pending: Vec<LevelVector> = self.indices.frontier().iter().filter(|l| !self.partials.contains_key(*l)).cloned().collect();
        for level in pending
        {
            if let Some(state) = self.evaluate_level(&level, objective, self.config.skip_failed_candidates)?
            {
                return Ok(Some(state));
            }
            if self.partials.contains_key(&level)
            {
                let score = self.estimator.estimate(&level, &self.combination, &self.partials)?;
                debug!("candidate {level:?} scores {score:e}");
                self.scores.insert(level, score);
            }
        }
        Ok(None)
    }

    fn rescore(&mut self) -> Result<()>
    {
        let levels: Vec<LevelVector> = self.scores.keys().cloned().collect();
        for level in levels
        {
            let score = self.estimator.estimate(&level, &self.combination, &self.partials)?;
            self.scores.insert(level, score);
        }
        Ok(())
    }

    /// Highest score, ties broken by the lexicographically smallest level vector.
    fn best_of(scores: &BTreeMap<LevelVector, f64>) -> Option<(LevelVector, f64)>
    {
        let mut best: Option<(&LevelVector, f64)> = None;
        for (level, &score) in scores
        {
            if best.map_or(true, |(_, s)| score > s)
            {
                best = Some((level, score));
            }
        }
        best.map(|(level, score)| (level.clone(), score))
    }

    /// Best frontier candidate under the configured selection.
    fn best_candidate(&self) -> Result<Option<(LevelVector, f64)>>
    {
        match self.config.candidate_selection
        {
            CandidateSelection::Evaluated => Ok(Self::best_of(&self.scores)),
            CandidateSelection::Estimated => Ok(Self::best_of(&self.candidate_priorities()?)),
        }
    }

    fn finish(&mut self, state: RefinementState) -> Result<RefinementState>
    {
        if matches!(state, RefinementState::Converged | RefinementState::BudgetExhausted)
        {
            // candidates scored since the last selection count too
            if self.estimator.requires_rescoring()
            {
                self.rescore()?;
            }
            if let Some((_, score)) = self.best_candidate()?
            {
                self.error_estimate = score;
            }
        }
        if self.config.absorb_frontier && matches!(state, RefinementState::Converged | RefinementState::BudgetExhausted)
        {
            // already paid for, and each one is admissible on its own
            let evaluated: Vec<LevelVector> = self.scores.keys().cloned().collect();
            for level in &evaluated
            {
                self.activate_evaluated(level)?;
            }
            debug!("absorbed {} evaluated candidates", evaluated.len());
        }
        self.state = state;
        info!("{state:?} after {} iterations, {} evaluations, {} active grids, error estimate {:e}",
            self.iterations, self.evaluations(), self.indices.len(), self.error_estimate);
        Ok(state)
    }

    ///
    /// Activate the minimum level vector and evaluate the first candidates.
    ///
    pub fn initialize(&mut self, objective: &dyn Objective) -> Result<RefinementState>
    {
        if self.state != RefinementState::Initializing
        {
            return Ok(self.state);
        }
        self.bind_outputs(objective.num_outputs())?;
        if self.estimator.strategy() == ErrorStrategy::Analytic && self.estimator.reference().is_none()
        {
            return Err(CombiError::InvalidConfiguration("the analytic strategy needs a reference solution".to_string()));
        }
        let minimum = self.indices.minimum().to_vec();
        if !self.indices.contains(&minimum)
        {
            if let Some(state) = self.evaluate_level(&minimum, objective, false)?
            {
                return self.finish(state);
            }
            self.activate_evaluated(&minimum)?;
        }
        self.state = RefinementState::Iterating;
        if self.config.candidate_selection == CandidateSelection::Estimated
        {
            return Ok(self.state);
        }
        match self.evaluate_frontier(objective)?
        {
            Some(state) => self.finish(state),
            None => Ok(self.state),
        }
    }

    ///
    /// One refinement iteration: evaluate new candidates (or estimate their
    /// priority), pick the best one and activate it, or terminate.
    ///
    pub fn step(&mut self, objective: &dyn Objective) -> Result<RefinementState>
    {
        if self.state == RefinementState::Initializing && self.initialize(objective)?.is_terminal()
        {
            return Ok(self.state);
        }
        if self.state.is_terminal()
        {
            return Ok(self.state);
        }
        if self.config.candidate_selection == CandidateSelection::Evaluated
        {
            if let Some(state) = self.evaluate_frontier(objective)?
            {
                return self.finish(state);
            }
            if self.estimator.requires_rescoring()
            {
                self.rescore()?;
            }
        }
        let Some((level, score)) = self.best_candidate()? else {
            self.error_estimate = 0.0;
            return self.finish(RefinementState::Converged);
        };
        self.error_estimate = score;
        if score < self.config.tolerance
        {
            return self.finish(RefinementState::Converged);
        }
        if self.config.max_iterations.is_some_and(|max| self.iterations >= max)
        {
            return self.finish(RefinementState::BudgetExhausted);
        }
        if !self.partials.contains_key(&level)
        {
            if let Some(state) = self.evaluate_level(&level, objective, self.config.skip_failed_candidates)?
            {
                return self.finish(state);
            }
            if !self.partials.contains_key(&level)
            {
                // dropped, the next step picks another candidate
                return Ok(self.state);
            }
        }
        self.activate_evaluated(&level)?;
        self.iterations += 1;
        debug!("iteration {}: activated {level:?} with score {score:e}", self.iterations);
        Ok(self.state)
    }

    ///
    /// Refine until a terminal state is reached.
    ///
    pub fn run(&mut self, objective: &dyn Objective) -> Result<RunReport>
    {
        info!("refining a {}-dimensional {:?} combination, tolerance {:e}, budget {}",
            self.config.dimension, self.config.node_rule, self.config.tolerance, self.config.evaluation_budget);
        while !self.step(objective)?.is_terminal() {}
        self.report()
    }

    pub fn report(&self) -> Result<RunReport>
    {
        Ok(RunReport
        {
            state: self.state,
            iterations: self.iterations,
            evaluations: self.evaluations(),
            error_estimate: self.error_estimate,
            aggregate: self.aggregate()?,
            failure: self.failure.clone(),
        })
    }

    ///
    /// Manually activate an admissible `level`, evaluating its grid if needed.
    /// All or nothing: on failure the active set is unchanged.
    ///
    pub fn activate(&mut self, level: &[u32], objective: &dyn Objective) -> Result<ActivationDelta>
    {
        if self.indices.contains(level)
        {
            return Ok(ActivationDelta::default());
        }
        self.indices.check_admissible(level)?;
        self.bind_outputs(objective.num_outputs())?;
        if !self.partials.contains_key(level)
        {
            let (partial, _) = self.evaluator.evaluate(level, objective, &mut self.cache)?;
            self.partials.insert(level.to_owned(), partial);
        }
        let delta = self.activate_evaluated(level)?;
        if self.state == RefinementState::Initializing
        {
            self.state = RefinementState::Iterating;
        }
        Ok(delta)
    }

    ///
    /// Classical non-adaptive sparse grid: activate every level vector with
    /// `|l - minimum|_1 <= level`.
    ///
    pub fn regular(&mut self, level: u32, objective: &dyn Objective) -> Result<()>
    {
        let minimum = self.indices.minimum().to_vec();
        for offset in MultiIndexSet::regular_simplex(self.config.dimension, level)
        {
            let l: LevelVector = offset.iter().zip(&minimum).map(|(o, m)| o + m).collect();
            self.activate(&l, objective)?;
        }
        Ok(())
    }

    ///
    /// Activate `levels` together with everything below them. Stops at the
    /// first failing level; what was activated before stays active.
    ///
    pub fn activate_closure(&mut self, levels: &[LevelVector], objective: &dyn Objective) -> Result<()>
    {
        for level in levels
        {
            self.indices.check_admissible(level).or_else(|e| match e
            {
                CombiError::InvalidRefinementOrder { .. } => Ok(()),
                e => Err(e),
            })?;
        }
        for level in make_downward_closed(levels, self.indices.minimum())
        {
            self.activate(&level, objective)?;
        }
        Ok(())
    }

    pub fn aggregate(&self) -> Result<Aggregate>
    {
        self.combination.combine(&self.partials)
    }

    pub fn integral(&self) -> Result<Vec<f64>>
    {
        Ok(self.aggregate()?.integral)
    }

    /// Evaluate the combined interpolant at `x`.
    pub fn interpolate(&self, x: &[f64]) -> Result<Vec<f64>>
    {
        if x.len() != self.config.dimension
        {
            return Err(CombiError::DimensionMismatch { expected: self.config.dimension, found: x.len() });
        }
        Ok(self.combination.interpolant(&self.partials)?.eval(x))
    }

    /// Combined spectral coefficients, only available in spectral mode.
    pub fn spectral(&self) -> Result<SpectralCoefficients>
    {
        if self.config.mode != ApproximationMode::Spectral
        {
            return Err(CombiError::InvalidConfiguration(format!("spectral coefficients are not computed in {:?} mode", self.config.mode)));
        }
        Ok(self.aggregate()?.spectral.unwrap_or_default())
    }

    /// Snapshot for resuming later.
    pub fn export_state(&self) -> EngineState
    {
        EngineState
        {
            config: self.config.clone(),
            num_outputs: self.num_outputs,
            active: self.indices.combination_coefficients().into_iter().collect(),
            cache: self.cache.export(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            iterations: self.iterations,
            rejected: self.rejected.iter().cloned().collect(),
        }
    }

    ///
    /// Rebuild an engine from a snapshot. Every active grid is recomputed from
    /// the cached values alone; a missing value, a non downward closed active
    /// list or coefficients that do not match the active set are errors.
    ///
    pub fn import_state(state: EngineState) -> Result<Self>
    {
        let mut engine = Self::with_outputs(state.config.clone(), state.num_outputs)?;
        let mut cache = EvaluationCache::import(state.config.dimension, state.num_outputs, &state.cache, 0, 0)?;
        let objective = CacheOnly { num_outputs: state.num_outputs };
        for level in state.activation_order()
        {
            engine.indices.check_admissible(&level)?;
            let (partial, _) = engine.evaluator.evaluate(&level, &objective, &mut cache)?;
            engine.partials.insert(level.clone(), partial);
            engine.activate_evaluated(&level)?;
        }
        for (level, &coefficient) in &state.active
        {
            let restored = engine.indices.coefficient(level);
            if restored != coefficient
            {
                return Err(CombiError::NumericalDegeneracy(format!(
                    "persisted coefficient {coefficient} of {level:?} differs from the recomputed {restored}")));
            }
        }
        cache.set_statistics(state.cache_hits, state.cache_misses);
        engine.cache = cache;
        for level in &state.rejected
        {
            engine.indices.reject(level);
            engine.rejected.insert(level.clone());
        }
        engine.iterations = state.iterations;
        if !engine.indices.is_empty()
        {
            engine.state = RefinementState::Iterating;
        }
        info!("restored {} active grids and {} cached points", engine.indices.len(), engine.cache.len());
        Ok(engine)
    }
}

#[cfg(test)]
use crate::{objective::ScalarFunction, rules::NodeRuleKind};

#[test]
fn check_single_step()
{
    let mut engine = AdaptiveCombinationGrid::new(CombiConfig::new(2, NodeRuleKind::Trapezoidal)).unwrap();
    let f = ScalarFunction(|x: &[f64]| x[0] * x[0]);
    assert_eq!(engine.state(), RefinementState::Initializing);
    assert_eq!(engine.initialize(&f).unwrap(), RefinementState::Iterating);
    assert_eq!(engine.active_set().len(), 1);
    // both neighbors of the origin are evaluated and scored
    assert_eq!(engine.candidate_scores().len(), 2);
    assert_eq!(engine.candidate_scores()[&vec![0, 1]], 0.0);
    assert_eq!(engine.step(&f).unwrap(), RefinementState::Iterating);
    assert!(engine.active_set().contains(&[1, 0]));
    assert_eq!(engine.iterations(), 1);
}

#[test]
fn check_budget_is_never_exceeded()
{
    let config = CombiConfig { dimension: 3, tolerance: 1e-12, evaluation_budget: 100, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let f = ScalarFunction(|x: &[f64]| (x[0] + x[1] * x[2]).exp());
    let report = engine.run(&f).unwrap();
    assert_eq!(report.state, RefinementState::BudgetExhausted);
    assert!(report.evaluations <= 100);
    assert!(engine.active_set().is_downward_closed());
}

#[test]
fn check_level_limits_converge()
{
    let config = CombiConfig { dimension: 2, tolerance: 1e-12, level_limits: Some(vec![2, 1]), ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&ScalarFunction(|x: &[f64]| (x[0] * x[1]).sin())).unwrap();
    assert_eq!(report.state, RefinementState::Converged);
    assert_eq!(engine.active_set().len(), 6);
    assert!(engine.frontier().is_empty());
}

#[test]
fn check_max_iterations()
{
    let config = CombiConfig { dimension: 2, tolerance: 1e-12, max_iterations: Some(3), absorb_frontier: false, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&ScalarFunction(|x: &[f64]| (x[0] * x[1]).exp())).unwrap();
    assert_eq!(report.state, RefinementState::BudgetExhausted);
    assert_eq!(report.iterations, 3);
    assert_eq!(engine.active_set().len(), 4);
}

#[test]
fn check_output_binding()
{
    let mut engine = AdaptiveCombinationGrid::new(CombiConfig::new(1, NodeRuleKind::ClenshawCurtis)).unwrap();
    let f = crate::objective::VectorFunction::new(2, |x: &[f64]| vec![x[0], 1.0]);
    engine.regular(3, &f).unwrap();
    assert_eq!(engine.num_outputs(), 2);
    let integral = engine.integral().unwrap();
    assert!((integral[0] - 0.5).abs() < 1e-14 && (integral[1] - 1.0).abs() < 1e-14);
    assert!(matches!(engine.activate(&[4], &ScalarFunction(|x: &[f64]| x[0])), Err(CombiError::DimensionMismatch { .. })));
    assert!(matches!(engine.spectral(), Err(CombiError::InvalidConfiguration(_))));
}

#[test]
fn check_activate_closure()
{
    let mut engine = AdaptiveCombinationGrid::new(CombiConfig::new(3, NodeRuleKind::Trapezoidal)).unwrap();
    let f = ScalarFunction(|x: &[f64]| x[0] + x[1] * x[2]);
    engine.activate_closure(&[vec![2, 0, 1], vec![0, 1, 0]], &f).unwrap();
    // (0,0,0) (1,0,0) (2,0,0) (0,0,1) (1,0,1) (2,0,1) (0,1,0)
    assert_eq!(engine.active_set().len(), 7);
    assert!(engine.active_set().is_downward_closed());
    assert!(matches!(engine.activate_closure(&[vec![1, 1]], &f), Err(CombiError::DimensionMismatch { .. })));
    assert_eq!(engine.active_set().len(), 7);
}

#[test]
fn check_error_estimate_at_budget_stop()
{
    let config = CombiConfig { dimension: 3, tolerance: 1e-12, evaluation_budget: 100, absorb_frontier: false, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&ScalarFunction(|x: &[f64]| (x[0] + x[1] * x[2]).exp())).unwrap();
    assert_eq!(report.state, RefinementState::BudgetExhausted);
    assert!(!engine.candidate_scores().is_empty());
    // candidates scored after the last selection are included
    let best = engine.candidate_scores().values().fold(0.0_f64, |m, &s| m.max(s));
    assert_eq!(report.error_estimate, best);
    assert_eq!(engine.error_estimate(), best);
}

#[test]
fn check_estimated_selection()
{
    let config = CombiConfig { candidate_selection: CandidateSelection::Estimated, tolerance: 1e-12, absorb_frontier: false, ..CombiConfig::new(2, NodeRuleKind::Trapezoidal) };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let f = ScalarFunction(|x: &[f64]| x[0] * x[0]);
    assert_eq!(engine.initialize(&f).unwrap(), RefinementState::Iterating);
    // nothing beyond the minimum is evaluated up front
    assert_eq!(engine.evaluations(), 4);
    assert!(engine.candidate_scores().is_empty());
    let priorities = engine.candidate_priorities().unwrap();
    assert_eq!(priorities[&vec![0, 1]], 0.5);
    assert_eq!(priorities[&vec![1, 0]], 0.5);

    // equal priorities: the lexicographically smallest candidate wins
    engine.step(&f).unwrap();
    assert!(engine.active_set().contains(&[0, 1]));
    // refining y adds nothing to a function of x, so (0,2) inherits a zero priority
    assert_eq!(engine.candidate_priorities().unwrap()[&vec![0, 2]], 0.0);
    engine.step(&f).unwrap();
    assert!(engine.active_set().contains(&[1, 0]));
    assert_eq!(engine.partial_results().len(), engine.active_set().len());
    assert_eq!(engine.evaluations(), 8);

    let evaluated = AdaptiveCombinationGrid::new(CombiConfig::new(2, NodeRuleKind::Trapezoidal)).unwrap();
    assert!(matches!(evaluated.candidate_priorities(), Err(CombiError::InvalidConfiguration(_))));
}
