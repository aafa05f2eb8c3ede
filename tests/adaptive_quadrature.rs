use sgcombi::{one_dimensional_nodes::NodeRule, AdaptiveCombinationGrid, ApproximationMode, CandidateSelection, CombiConfig, CombiError, ErrorStrategy, FallibleFunction, NodeRuleKind, ObjectiveError, ReferenceSolution, RefinementState, ScalarFunction, VectorFunction};

fn smooth(x: &[f64]) -> f64
{
    x[0] * x[1].sin() + x[1] * x[0].cos()
}

/// Tensor Gauss-Legendre quadrature of `f` on the unit square.
fn gauss_oracle(f: impl Fn(&[f64]) -> f64) -> f64
{
    let nodes = NodeRule::unit(NodeRuleKind::GaussLegendre).nodes(10).unwrap();
    let mut sum = 0.0;
    for (x, wx) in nodes.x.iter().zip(&nodes.weights)
    {
        for (y, wy) in nodes.x.iter().zip(&nodes.weights)
        {
            sum += wx * wy * f(&[*x, *y]);
        }
    }
    sum
}

fn trapezoidal_config() -> CombiConfig
{
    CombiConfig { dimension: 2, node_rule: NodeRuleKind::Trapezoidal, tolerance: 1e-3, evaluation_budget: 500, ..Default::default() }
}

#[test]
fn converges_on_smooth_integrand()
{
    let oracle = gauss_oracle(smooth);
    let exact = 0.5 * (1.0 - 1f64.cos()) + 0.5 * 1f64.sin();
    assert!((oracle - exact).abs() < 1e-13);

    let mut engine = AdaptiveCombinationGrid::new(trapezoidal_config()).unwrap();
    let report = engine.run(&ScalarFunction(smooth)).unwrap();
    assert_eq!(report.state, RefinementState::Converged);
    assert!(report.evaluations < 500);
    assert!(report.error_estimate < 1e-3);
    assert!((report.aggregate.integral[0] - oracle).abs() < 1e-3);
    assert!(engine.active_set().is_downward_closed());
    engine.active_set().cross_check_coefficients().unwrap();
    // the integrand is not separable, mixed levels are needed
    assert!(engine.active_set().active().any(|l| l[0] > 0 && l[1] > 0));
    // stepping a finished run changes nothing
    assert_eq!(engine.step(&ScalarFunction(smooth)).unwrap(), RefinementState::Converged);
    assert_eq!(engine.evaluations(), report.evaluations);
}

#[test]
fn runs_are_deterministic()
{
    let run = || {
        let mut engine = AdaptiveCombinationGrid::new(trapezoidal_config()).unwrap();
        let report = engine.run(&ScalarFunction(smooth)).unwrap();
        (report.aggregate.integral[0].to_bits(), engine.active_set().combination_coefficients(), report.evaluations)
    };
    assert_eq!(run(), run());
}

#[test]
fn result_is_independent_of_activation_order()
{
    let orders: [&[[u32; 2]]; 2] = [
        &[[0, 0], [1, 0], [2, 0], [0, 1], [1, 1], [0, 2]],
        &[[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [2, 0]],
    ];
    let results: Vec<_> = orders.iter().map(|order| {
        let mut engine = AdaptiveCombinationGrid::new(trapezoidal_config()).unwrap();
        for level in order.iter()
        {
            engine.activate(level, &ScalarFunction(smooth)).unwrap();
        }
        (engine.integral().unwrap()[0].to_bits(), engine.interpolate(&[0.3, 0.6]).unwrap()[0].to_bits())
    }).collect();
    assert_eq!(results[0], results[1]);

    let mut engine = AdaptiveCombinationGrid::new(trapezoidal_config()).unwrap();
    engine.regular(2, &ScalarFunction(smooth)).unwrap();
    assert_eq!(engine.integral().unwrap()[0].to_bits(), results[0].0);
}

#[test]
fn premature_activation_leaves_state_untouched()
{
    let mut engine = AdaptiveCombinationGrid::new(trapezoidal_config()).unwrap();
    let f = ScalarFunction(smooth);
    engine.activate(&[0, 0], &f).unwrap();
    let evaluations = engine.evaluations();
    let result = engine.activate(&[1, 1], &f);
    assert!(matches!(result, Err(CombiError::InvalidRefinementOrder { .. })));
    assert_eq!(engine.active_set().len(), 1);
    assert_eq!(engine.evaluations(), evaluations);
    assert!(matches!(engine.interpolate(&[0.5]), Err(CombiError::DimensionMismatch { expected: 2, found: 1 })));
}

#[test]
fn estimated_selection_evaluates_fewer_points()
{
    let run = |candidate_selection| {
        let config = CombiConfig { candidate_selection, tolerance: 1e-12, evaluation_budget: 5000, max_iterations: Some(8), absorb_frontier: false, ..trapezoidal_config() };
        let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
        let report = engine.run(&ScalarFunction(smooth)).unwrap();
        assert_eq!(report.state, RefinementState::BudgetExhausted);
        assert_eq!(report.iterations, 8);
        assert!(engine.active_set().is_downward_closed());
        (report, engine.partial_results().len(), engine.active_set().len())
    };
    let (evaluated, _, _) = run(CandidateSelection::Evaluated);
    let (estimated, grids, active) = run(CandidateSelection::Estimated);
    // only activated grids were ever evaluated
    assert_eq!(grids, active);
    assert!(estimated.evaluations < evaluated.evaluations);
    assert!((estimated.aggregate.integral[0] - gauss_oracle(smooth)).abs() < 5e-2);
}

#[test]
fn cache_accounting()
{
    let config = CombiConfig { dimension: 2, node_rule: NodeRuleKind::ClenshawCurtis, tolerance: 1e-8, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&ScalarFunction(|x: &[f64]| (x[0] + 2.0 * x[1]).exp())).unwrap();
    assert_eq!(report.state, RefinementState::Converged);
    let requested: usize = engine.partial_results().values().map(|p| p.grid.len()).sum();
    let cache = engine.cache();
    assert_eq!(cache.hits() + cache.misses(), requested);
    assert_eq!(cache.misses(), cache.len());
    assert_eq!(report.evaluations, cache.len());
    // nested nodes are shared between full grids
    assert!(cache.hits() > 0);
    let exact = (1f64.exp() - 1.0) * (2f64.exp() - 1.0) / 2.0;
    assert!((report.aggregate.integral[0] - exact).abs() < 1e-7);
}

#[test]
fn budget_is_never_exceeded()
{
    for budget in [10, 57, 200]
    {
        let config = CombiConfig { dimension: 3, tolerance: 1e-14, evaluation_budget: budget, ..Default::default() };
        let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
        let report = engine.run(&ScalarFunction(|x: &[f64]| (x[0] * x[1] + x[2]).cos())).unwrap();
        assert_eq!(report.state, RefinementState::BudgetExhausted);
        assert!(report.evaluations <= budget, "{} evaluations for a budget of {budget}", report.evaluations);
        assert!(engine.active_set().is_downward_closed());
    }
}

#[test]
fn failure_stops_the_run()
{
    let f = FallibleFunction(|x: &[f64]| {
        if x[0] == 0.75 { Err(ObjectiveError::new("solver diverged")) } else { Ok(x[0].exp() + x[1]) }
    });
    let config = CombiConfig { dimension: 2, tolerance: 1e-10, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&f).unwrap();
    assert_eq!(report.state, RefinementState::Failed);
    let failure = report.failure.unwrap();
    assert_eq!(failure.point(), Some(&[0.75, 0.0][..]));
    assert!(engine.active_set().is_downward_closed());
    assert!(!engine.active_set().contains(&[2, 0]));
    // the last combination stays available
    assert!(report.aggregate.integral[0].is_finite());
}

#[test]
fn failed_candidates_can_be_skipped()
{
    let f = FallibleFunction(|x: &[f64]| {
        if x[0] == 0.75 { Err(ObjectiveError::new("solver diverged")) } else { Ok(x[0].exp() + x[1]) }
    });
    let config = CombiConfig { dimension: 2, tolerance: 1e-10, evaluation_budget: 300, skip_failed_candidates: true, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&f).unwrap();
    assert_ne!(report.state, RefinementState::Failed);
    assert!(report.failure.is_none());
    assert!(!engine.active_set().contains(&[2, 0]));
    assert!(!engine.frontier().contains(&vec![2, 0]));
    assert!(engine.export_state().rejected.contains(&vec![2, 0]));
}

#[test]
fn analytic_strategy_needs_reference()
{
    let config = CombiConfig { dimension: 2, node_rule: NodeRuleKind::GaussLegendre, growth_factor: 1, error_strategy: ErrorStrategy::Analytic, tolerance: 1e-12, ..Default::default() };
    let f = ScalarFunction(|x: &[f64]| (x[0] + x[1]).exp());
    let mut engine = AdaptiveCombinationGrid::new(config.clone()).unwrap();
    assert!(matches!(engine.run(&f), Err(CombiError::InvalidConfiguration(_))));

    let exact = (1f64.exp() - 1.0).powi(2);
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    engine.set_reference(ReferenceSolution::from_integral(vec![exact])).unwrap();
    let report = engine.run(&f).unwrap();
    assert_eq!(report.state, RefinementState::Converged);
    assert!((report.aggregate.integral[0] - exact).abs() < 1e-6);
}

#[test]
fn interpolation_reproduces_polynomials()
{
    let config = CombiConfig { dimension: 2, node_rule: NodeRuleKind::ClenshawCurtis, mode: ApproximationMode::Interpolation, domain_bounds: vec![[-1.0, 1.0], [0.0, 2.0]], ..Default::default() };
    let p = |x: &[f64]| x[0] * x[0] * x[1] + x[1].powi(3);
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    engine.regular(2, &ScalarFunction(p)).unwrap();
    for x in [[0.3, 0.7], [-0.9, 1.9], [0.0, 0.0]]
    {
        assert!((engine.interpolate(&x).unwrap()[0] - p(&x)).abs() < 1e-12);
    }
}

#[test]
fn spectral_coefficients_of_vector_objective()
{
    let config = CombiConfig { dimension: 2, node_rule: NodeRuleKind::GaussLegendre, growth_factor: 1, mode: ApproximationMode::Spectral, tolerance: 1e-10, max_iterations: Some(12), ..Default::default() };
    let f = VectorFunction::new(2, |x: &[f64]| vec![1.0 + x[0], x[0] * x[1]]);
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&f).unwrap();
    assert_ne!(report.state, RefinementState::Failed);
    let coefficients = engine.spectral().unwrap();
    // the constant mode of an orthonormal basis is the mean
    let constant = &coefficients[&vec![0, 0]];
    assert!((constant[0] - 1.5).abs() < 1e-12);
    assert!((constant[1] - 0.25).abs() < 1e-12);
}

#[test]
fn open_rule_on_gaussian()
{
    let config = CombiConfig { dimension: 2, node_rule: NodeRuleKind::Symmetric, tolerance: 1e-6, evaluation_budget: 5000, ..Default::default() };
    let mut engine = AdaptiveCombinationGrid::new(config).unwrap();
    let report = engine.run(&ScalarFunction(|x: &[f64]| (-x[0] * x[0] - x[1] * x[1]).exp())).unwrap();
    let exact = (std::f64::consts::PI.sqrt() / 2.0 * libm::erf(1.0)).powi(2);
    assert!(report.evaluations <= 5000);
    assert!((report.aggregate.integral[0] - exact).abs() < 1e-4);
}
