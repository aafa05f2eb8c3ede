use sgcombi::{serialization::{deserialize, read_state, serialize, write_state}, AdaptiveCombinationGrid, CombiConfig, CombiError, EngineState, NodeRuleKind, RefinementState, ScalarFunction, SerializationFormat};

fn objective(x: &[f64]) -> f64
{
    (x[0] - 0.3).abs().sqrt() + x[1] * x[1]
}

fn config() -> CombiConfig
{
    CombiConfig { dimension: 2, node_rule: NodeRuleKind::ClenshawCurtis, tolerance: 1e-7, max_iterations: Some(6), absorb_frontier: false, ..Default::default() }
}

#[test]
fn resumed_engine_matches_original()
{
    let f = ScalarFunction(objective);
    let mut engine = AdaptiveCombinationGrid::new(config()).unwrap();
    let report = engine.run(&f).unwrap();
    assert_eq!(report.state, RefinementState::BudgetExhausted);
    let state = engine.export_state();
    assert_eq!(state.evaluations(), report.evaluations);

    for format in [SerializationFormat::Json, SerializationFormat::JsonLz4, SerializationFormat::Bincode, SerializationFormat::BincodeLz4]
    {
        let bytes = serialize(&state, format).unwrap();
        let restored: EngineState = deserialize(&bytes, format).unwrap();
        assert_eq!(restored, state, "{format:?}");

        let resumed = AdaptiveCombinationGrid::import_state(restored).unwrap();
        assert_eq!(resumed.state(), RefinementState::Iterating);
        assert_eq!(resumed.iterations(), engine.iterations());
        assert_eq!(resumed.evaluations(), engine.evaluations());
        assert_eq!(resumed.cache().len(), engine.cache().len());
        assert_eq!(resumed.active_set().combination_coefficients().len(), engine.active_set().len());
        assert_eq!(resumed.integral().unwrap()[0].to_bits(), report.aggregate.integral[0].to_bits());
        assert_eq!(resumed.interpolate(&[0.1, 0.9]).unwrap(), engine.interpolate(&[0.1, 0.9]).unwrap());
    }
}

#[test]
fn resumed_engine_continues_refining()
{
    let f = ScalarFunction(objective);
    let mut engine = AdaptiveCombinationGrid::new(config()).unwrap();
    engine.run(&f).unwrap();
    let path = std::env::temp_dir().join("sgcombi_resume_test.json");
    let path = path.to_string_lossy();
    write_state(&engine.export_state(), &path, SerializationFormat::Json).unwrap();
    let state = read_state(&path, SerializationFormat::Json).unwrap();
    std::fs::remove_file(path.as_ref()).unwrap();

    let evaluations = state.evaluations();
    let config = CombiConfig { max_iterations: Some(12), ..state.config.clone() };
    let mut resumed = AdaptiveCombinationGrid::import_state(EngineState { config, ..state }).unwrap();
    let report = resumed.run(&f).unwrap();
    assert!(report.iterations > 6);
    assert!(report.evaluations > evaluations);
    assert!(resumed.active_set().is_downward_closed());
    resumed.active_set().cross_check_coefficients().unwrap();
}

#[test]
fn inconsistent_state_is_rejected()
{
    let f = ScalarFunction(objective);
    let mut engine = AdaptiveCombinationGrid::new(config()).unwrap();
    engine.run(&f).unwrap();
    let state = engine.export_state();

    let mut tampered = state.clone();
    if let Some(coefficient) = tampered.active.values_mut().next()
    {
        *coefficient += 1;
    }
    assert!(matches!(AdaptiveCombinationGrid::import_state(tampered), Err(CombiError::NumericalDegeneracy(_))));

    let mut truncated = state.clone();
    truncated.cache.remove(0);
    assert!(matches!(AdaptiveCombinationGrid::import_state(truncated), Err(CombiError::EvaluationFailed { .. })));

    let mut gap = state;
    gap.active.remove(&vec![0, 0]);
    assert!(matches!(AdaptiveCombinationGrid::import_state(gap), Err(CombiError::InvalidRefinementOrder { .. })));
}
