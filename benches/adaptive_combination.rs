use criterion::{criterion_group, criterion_main, Criterion};
use sgcombi::{logger::setup_log, AdaptiveCombinationGrid, CombiConfig, NodeRuleKind, ScalarFunction};

fn objective(x: &[f64]) -> f64
{
    x.iter().enumerate().map(|(d, v)| (d as f64 + 1.0) * v * v).sum::<f64>().exp()
}

fn build_grid() -> AdaptiveCombinationGrid
{
    let config = CombiConfig { dimension: 4, node_rule: NodeRuleKind::ClenshawCurtis, tolerance: 1e-6, evaluation_budget: 20_000, log_level: "warn".to_string(), ..Default::default() };
    setup_log(&config).unwrap();
    let mut grid = AdaptiveCombinationGrid::new(config).unwrap();
    grid.run(&ScalarFunction(objective)).unwrap();
    grid
}

fn interpolate(grid: &AdaptiveCombinationGrid)
{
    for _ in 0..1e3 as usize
    {
        let _ = grid.interpolate(&[0.2, 0.4, 0.6, 0.8]).unwrap()[0];
    }
}

fn run_case(c: &mut Criterion)
{
    c.bench_function("adaptive refinement", |b| b.iter(build_grid));
    let grid = build_grid();
    c.bench_function("combined interpolant", |b| b.iter(|| interpolate(&grid)));
}

criterion_group!(benches, run_case);
criterion_main!(benches);
