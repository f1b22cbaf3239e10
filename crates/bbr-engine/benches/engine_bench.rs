use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bbr_core::{OptimizerConfig, PriceSeries, StrategyParams};
use bbr_engine::{BacktestEngine, Optimizer};
use bbr_strategy::{compute_bands, BandReversion};

fn make_prices(n: usize) -> PriceSeries {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            // Slow drift plus two cycles so the bands get crossed regularly.
            let trend = (i as f64) * 0.01;
            let swing = ((i as f64) * 0.13).sin() * 4.0 + ((i as f64) * 0.71).cos();
            100.0 + trend + swing
        })
        .collect();
    PriceSeries::from_closes(&closes)
}

fn bench_single_backtest(c: &mut Criterion) {
    let prices = make_prices(5_000);
    let engine = BacktestEngine::default();
    let strategy = BandReversion::default();

    c.bench_function("single_backtest_5k", |b| {
        b.iter(|| {
            let result = engine.run(black_box(&prices), &strategy);
            black_box(result).ok();
        });
    });
}

fn bench_optimizer_grid(c: &mut Criterion) {
    let prices = make_prices(2_500);
    let optimizer = Optimizer::new(OptimizerConfig::default(), BacktestEngine::default());

    c.bench_function("optimizer_default_grid_2500", |b| {
        b.iter(|| {
            let result = optimizer.optimize(black_box(&prices));
            black_box(result).ok();
        });
    });
}

fn bench_compute_bands(c: &mut Criterion) {
    let prices = make_prices(100_000);
    let params = StrategyParams::default();

    c.bench_function("compute_bands_100k", |b| {
        b.iter(|| {
            let frames = compute_bands(black_box(&prices), &params);
            black_box(frames);
        });
    });
}

criterion_group!(
    benches,
    bench_single_backtest,
    bench_optimizer_grid,
    bench_compute_bands,
);
criterion_main!(benches);
