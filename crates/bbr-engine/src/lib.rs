pub mod engine;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod parallel;
pub mod position;
pub mod valuation;

pub use engine::{backtest, BacktestEngine, BacktestResult};
pub use error::BacktestError;
pub use metrics::{compute_metrics, Metrics, MetricsCalculator};
pub use optimizer::{optimize, OptimizationResult, Optimizer};
pub use parallel::{best_by_sharpe, ComparisonRow, ComparisonRunner};
pub use position::{simulate_positions, PositionRecord, PositionState};
pub use valuation::apply_valuation;
