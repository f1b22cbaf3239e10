pub mod config;
pub mod params;
pub mod price;
pub mod signal;

pub use config::{
    BacktestConfig, BacktestSection, CompareEntry, ConfigError, OptimizerConfig, MAX_GRID_CELLS,
};
pub use params::{ParamError, StrategyParams};
pub use price::{format_day, PriceError, PriceSeries};
pub use signal::{PositionStatus, Signal};
