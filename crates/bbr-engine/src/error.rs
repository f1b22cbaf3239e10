use thiserror::Error;

use bbr_core::{ConfigError, ParamError, PriceError};

#[derive(Debug, Error)]
pub enum BacktestError {
    /// The price series came back empty; nothing can run on it.
    #[error("price data unavailable")]
    InputUnavailable,
    #[error("invalid price series: {0}")]
    InvalidPrices(PriceError),
    #[error("need at least {window} closes to form bands, got {available}")]
    InsufficientHistory { window: usize, available: usize },
    #[error(transparent)]
    InvalidParams(#[from] ParamError),
    #[error("initial capital must be positive and finite, got {0}")]
    InvalidCapital(f64),
    #[error("invalid optimizer grid: {0}")]
    InvalidGrid(#[from] ConfigError),
    #[error("optimization cancelled after {evaluated} of {total} grid cells")]
    Cancelled { evaluated: usize, total: usize },
    #[error("no configuration produced a backtest result")]
    NoSuccessfulRuns,
}

impl From<PriceError> for BacktestError {
    fn from(err: PriceError) -> Self {
        match err {
            PriceError::Empty => BacktestError::InputUnavailable,
            other => BacktestError::InvalidPrices(other),
        }
    }
}
