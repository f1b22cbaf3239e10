use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Band parameters for one backtest run: rolling window length and band
/// width in standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub window: usize,
    pub num_std: f64,
}

impl StrategyParams {
    pub const DEFAULT_WINDOW: usize = 20;
    pub const DEFAULT_NUM_STD: f64 = 2.0;

    pub fn new(window: usize, num_std: f64) -> Result<Self, ParamError> {
        let params = Self { window, num_std };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.window < 2 {
            return Err(ParamError::WindowTooSmall(self.window));
        }
        if !(self.num_std.is_finite() && self.num_std > 0.0) {
            return Err(ParamError::InvalidNumStd(self.num_std));
        }
        Ok(())
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
            num_std: Self::DEFAULT_NUM_STD,
        }
    }
}

impl fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window={}, num_std={:.2}", self.window, self.num_std)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("window must be at least 2, got {0}")]
    WindowTooSmall(usize),
    #[error("num_std must be positive and finite, got {0}")]
    InvalidNumStd(f64),
}
