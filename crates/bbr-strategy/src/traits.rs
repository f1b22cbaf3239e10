use bbr_core::{PriceSeries, StrategyParams};

use crate::signals::SignalBar;

/// Unique strategy identifier.
pub type StrategyId = &'static str;

/// Pure-function strategy interface for backtesting.
///
/// A strategy turns a validated price series into one [`SignalBar`] per bar
/// it can evaluate. It holds no state between calls, and must be
/// Send + Sync so the optimizer and comparison runner can fan out with Rayon.
pub trait Strategy: Send + Sync {
    /// Evaluate the whole series.
    ///
    /// Bars without enough history are omitted rather than padded, so the
    /// output may be shorter than `prices` (or empty).
    fn evaluate(&self, prices: &PriceSeries) -> Vec<SignalBar>;

    /// Return the strategy's unique identifier.
    fn id(&self) -> StrategyId;

    /// Parameters this instance was built with.
    fn params(&self) -> StrategyParams;
}
