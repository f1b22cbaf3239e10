use serde::Serialize;

use bbr_core::{PositionStatus, Signal};
use bbr_strategy::SignalBar;

/// Exclusive long/flat state carried from one bar to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    InMarket,
}

impl PositionState {
    /// Units held: 1 in the market, 0 flat.
    #[inline]
    pub fn units(self) -> u8 {
        match self {
            PositionState::Flat => 0,
            PositionState::InMarket => 1,
        }
    }

    /// Apply one bar's signal, returning the next state and the bar's status.
    ///
    /// A buy while already long and a sell while flat are ignored: no
    /// pyramiding, no shorting.
    pub fn transition(self, signal: Signal) -> (PositionState, PositionStatus) {
        match (self, signal) {
            (PositionState::Flat, Signal::Buy) => (PositionState::InMarket, PositionStatus::BuyAndHold),
            (PositionState::InMarket, Signal::Sell) => (PositionState::Flat, PositionStatus::Sell),
            (PositionState::InMarket, _) => (PositionState::InMarket, PositionStatus::Holding),
            (PositionState::Flat, _) => (PositionState::Flat, PositionStatus::OutOfMarket),
        }
    }
}

/// One row of the trade log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionRecord {
    pub timestamp: i64,
    pub price: f64,
    pub signal: Signal,
    pub position: u8,
    pub status: PositionStatus,
    pub period_return: f64,
    pub strategy_return: f64,
    pub portfolio_value: f64,
    pub holdings: f64,
    pub cash: f64,
}

/// Fold signal bars into position records, strictly in order.
///
/// Position and status at bar `t` depend only on the state after `t - 1` and
/// the signal at `t`. The strategy return at `t` uses the position held
/// *entering* `t`, so a trade opened on a bar earns nothing on that bar.
/// Valuation fields are left at zero; see [`crate::valuation`].
pub fn simulate_positions(bars: &[SignalBar]) -> Vec<PositionRecord> {
    let mut records = Vec::with_capacity(bars.len());
    let mut state = PositionState::Flat;
    let mut prev_close: Option<f64> = None;

    for bar in bars {
        let held = state;
        let (next, status) = state.transition(bar.signal);

        let period_return = prev_close.map_or(0.0, |prev| bar.close / prev - 1.0);
        let strategy_return = match held {
            PositionState::InMarket => period_return,
            PositionState::Flat => 0.0,
        };

        records.push(PositionRecord {
            timestamp: bar.timestamp,
            price: bar.close,
            signal: bar.signal,
            position: next.units(),
            status,
            period_return,
            strategy_return,
            portfolio_value: 0.0,
            holdings: 0.0,
            cash: 0.0,
        });

        state = next;
        prev_close = Some(bar.close);
    }

    records
}
