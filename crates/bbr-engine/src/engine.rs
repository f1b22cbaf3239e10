use serde::Serialize;
use tracing::debug;

use bbr_core::{BacktestSection, PositionStatus, PriceSeries, StrategyParams};
use bbr_strategy::{signal_events, BandReversion, SignalBar, Strategy};

use crate::error::BacktestError;
use crate::metrics::{Metrics, MetricsCalculator};
use crate::position::{simulate_positions, PositionRecord};
use crate::valuation::apply_valuation;

/// Full backtest result for a single parameter set.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub params: StrategyParams,
    pub initial_capital: f64,
    pub records: Vec<PositionRecord>,
    pub signal_events: Vec<SignalBar>,
    pub metrics: Metrics,
}

impl BacktestResult {
    pub fn final_capital(&self) -> f64 {
        self.records
            .last()
            .map_or(self.initial_capital, |r| r.portfolio_value)
    }

    pub fn strategy_returns(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.strategy_return).collect()
    }

    /// `(timestamp, portfolio value)` per bar.
    pub fn equity_curve(&self) -> Vec<(i64, f64)> {
        self.records
            .iter()
            .map(|r| (r.timestamp, r.portfolio_value))
            .collect()
    }

    /// Fraction of bars spent in the market.
    pub fn market_exposure(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let held: u32 = self.records.iter().map(|r| u32::from(r.position)).sum();
        f64::from(held) / self.records.len() as f64
    }

    /// Number of entries taken.
    pub fn trade_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == PositionStatus::BuyAndHold)
            .count()
    }
}

/// Sequential long-only backtesting engine over daily closes.
///
/// For each run:
///   1. Strategy turns closes into signal bars (band-defined range only)
///   2. Bars are folded into positions, carrying state bar to bar
///   3. Strategy returns compound into portfolio value from initial capital
///   4. Metrics are computed from the strategy-return series
///
/// Holds no mutable state, so repeated runs on the same input are identical.
#[derive(Debug, Clone, Copy)]
pub struct BacktestEngine {
    initial_capital: f64,
    metrics: MetricsCalculator,
}

impl BacktestEngine {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            metrics: MetricsCalculator::default(),
        }
    }

    pub fn from_config(section: &BacktestSection) -> Self {
        Self::new(section.initial_capital).with_metrics(MetricsCalculator::new(
            section.trading_days,
            section.risk_free_rate,
        ))
    }

    pub fn with_metrics(mut self, metrics: MetricsCalculator) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn metrics_calculator(&self) -> &MetricsCalculator {
        &self.metrics
    }

    /// Run a full backtest of a strategy across the series.
    pub fn run(
        &self,
        prices: &PriceSeries,
        strategy: &dyn Strategy,
    ) -> Result<BacktestResult, BacktestError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(BacktestError::InvalidCapital(self.initial_capital));
        }
        prices.validate()?;
        let params = strategy.params();
        params.validate()?;

        let bars = strategy.evaluate(prices);
        if bars.is_empty() {
            return Err(BacktestError::InsufficientHistory {
                window: params.window,
                available: prices.len(),
            });
        }

        let mut records = simulate_positions(&bars);
        apply_valuation(&mut records, self.initial_capital);

        let returns: Vec<f64> = records.iter().map(|r| r.strategy_return).collect();
        let final_capital = records
            .last()
            .map_or(self.initial_capital, |r| r.portfolio_value);
        let metrics = self
            .metrics
            .calculate(self.initial_capital, final_capital, &returns);

        debug!(
            strategy = strategy.id(),
            window = params.window,
            num_std = params.num_std,
            bars = records.len(),
            final_capital,
            "backtest complete"
        );

        Ok(BacktestResult {
            strategy_id: strategy.id().to_string(),
            params,
            initial_capital: self.initial_capital,
            records,
            signal_events: signal_events(&bars),
            metrics,
        })
    }
}

impl Default for BacktestEngine {
    fn default() -> Self {
        Self::new(10_000.0)
    }
}

/// Backtest the band strategy and return the trade log plus the buy/sell bars.
pub fn backtest(
    prices: &PriceSeries,
    initial_capital: f64,
    window: usize,
    num_std: f64,
) -> Result<(Vec<PositionRecord>, Vec<SignalBar>), BacktestError> {
    let params = StrategyParams::new(window, num_std)?;
    let result = BacktestEngine::new(initial_capital).run(prices, &BandReversion::new(params))?;
    Ok((result.records, result.signal_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbr_core::Signal;

    fn make_oscillating(n: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 10.0 * ((i as f64) * 0.7).sin() + (i % 3) as f64)
            .collect();
        PriceSeries::from_closes(&closes)
    }

    #[test]
    fn test_engine_runs_without_panic() {
        let prices = make_oscillating(120);
        let engine = BacktestEngine::default();
        let result = engine.run(&prices, &BandReversion::default()).unwrap();

        assert_eq!(result.records.len(), 120 - 19);
        assert_eq!(result.strategy_id, "band_reversion");
        assert!(result.signal_events.iter().all(|b| b.signal != Signal::None));
    }

    #[test]
    fn test_first_record_starts_at_initial_capital() {
        let prices = make_oscillating(60);
        let result = BacktestEngine::new(2_500.0)
            .run(&prices, &BandReversion::default())
            .unwrap();
        assert_eq!(result.records[0].portfolio_value, 2_500.0);
        assert_eq!(result.records[0].strategy_return, 0.0);
    }

    #[test]
    fn test_empty_prices_are_unavailable() {
        let engine = BacktestEngine::default();
        let err = engine
            .run(&PriceSeries::new(), &BandReversion::default())
            .unwrap_err();
        assert!(matches!(err, BacktestError::InputUnavailable));
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let prices = PriceSeries::from_closes(&[1.0, 2.0, 3.0]);
        let err = BacktestEngine::default()
            .run(&prices, &BandReversion::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::InsufficientHistory { window: 20, available: 3 }
        ));
    }

    #[test]
    fn test_rejects_bad_capital_and_params() {
        let prices = make_oscillating(40);
        assert!(matches!(
            BacktestEngine::new(0.0).run(&prices, &BandReversion::default()),
            Err(BacktestError::InvalidCapital(_))
        ));
        assert!(matches!(
            backtest(&prices, 1000.0, 1, 2.0),
            Err(BacktestError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_backtest_free_function() {
        let prices = make_oscillating(80);
        let (records, events) = backtest(&prices, 10_000.0, 10, 1.5).unwrap();
        assert_eq!(records.len(), 71);
        let event_count = records.iter().filter(|r| r.signal.is_event()).count();
        assert_eq!(events.len(), event_count);
    }

    #[test]
    fn test_market_exposure() {
        let prices = PriceSeries::from_closes(&[
            100.0, 102.0, 104.0, 95.0, 90.0, 96.0, 110.0, 108.0, 95.0, 100.0,
        ]);
        let strategy = BandReversion::new(StrategyParams::new(3, 1.0).unwrap());
        let result = BacktestEngine::default().run(&prices, &strategy).unwrap();
        // Positions 0, 0, 1, 1, 1, 0, 0, 1.
        assert_eq!(result.market_exposure(), 0.5);
    }

    #[test]
    fn test_from_config_uses_section_capital() {
        let section = BacktestSection {
            initial_capital: 42.0,
            ..BacktestSection::default()
        };
        assert_eq!(BacktestEngine::from_config(&section).initial_capital(), 42.0);
    }
}
