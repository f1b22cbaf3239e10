use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use bbr_core::{OptimizerConfig, PriceSeries, StrategyParams};
use bbr_strategy::BandReversion;

use crate::engine::BacktestEngine;
use crate::error::BacktestError;
use crate::metrics::std_dev;

/// Outcome of a grid search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub window: usize,
    pub num_std: f64,
    pub sharpe: f64,
    /// Grid cells that ran to completion, scored or skipped.
    pub evaluated: usize,
    pub skipped: usize,
    /// No cell qualified and the defaults were returned instead.
    pub used_fallback: bool,
}

impl OptimizationResult {
    pub const FALLBACK_WINDOW: usize = 20;
    pub const FALLBACK_NUM_STD: f64 = 2.0;

    fn fallback(evaluated: usize, skipped: usize) -> Self {
        Self {
            window: Self::FALLBACK_WINDOW,
            num_std: Self::FALLBACK_NUM_STD,
            sharpe: 0.0,
            evaluated,
            skipped,
            used_fallback: true,
        }
    }

    pub fn params(&self) -> StrategyParams {
        StrategyParams {
            window: self.window,
            num_std: self.num_std,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CellOutcome {
    Scored { params: StrategyParams, sharpe: f64 },
    Skipped,
    Cancelled,
}

/// Exhaustive (window, num_std) search maximizing the Sharpe ratio.
///
/// Cells are scored by `mean / std * sqrt(trading_days)` of their strategy
/// returns, without the risk-free adjustment used in [`crate::Metrics`].
///
/// Cells are independent full backtests. With `parallel` set they fan out
/// over Rayon, but outcomes are collected in grid order (window ascending,
/// then num_std ascending) and the first strictly greater Sharpe wins, so the
/// answer does not depend on scheduling.
pub struct Optimizer {
    config: OptimizerConfig,
    engine: BacktestEngine,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, engine: BacktestEngine) -> Self {
        Self { config, engine }
    }

    /// Grid cells in evaluation order.
    pub fn grid(&self) -> Vec<StrategyParams> {
        let num_stds = self.config.num_std_values();
        self.config
            .window_range()
            .flat_map(|window| {
                num_stds
                    .iter()
                    .map(move |&num_std| StrategyParams { window, num_std })
            })
            .collect()
    }

    pub fn optimize(&self, prices: &PriceSeries) -> Result<OptimizationResult, BacktestError> {
        self.optimize_with_cancel(prices, &AtomicBool::new(false))
    }

    /// Like [`Optimizer::optimize`], checking `cancel` before each grid cell.
    pub fn optimize_with_cancel(
        &self,
        prices: &PriceSeries,
        cancel: &AtomicBool,
    ) -> Result<OptimizationResult, BacktestError> {
        prices.validate()?;
        self.config.check_grid()?;

        let grid = self.grid();
        let outcomes: Vec<CellOutcome> = if self.config.parallel {
            grid.par_iter()
                .map(|params| self.evaluate_cell(prices, params, cancel))
                .collect()
        } else {
            grid.iter()
                .map(|params| self.evaluate_cell(prices, params, cancel))
                .collect()
        };

        let evaluated = outcomes
            .iter()
            .filter(|o| !matches!(o, CellOutcome::Cancelled))
            .count();
        if evaluated < outcomes.len() {
            return Err(BacktestError::Cancelled {
                evaluated,
                total: grid.len(),
            });
        }
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, CellOutcome::Skipped))
            .count();

        match select_best(&outcomes) {
            Some((params, sharpe)) => {
                info!(
                    window = params.window,
                    num_std = params.num_std,
                    sharpe,
                    evaluated,
                    skipped,
                    "optimization complete"
                );
                Ok(OptimizationResult {
                    window: params.window,
                    num_std: params.num_std,
                    sharpe,
                    evaluated,
                    skipped,
                    used_fallback: false,
                })
            }
            None => {
                warn!(
                    evaluated,
                    "optimization found no usable parameters, using defaults"
                );
                Ok(OptimizationResult::fallback(evaluated, skipped))
            }
        }
    }

    fn evaluate_cell(
        &self,
        prices: &PriceSeries,
        params: &StrategyParams,
        cancel: &AtomicBool,
    ) -> CellOutcome {
        if cancel.load(Ordering::Relaxed) {
            return CellOutcome::Cancelled;
        }

        let result = match self.engine.run(prices, &BandReversion::new(*params)) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    window = params.window,
                    num_std = params.num_std,
                    error = %err,
                    "skipping grid cell"
                );
                return CellOutcome::Skipped;
            }
        };

        let returns = result.strategy_returns();
        if std_dev(&returns) <= 0.0 {
            debug!(window = params.window, num_std = params.num_std, "flat returns, skipping");
            return CellOutcome::Skipped;
        }

        let sharpe = self.engine.metrics_calculator().unadjusted_sharpe(&returns);
        if !sharpe.is_finite() {
            return CellOutcome::Skipped;
        }
        debug!(window = params.window, num_std = params.num_std, sharpe, "grid cell");
        CellOutcome::Scored {
            params: *params,
            sharpe,
        }
    }
}

/// First cell with the strictly highest Sharpe.
fn select_best(outcomes: &[CellOutcome]) -> Option<(StrategyParams, f64)> {
    let mut best: Option<(StrategyParams, f64)> = None;
    for outcome in outcomes {
        if let CellOutcome::Scored { params, sharpe } = *outcome {
            if best.map_or(true, |(_, top)| sharpe > top) {
                best = Some((params, sharpe));
            }
        }
    }
    best
}

/// Grid-search `window_range` x `num_std_range` (both inclusive, band width
/// stepped by `step_size`) and return `(window, num_std, sharpe)`.
pub fn optimize(
    prices: &PriceSeries,
    window_range: (usize, usize),
    num_std_range: (f64, f64),
    step_size: f64,
) -> Result<(usize, f64, f64), BacktestError> {
    let config = OptimizerConfig {
        window_min: window_range.0,
        window_max: window_range.1,
        std_min: num_std_range.0,
        std_max: num_std_range.1,
        step: step_size,
        parallel: true,
    };
    let result = Optimizer::new(config, BacktestEngine::default()).optimize(prices)?;
    Ok((result.window, result.num_std, result.sharpe))
}
