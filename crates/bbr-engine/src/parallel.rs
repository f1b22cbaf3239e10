use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use bbr_core::{CompareEntry, PriceSeries};
use bbr_strategy::BandReversion;

use crate::engine::BacktestEngine;
use crate::error::BacktestError;
use crate::metrics::Metrics;

/// Summary of one named configuration in a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    pub window: usize,
    pub num_std: f64,
    pub final_capital: f64,
    pub trades: usize,
    /// Fraction of bars with a position open.
    pub market_exposure: f64,
    pub metrics: Metrics,
    #[serde(skip)]
    pub portfolio_values: Vec<(i64, f64)>,
}

/// Backtest several named parameter sets over the same prices.
///
/// Configurations run in parallel via `par_iter`; rows come back in input
/// order. A failing configuration is logged and left out.
pub struct ComparisonRunner {
    engine: BacktestEngine,
}

impl ComparisonRunner {
    pub fn new(engine: BacktestEngine) -> Self {
        Self { engine }
    }

    pub fn run_all(
        &self,
        prices: &PriceSeries,
        entries: &[CompareEntry],
    ) -> Result<Vec<ComparisonRow>, BacktestError> {
        prices.validate()?;

        let rows: Vec<ComparisonRow> = entries
            .par_iter()
            .filter_map(|entry| match self.run_one(prices, entry) {
                Ok(row) => Some(row),
                Err(err) => {
                    warn!(name = %entry.name, error = %err, "comparison run failed, skipping");
                    None
                }
            })
            .collect();

        if rows.is_empty() {
            return Err(BacktestError::NoSuccessfulRuns);
        }
        info!(requested = entries.len(), completed = rows.len(), "comparison complete");
        Ok(rows)
    }

    fn run_one(
        &self,
        prices: &PriceSeries,
        entry: &CompareEntry,
    ) -> Result<ComparisonRow, BacktestError> {
        let params = entry.params()?;
        let result = self.engine.run(prices, &BandReversion::new(params))?;
        Ok(ComparisonRow {
            name: entry.name.clone(),
            window: params.window,
            num_std: params.num_std,
            final_capital: result.final_capital(),
            trades: result.trade_count(),
            market_exposure: result.market_exposure(),
            metrics: result.metrics,
            portfolio_values: result.equity_curve(),
        })
    }
}

/// Row with the highest Sharpe ratio; earlier rows win ties.
pub fn best_by_sharpe(rows: &[ComparisonRow]) -> Option<&ComparisonRow> {
    rows.iter().fold(None, |best: Option<&ComparisonRow>, row| match best {
        Some(b) if b.metrics.sharpe_ratio >= row.metrics.sharpe_ratio => Some(b),
        _ => Some(row),
    })
}
