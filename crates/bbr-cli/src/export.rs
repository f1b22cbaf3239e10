use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use bbr_core::{format_day, PositionStatus, Signal};
use bbr_engine::{ComparisonRow, PositionRecord};

/// One trade-log row as written to CSV.
#[derive(Debug, Serialize)]
struct TradeLogRow {
    date: String,
    price: f64,
    signal: Signal,
    position: u8,
    status: PositionStatus,
    returns: f64,
    strategy_returns: f64,
    portfolio_value: f64,
    holdings: f64,
    cash: f64,
}

impl From<&PositionRecord> for TradeLogRow {
    fn from(r: &PositionRecord) -> Self {
        Self {
            date: format_day(r.timestamp),
            price: r.price,
            signal: r.signal,
            position: r.position,
            status: r.status,
            returns: r.period_return,
            strategy_returns: r.strategy_return,
            portfolio_value: r.portfolio_value,
            holdings: r.holdings,
            cash: r.cash,
        }
    }
}

#[derive(Debug, Serialize)]
struct ComparisonCsvRow<'a> {
    strategy: &'a str,
    window: usize,
    num_std: f64,
    final_capital: f64,
    trades: usize,
    market_exposure: f64,
    total_return: f64,
    annualized_return: f64,
    annualized_volatility: f64,
    sharpe_ratio: f64,
    max_drawdown: f64,
    win_rate: f64,
}

pub fn write_trade_log(path: &Path, records: &[PositionRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        writer.serialize(TradeLogRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_comparison(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        let m = &row.metrics;
        writer.serialize(ComparisonCsvRow {
            strategy: &row.name,
            window: row.window,
            num_std: row.num_std,
            final_capital: row.final_capital,
            trades: row.trades,
            market_exposure: row.market_exposure,
            total_return: m.total_return,
            annualized_return: m.annualized_return,
            annualized_volatility: m.annualized_volatility,
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown: m.max_drawdown,
            win_rate: m.win_rate,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Portfolio values of every configuration, one column each, aligned by date.
///
/// Configurations with a longer window start later; their leading cells are empty.
pub fn write_portfolio_curves(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut by_ts: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
    for (col, row) in rows.iter().enumerate() {
        for &(ts, value) in &row.portfolio_values {
            by_ts.entry(ts).or_insert_with(|| vec![None; rows.len()])[col] = Some(value);
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec!["date".to_string()];
    header.extend(rows.iter().map(|r| r.name.clone()));
    writer.write_record(&header)?;

    for (ts, values) in by_ts {
        let mut record = vec![format_day(ts)];
        record.extend(
            values
                .iter()
                .map(|v| v.map(|x| format!("{x:.2}")).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
