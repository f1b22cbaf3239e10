use std::fmt;

use serde::Serialize;

/// Computed performance metrics.
///
/// `max_drawdown` is reported as a non-positive fraction (−0.25 is a 25%
/// peak-to-trough decline).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Return: {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "Annualized Return: {:.2}%", self.annualized_return * 100.0)?;
        writeln!(f, "Annualized Volatility: {:.2}%", self.annualized_volatility * 100.0)?;
        writeln!(f, "Sharpe Ratio: {:.2}", self.sharpe_ratio)?;
        writeln!(f, "Maximum Drawdown: {:.2}%", self.max_drawdown * 100.0)?;
        write!(f, "Win Rate: {:.2}%", self.win_rate * 100.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    trading_days: f64,
    risk_free_rate: f64,
}

impl MetricsCalculator {
    pub const TRADING_DAYS: u32 = 252;
    pub const RISK_FREE_RATE: f64 = 0.02;

    pub fn new(trading_days: u32, risk_free_rate: f64) -> Self {
        Self {
            trading_days: f64::from(trading_days),
            risk_free_rate,
        }
    }

    /// Calculate all performance metrics from capital endpoints and per-period returns.
    ///
    /// Never fails: an empty or flat return series yields the zero fallbacks.
    pub fn calculate(&self, initial_capital: f64, final_capital: f64, returns: &[f64]) -> Metrics {
        let total_return = Self::total_return(initial_capital, final_capital);
        Metrics {
            total_return,
            annualized_return: self.annualized_return(total_return, returns.len()),
            annualized_volatility: std_dev(returns) * self.trading_days.sqrt(),
            sharpe_ratio: self.sharpe_ratio(returns),
            max_drawdown: Self::max_drawdown(returns),
            win_rate: Self::win_rate(returns),
        }
    }

    fn total_return(initial: f64, final_capital: f64) -> f64 {
        if initial == 0.0 {
            return 0.0;
        }
        (final_capital - initial) / initial
    }

    fn annualized_return(&self, total_return: f64, periods: usize) -> f64 {
        if total_return <= -1.0 {
            return -1.0;
        }
        if periods == 0 {
            return 0.0;
        }
        let period_years = periods as f64 / self.trading_days;
        (1.0 + total_return).powf(1.0 / period_years) - 1.0
    }

    /// Per-period risk-free rate equivalent to the annual rate.
    pub fn daily_risk_free(&self) -> f64 {
        (1.0 + self.risk_free_rate).powf(1.0 / self.trading_days) - 1.0
    }

    /// Mean excess return over the standard deviation of the raw returns,
    /// annualized. Zero when the returns have no dispersion.
    pub fn sharpe_ratio(&self, returns: &[f64]) -> f64 {
        let std = std_dev(returns);
        if std <= 0.0 || !std.is_finite() {
            return 0.0;
        }
        let rf = self.daily_risk_free();
        let excess_mean = returns.iter().map(|r| r - rf).sum::<f64>() / returns.len() as f64;
        excess_mean / std * self.trading_days.sqrt()
    }

    /// Mean return over its standard deviation, annualized, with no
    /// risk-free adjustment. This is the optimizer's objective. Zero when the
    /// returns have no dispersion.
    pub fn unadjusted_sharpe(&self, returns: &[f64]) -> f64 {
        let std = std_dev(returns);
        if std <= 0.0 || !std.is_finite() {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        mean / std * self.trading_days.sqrt()
    }

    /// Worst decline of the compounded return curve from its running peak.
    fn max_drawdown(returns: &[f64]) -> f64 {
        let mut cumulative = 1.0;
        let mut peak = f64::NEG_INFINITY;
        let mut max_dd = 0.0f64;
        for r in returns {
            cumulative *= 1.0 + r;
            peak = peak.max(cumulative);
            if peak > 0.0 {
                max_dd = max_dd.min(cumulative / peak - 1.0);
            }
        }
        max_dd
    }

    fn win_rate(returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let wins = returns.iter().filter(|&&r| r > 0.0).count();
        wins as f64 / returns.len() as f64
    }
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(Self::TRADING_DAYS, Self::RISK_FREE_RATE)
    }
}

/// Compute metrics with the default 252-day year and 2% risk-free rate.
pub fn compute_metrics(initial_capital: f64, final_capital: f64, returns: &[f64]) -> Metrics {
    MetricsCalculator::default().calculate(initial_capital, final_capital, returns)
}

/// Sample standard deviation; zero below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
