use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

use crate::params::{ParamError, StrategyParams};

/// Slack when counting band-width steps, so `2.5` is reached from `1.5` by `0.1`.
const STEP_TOLERANCE: f64 = 1e-9;

/// Largest optimizer grid accepted, in (window, num_std) cells.
pub const MAX_GRID_CELLS: usize = 1_000_000;

/// Top-level backtest config, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub strategy: StrategyParams,
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default = "default_compare")]
    pub compare: Vec<CompareEntry>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyParams::default(),
            backtest: BacktestSection::default(),
            optimizer: OptimizerConfig::default(),
            compare: default_compare(),
        }
    }
}

impl BacktestConfig {
    /// Load config from a TOML file path.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and merge multiple TOML files (later files override earlier).
    pub fn from_toml_files(paths: &[&Path]) -> Result<Self, ConfigError> {
        let (first, rest) = paths.split_first().ok_or(ConfigError::NoFiles)?;

        let mut base: toml::Value = toml::from_str(&std::fs::read_to_string(first)?)?;
        for path in rest {
            let overlay: toml::Value = toml::from_str(&std::fs::read_to_string(path)?)?;
            merge_toml(&mut base, overlay);
        }

        let merged_str = toml::to_string(&base)?;
        Self::from_toml_str(&merged_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.backtest.validate()?;
        self.optimizer.validate()?;
        for entry in &self.compare {
            entry.params()?;
        }
        Ok(())
    }
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    if let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) = (base, overlay) {
        for (key, value) in overlay_table {
            if let Some(base_value) = base_table.get_mut(&key) {
                if base_value.is_table() && value.is_table() {
                    merge_toml(base_value, value);
                    continue;
                }
            }
            base_table.insert(key, value);
        }
    }
}

/// Capital and annualization settings shared by every run.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSection {
    #[serde(default = "default_10000")]
    pub initial_capital: f64,
    #[serde(default = "default_252")]
    pub trading_days: u32,
    #[serde(default = "default_0_02")]
    pub risk_free_rate: f64,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            trading_days: 252,
            risk_free_rate: 0.02,
        }
    }
}

impl BacktestSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.trading_days == 0 {
            return Err(ConfigError::Invalid("trading_days must be non-zero".into()));
        }
        if !self.risk_free_rate.is_finite() || self.risk_free_rate <= -1.0 {
            return Err(ConfigError::Invalid(format!(
                "risk_free_rate out of range: {}",
                self.risk_free_rate
            )));
        }
        Ok(())
    }
}

/// Grid-search bounds: integer windows and a stepped band-width range, both inclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_10")]
    pub window_min: usize,
    #[serde(default = "default_30")]
    pub window_max: usize,
    #[serde(default = "default_1_5")]
    pub std_min: f64,
    #[serde(default = "default_2_5")]
    pub std_max: f64,
    #[serde(default = "default_0_1")]
    pub step: f64,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            window_min: 10,
            window_max: 30,
            std_min: 1.5,
            std_max: 2.5,
            step: 0.1,
            parallel: true,
        }
    }
}

impl OptimizerConfig {
    pub fn window_range(&self) -> RangeInclusive<usize> {
        self.window_min..=self.window_max
    }

    /// Band widths from `std_min` to `std_max` inclusive.
    ///
    /// Values are `std_min + k * step` for an integer `k`, so the grid does not
    /// drift with repeated float addition. A non-positive step or an inverted
    /// range yields `std_min` alone.
    pub fn num_std_values(&self) -> Vec<f64> {
        match self.num_std_steps() {
            Some(steps) => (0..=steps)
                .map(|k| self.std_min + k as f64 * self.step)
                .collect(),
            None => vec![self.std_min],
        }
    }

    /// Increments of `step` past `std_min`, saturating at [`MAX_GRID_CELLS`].
    /// `None` when the step or range is degenerate.
    fn num_std_steps(&self) -> Option<usize> {
        if self.step.is_nan() || self.step <= 0.0 || self.std_max < self.std_min {
            return None;
        }
        let raw = ((self.std_max - self.std_min) / self.step + STEP_TOLERANCE).floor();
        if raw.is_nan() {
            return None;
        }
        if raw >= MAX_GRID_CELLS as f64 {
            Some(MAX_GRID_CELLS)
        } else {
            Some(raw as usize)
        }
    }

    /// Number of grid cells the optimizer will evaluate.
    pub fn cell_count(&self) -> usize {
        let windows = if self.window_max < self.window_min {
            0
        } else {
            (self.window_max - self.window_min).saturating_add(1)
        };
        windows.saturating_mul(self.num_std_steps().map_or(1, |steps| steps + 1))
    }

    /// Reject grids too large to evaluate, returning the cell count otherwise.
    pub fn check_grid(&self) -> Result<usize, ConfigError> {
        let cells = self.cell_count();
        if cells > MAX_GRID_CELLS {
            return Err(ConfigError::Invalid(format!(
                "optimizer grid has {cells} cells, limit is {MAX_GRID_CELLS}"
            )));
        }
        Ok(cells)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_min < 2 {
            return Err(ParamError::WindowTooSmall(self.window_min).into());
        }
        if self.window_max < self.window_min {
            return Err(ConfigError::Invalid(format!(
                "window_max ({}) is below window_min ({})",
                self.window_max, self.window_min
            )));
        }
        if !(self.std_min.is_finite() && self.std_min > 0.0) {
            return Err(ParamError::InvalidNumStd(self.std_min).into());
        }
        if !self.std_max.is_finite() || !self.step.is_finite() {
            return Err(ConfigError::Invalid("std_max and step must be finite".into()));
        }
        self.check_grid()?;
        Ok(())
    }
}

/// One named configuration in a strategy comparison.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompareEntry {
    pub name: String,
    pub window: usize,
    pub num_std: f64,
}

impl CompareEntry {
    pub fn new(name: impl Into<String>, window: usize, num_std: f64) -> Self {
        Self {
            name: name.into(),
            window,
            num_std,
        }
    }

    pub fn params(&self) -> Result<StrategyParams, ParamError> {
        StrategyParams::new(self.window, self.num_std)
    }
}

fn default_compare() -> Vec<CompareEntry> {
    vec![
        CompareEntry::new("Default (20, 2.0)", 20, 2.0),
        CompareEntry::new("Narrow Bands (20, 1.5)", 20, 1.5),
        CompareEntry::new("Wide Bands (20, 2.5)", 20, 2.5),
        CompareEntry::new("Short Window (10, 2.0)", 10, 2.0),
        CompareEntry::new("Long Window (50, 2.0)", 50, 2.0),
    ]
}

// Default value helpers
fn default_true() -> bool { true }
fn default_10() -> usize { 10 }
fn default_30() -> usize { 30 }
fn default_252() -> u32 { 252 }
fn default_0_02() -> f64 { 0.02 }
fn default_0_1() -> f64 { 0.1 }
fn default_1_5() -> f64 { 1.5 }
fn default_2_5() -> f64 { 2.5 }
fn default_10000() -> f64 { 10000.0 }

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config merge error: {0}")]
    Merge(#[from] toml::ser::Error),
    #[error("no config files provided")]
    NoFiles,
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[strategy]
window = 15
num_std = 2.5

[backtest]
initial_capital = 5000.0

[optimizer]
window_min = 5
window_max = 8
parallel = false

[[compare]]
name = "Tight"
window = 10
num_std = 1.0
"#;

        let config = BacktestConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.strategy.window, 15);
        assert_relative_eq!(config.strategy.num_std, 2.5);
        assert_relative_eq!(config.backtest.initial_capital, 5000.0);
        assert_eq!(config.backtest.trading_days, 252);
        assert_eq!(config.optimizer.window_range(), 5..=8);
        assert!(!config.optimizer.parallel);
        assert_eq!(config.compare, vec![CompareEntry::new("Tight", 10, 1.0)]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BacktestConfig::from_toml_str("").unwrap();
        assert_eq!(config.strategy, StrategyParams::default());
        assert_eq!(config.compare.len(), 5);
        assert_eq!(config.compare[0].name, "Default (20, 2.0)");
        assert_eq!(config.optimizer.cell_count(), 21 * 11);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            BacktestConfig::from_toml_str("[strategy]\nwindow = 1\n"),
            Err(ConfigError::Params(ParamError::WindowTooSmall(1)))
        ));
        assert!(matches!(
            BacktestConfig::from_toml_str("[optimizer]\nwindow_min = 30\nwindow_max = 10\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BacktestConfig::from_toml_str("[backtest]\ninitial_capital = 0.0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_num_std_values_hits_upper_bound() {
        let config = OptimizerConfig::default();
        let values = config.num_std_values();
        assert_eq!(values.len(), 11);
        assert_relative_eq!(values[0], 1.5);
        assert_relative_eq!(values[10], 2.5, epsilon = 1e-12);

        let odd = OptimizerConfig {
            std_min: 0.1,
            std_max: 0.3,
            step: 0.1,
            ..OptimizerConfig::default()
        };
        assert_eq!(odd.num_std_values().len(), 3);

        let ragged = OptimizerConfig {
            std_max: 2.56,
            ..OptimizerConfig::default()
        };
        let values = ragged.num_std_values();
        assert!(*values.last().unwrap() <= 2.56);
        assert_eq!(values.len(), 11);
    }

    #[test]
    fn test_num_std_values_degenerate_step() {
        let config = OptimizerConfig {
            step: 0.0,
            ..OptimizerConfig::default()
        };
        assert_eq!(config.num_std_values(), vec![1.5]);

        let inverted = OptimizerConfig {
            std_min: 2.0,
            std_max: 1.0,
            ..OptimizerConfig::default()
        };
        assert_eq!(inverted.num_std_values(), vec![2.0]);
    }

    #[test]
    fn test_tiny_step_is_rejected_not_expanded() {
        let config = OptimizerConfig {
            window_min: 10,
            window_max: 11,
            std_min: 1.5,
            std_max: 2.5,
            step: 1e-300,
            parallel: true,
        };
        assert_eq!(config.cell_count(), 2 * (MAX_GRID_CELLS + 1));
        assert!(matches!(config.check_grid(), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let toml = "[optimizer]\nstep = 1e-300\n";
        assert!(matches!(
            BacktestConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_check_grid_counts_cells() {
        assert_eq!(OptimizerConfig::default().check_grid().unwrap(), 21 * 11);

        let wide = OptimizerConfig {
            window_min: 2,
            window_max: usize::MAX,
            ..OptimizerConfig::default()
        };
        assert_eq!(wide.cell_count(), usize::MAX);
        assert!(wide.check_grid().is_err());
    }

    #[test]
    fn test_merge_files() {
        let mut base = tempfile::NamedTempFile::new().unwrap();
        writeln!(base, "[strategy]\nwindow = 10\nnum_std = 1.5\n").unwrap();
        let mut overlay = tempfile::NamedTempFile::new().unwrap();
        writeln!(overlay, "[strategy]\nnum_std = 3.0\n").unwrap();

        let config =
            BacktestConfig::from_toml_files(&[base.path(), overlay.path()]).unwrap();
        assert_eq!(config.strategy.window, 10);
        assert_relative_eq!(config.strategy.num_std, 3.0);

        assert!(matches!(
            BacktestConfig::from_toml_files(&[]),
            Err(ConfigError::NoFiles)
        ));
    }
}
