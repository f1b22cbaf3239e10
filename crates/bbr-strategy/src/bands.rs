use serde::Serialize;

use bbr_core::{PriceSeries, StrategyParams};

/// A bar with a full trailing window behind it, so its bands are defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandFrame {
    pub timestamp: i64,
    pub close: f64,
    pub middle_band: f64,
    pub std_dev: f64,
    pub upper_band: f64,
    pub lower_band: f64,
}

impl BandFrame {
    #[inline]
    pub fn below_lower(&self) -> bool {
        self.close < self.lower_band
    }

    #[inline]
    pub fn above_upper(&self) -> bool {
        self.close > self.upper_band
    }
}

/// Rolling mean ± `num_std` sample standard deviations over `window` closes.
///
/// The first `window - 1` bars have no complete window and are left out, so
/// the output has `len - (window - 1)` frames, or none when the series is
/// shorter than the window.
pub fn compute_bands(prices: &PriceSeries, params: &StrategyParams) -> Vec<BandFrame> {
    let window = params.window;
    if window < 2 || prices.len() < window {
        return Vec::new();
    }

    prices
        .close
        .windows(window)
        .enumerate()
        .map(|(i, closes)| {
            let idx = i + window - 1;
            let middle_band = mean(closes);
            let std_dev = sample_std_dev(closes, middle_band);
            BandFrame {
                timestamp: prices.timestamps[idx],
                close: prices.close[idx],
                middle_band,
                std_dev,
                upper_band: middle_band + params.num_std * std_dev,
                lower_band: middle_band - params.num_std * std_dev,
            }
        })
        .collect()
}

/// Arithmetic mean, accumulated relative to the first value so a flat window
/// comes out exactly flat.
pub fn mean(values: &[f64]) -> f64 {
    let Some(&shift) = values.first() else {
        return 0.0;
    };
    shift + values.iter().map(|v| v - shift).sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Zero below two values.
pub fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}
