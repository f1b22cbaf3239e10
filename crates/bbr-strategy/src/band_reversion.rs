use bbr_core::{PriceSeries, StrategyParams};

use crate::bands::{compute_bands, BandFrame};
use crate::signals::{generate_signals, SignalBar};
use crate::traits::{Strategy, StrategyId};

/// Mean reversion on rolling-statistics bands.
///
/// Buys when price climbs back above the lower band and exits when price
/// falls back below the upper band. Long-only; position handling lives in
/// the engine.
#[derive(Debug, Clone, Copy)]
pub struct BandReversion {
    params: StrategyParams,
}

impl BandReversion {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn bands(&self, prices: &PriceSeries) -> Vec<BandFrame> {
        compute_bands(prices, &self.params)
    }
}

impl Default for BandReversion {
    fn default() -> Self {
        Self::new(StrategyParams::default())
    }
}

impl Strategy for BandReversion {
    fn evaluate(&self, prices: &PriceSeries) -> Vec<SignalBar> {
        generate_signals(&self.bands(prices))
    }

    fn id(&self) -> StrategyId {
        "band_reversion"
    }

    fn params(&self) -> StrategyParams {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbr_core::Signal;

    #[test]
    fn test_evaluate_reference_series() {
        let prices = PriceSeries::from_closes(&[
            100.0, 102.0, 104.0, 95.0, 90.0, 96.0, 110.0, 108.0, 95.0, 100.0,
        ]);
        let strategy = BandReversion::new(StrategyParams::new(3, 1.0).unwrap());

        let signals: Vec<Signal> = strategy.evaluate(&prices).iter().map(|b| b.signal).collect();
        assert_eq!(
            signals,
            vec![
                Signal::None,
                Signal::None,
                Signal::Buy,
                Signal::None,
                Signal::None,
                Signal::Sell,
                Signal::None,
                Signal::Buy,
            ]
        );
    }

    #[test]
    fn test_constant_series_never_signals() {
        let prices = PriceSeries::from_closes(&[50.0; 40]);
        let bars = BandReversion::default().evaluate(&prices);
        assert_eq!(bars.len(), 21);
        assert!(bars.iter().all(|b| b.signal == Signal::None));
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let prices = PriceSeries::from_closes(&[1.0, 2.0]);
        assert!(BandReversion::default().evaluate(&prices).is_empty());
        assert_eq!(BandReversion::default().id(), "band_reversion");
    }
}
