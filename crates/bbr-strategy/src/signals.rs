use serde::Serialize;

use bbr_core::Signal;

use crate::bands::BandFrame;

/// A band frame annotated with the signal it produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalBar {
    pub timestamp: i64,
    pub close: f64,
    pub middle_band: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub signal: Signal,
}

impl SignalBar {
    fn new(frame: &BandFrame, signal: Signal) -> Self {
        Self {
            timestamp: frame.timestamp,
            close: frame.close,
            middle_band: frame.middle_band,
            upper_band: frame.upper_band,
            lower_band: frame.lower_band,
            signal,
        }
    }
}

/// Turn band frames into re-entry signals.
///
/// A bar is `Buy` when the previous close sat below the lower band and this
/// one does not, `Sell` when the previous close sat above the upper band and
/// this one does not. The first frame has no predecessor and is always `None`.
pub fn generate_signals(frames: &[BandFrame]) -> Vec<SignalBar> {
    let mut was_below_lower = false;
    let mut was_above_upper = false;

    frames
        .iter()
        .map(|frame| {
            let below_lower = frame.below_lower();
            let above_upper = frame.above_upper();
            let signal = classify(was_below_lower, below_lower, was_above_upper, above_upper);
            was_below_lower = below_lower;
            was_above_upper = above_upper;
            SignalBar::new(frame, signal)
        })
        .collect()
}

#[inline]
fn classify(was_below_lower: bool, below_lower: bool, was_above_upper: bool, above_upper: bool) -> Signal {
    if was_below_lower && !below_lower {
        Signal::Buy
    } else if was_above_upper && !above_upper {
        Signal::Sell
    } else {
        Signal::None
    }
}

/// The bars that carry a buy or sell, in order.
pub fn signal_events(bars: &[SignalBar]) -> Vec<SignalBar> {
    bars.iter().filter(|b| b.signal.is_event()).copied().collect()
}
