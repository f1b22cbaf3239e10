use std::fmt;

use serde::{Serialize, Serializer};

/// Discrete trade trigger emitted per bar.
///
/// Serializes as the integer code used in exported trade logs:
/// `1` buy, `-1` sell, `0` none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    Buy,
    Sell,
    #[default]
    None,
}

impl Signal {
    #[inline]
    pub fn code(self) -> i8 {
        match self {
            Signal::Buy => 1,
            Signal::Sell => -1,
            Signal::None => 0,
        }
    }

    /// Whether this bar carries a trade trigger.
    #[inline]
    pub fn is_event(self) -> bool {
        self != Signal::None
    }
}

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

/// Per-bar label describing what the position did on that bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PositionStatus {
    #[serde(rename = "BUY & HOLD")]
    BuyAndHold,
    #[serde(rename = "HOLDING")]
    Holding,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "OUT OF MARKET")]
    OutOfMarket,
}

impl PositionStatus {
    pub fn label(self) -> &'static str {
        match self {
            PositionStatus::BuyAndHold => "BUY & HOLD",
            PositionStatus::Holding => "HOLDING",
            PositionStatus::Sell => "SELL",
            PositionStatus::OutOfMarket => "OUT OF MARKET",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_codes() {
        assert_eq!(Signal::Buy.code(), 1);
        assert_eq!(Signal::Sell.code(), -1);
        assert_eq!(Signal::None.code(), 0);
        assert!(Signal::Buy.is_event());
        assert!(!Signal::default().is_event());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(PositionStatus::BuyAndHold.to_string(), "BUY & HOLD");
        assert_eq!(PositionStatus::OutOfMarket.label(), "OUT OF MARKET");
    }
}
