pub mod band_reversion;
pub mod bands;
pub mod signals;
pub mod traits;

pub use band_reversion::BandReversion;
pub use bands::{compute_bands, BandFrame};
pub use signals::{generate_signals, signal_events, SignalBar};
pub use traits::{Strategy, StrategyId};
