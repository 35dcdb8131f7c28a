pub mod levels;
pub mod sequencer;

pub use levels::{risk_levels, stop_loss, take_profit, trail_stop};
pub use sequencer::{RiskConfig, SignalSequencer};
