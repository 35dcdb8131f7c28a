pub mod annotate;
pub mod config;
pub mod detector;
pub mod indicators;
pub mod registry;

pub use annotate::{annotate, write_json_lines, Annotation};
pub use config::{DetectionConfig, DetectionMethod, StrategyConfig, StrategyFileConfig};
pub use detector::{StreamingDetector, SweepDetector};
pub use registry::{StrategyEvent, StrategyRegistry, SweepStrategy};

use common::{Bar, TradeEvent};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The symbol this strategy watches (e.g. "BTCUSD").
    fn symbol(&self) -> &str;

    /// Position size used when its entries are simulated.
    fn quantity(&self) -> f64;

    /// Evaluate the newest bar of `history` (oldest first).
    ///
    /// Called exactly once per appended bar, so implementations may keep
    /// incremental state between calls.
    fn evaluate(&mut self, history: &[Bar]) -> Vec<TradeEvent>;
}
