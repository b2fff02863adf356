use std::time::Duration;

/// Default one-way delay of an endpoint.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Default delay above which an endpoint loses every packet.
pub const DEFAULT_DROP_THRESHOLD: Duration = Duration::from_millis(1_000);

/// Behavior of one direction of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Time between a send and its delivery to the peer.
    pub delay: Duration,

    /// Packets are lost when `delay` exceeds this threshold.
    ///
    /// The condition is static, so an endpoint either delivers everything or nothing.
    pub drop_threshold: Duration,
}

impl Config {
    /// Returns true if packets sent over this endpoint are lost.
    pub fn drops(&self) -> bool {
        self.delay > self.drop_threshold
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
        }
    }
}
