#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Settings shared by every process that hosts peer streams or dispatches commands.
///
/// It is typically deserialized from the gateway configuration file and passed to
/// the [`StreamingService`](crate::service::StreamingService) on creation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct CoreConfig {
    /// Timeout applied when a caller does not supply one, in milliseconds.
    pub default_timeout_ms: u64,
    /// The buffer capacity of each peer's outbound command queue.
    pub peer_channel_buffer: usize,
    /// Pending completions still present this long after their deadline are swept
    /// as leaked, in seconds.
    pub stale_pending_secs: u64,
}

impl CoreConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// The grace period after a command's deadline before the janitor sweeps it.
    pub fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_secs)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            peer_channel_buffer: 64,
            stale_pending_secs: 300,
        }
    }
}
