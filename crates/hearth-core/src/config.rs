// ── Runtime session configuration ──
//
// These types describe *how* a dashboard session coordinates data.
// They carry tuning only and never touch disk. `hearth-config` builds a
// `SessionConfig` from TOML + environment and hands it in.

use std::time::Duration;

/// Default lifetime of a persisted cache record.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default quiet period before a burst of push events triggers a refetch.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Namespace applied to every key written to cache storage.
pub const DEFAULT_CACHE_PREFIX: &str = "hearth-cache:";

const DEFAULT_PUSH_CHANNEL_SIZE: usize = 256;

/// Configuration for one dashboard session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a persisted record stays loadable.
    pub cache_ttl: Duration,
    /// Prefix prepended to every storage key.
    pub cache_prefix: String,
    /// Debounce window for push-triggered refetches.
    pub debounce_delay: Duration,
    /// Whether forecast consumers also refresh at every wall-clock hour.
    pub hourly_refresh: bool,
    /// Capacity of the push event channel vended by the session.
    pub push_channel_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_prefix: DEFAULT_CACHE_PREFIX.into(),
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            hourly_refresh: true,
            push_channel_size: DEFAULT_PUSH_CHANNEL_SIZE,
        }
    }
}
