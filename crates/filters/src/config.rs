//! Configuration for the filter and subscription bridge.

use std::time::Duration;

/// Default inactivity window for polled filters.
const DEFAULT_FILTER_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for the filter bridge.
///
/// # Example
///
/// ```
/// use bridge_filters::FilterConfig;
/// use std::time::Duration;
///
/// let config = FilterConfig::default();
/// assert_eq!(config.stale_filter_ttl, Duration::from_secs(300));
/// assert_eq!(config.max_blocks_per_filter, 10_000);
/// assert!(!config.rate_limits.is_enabled());
/// ```
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Inactivity window after which an unpolled filter becomes eligible
    /// for eviction.
    ///
    /// Default: `5 minutes`.
    pub stale_filter_ttl: Duration,

    /// Interval between passes of the stale filter sweeper.
    ///
    /// Default: `5 minutes`.
    pub filter_sweep_interval: Duration,

    /// Maximum number of blocks scanned per `eth_getLogs` /
    /// `eth_getFilterLogs` query, counting both bounds. Ranges are clamped to
    /// the latest block first. Set to `0` to disable the limit.
    ///
    /// Default: `10_000`.
    pub max_blocks_per_filter: u64,

    /// Maximum number of logs returned per `eth_getLogs` response.
    /// Set to `0` to disable the limit.
    ///
    /// Default: `20_000`.
    pub max_logs_per_response: usize,

    /// Capacity of the per-subscription event channel between the event bus
    /// and the listening task.
    ///
    /// Default: `1024`.
    pub subscription_buffer: usize,

    /// Optional lifetime bound for push subscriptions. Expiry is treated as
    /// an explicit unsubscribe.
    ///
    /// Default: `None` (live until the client disconnects or unsubscribes).
    pub push_subscription_ttl: Option<Duration>,

    /// Per-method rate limits.
    ///
    /// Default: disabled.
    pub rate_limits: RateLimitConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            stale_filter_ttl: DEFAULT_FILTER_TTL,
            filter_sweep_interval: DEFAULT_FILTER_TTL,
            max_blocks_per_filter: 10_000,
            max_logs_per_response: 20_000,
            subscription_buffer: 1024,
            push_subscription_ttl: None,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

/// Token-bucket rate limits applied to a set of methods.
///
/// Every listed method receives its own bucket refilled at `per_second`
/// tokens per second, holding at most `burst` tokens.
///
/// # Example
///
/// ```
/// use bridge_filters::RateLimitConfig;
///
/// let limits = RateLimitConfig::new(["eth_getLogs", "eth_newFilter"], 10);
/// assert!(limits.is_enabled());
/// assert_eq!(limits.burst(), 10);
/// assert_eq!(limits.with_burst(20).burst(), 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Fully-qualified method names to limit, e.g. `eth_getLogs`.
    pub methods: Vec<String>,
    /// Tokens per second. `0` disables limiting.
    pub per_second: u32,
    /// Bucket size. Defaults to `per_second` when unset.
    pub burst: Option<u32>,
}

impl RateLimitConfig {
    /// Limit the given methods to `per_second` calls per second.
    pub fn new<I, S>(methods: I, per_second: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { methods: methods.into_iter().map(Into::into).collect(), per_second, burst: None }
    }

    /// Set the bucket size.
    pub const fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    /// True if any method is limited.
    pub fn is_enabled(&self) -> bool {
        self.per_second > 0 && !self.methods.is_empty()
    }

    /// The effective bucket size.
    pub fn burst(&self) -> u32 {
        self.burst.unwrap_or(self.per_second)
    }
}
