//! Per-method token-bucket gate.

use crate::RateLimitConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::{collections::HashMap, num::NonZeroU32};

/// `eth_newPendingTransactionFilter`
pub(crate) const NEW_PENDING_TX_FILTER: &str = "eth_newPendingTransactionFilter";
/// `eth_newBlockFilter`
pub(crate) const NEW_BLOCK_FILTER: &str = "eth_newBlockFilter";
/// `eth_newFilter`
pub(crate) const NEW_FILTER: &str = "eth_newFilter";
/// `eth_getLogs`
pub(crate) const GET_LOGS: &str = "eth_getLogs";
/// `eth_getFilterChanges`
pub(crate) const GET_FILTER_CHANGES: &str = "eth_getFilterChanges";

/// Token buckets keyed by method name.
///
/// Methods without a bucket are never limited. Each bucket is independent
/// and safe to check concurrently.
#[derive(Debug, Default)]
pub(crate) struct MethodLimits {
    buckets: HashMap<String, DefaultDirectRateLimiter>,
}

impl MethodLimits {
    /// Build buckets from configuration. A zero rate or burst disables
    /// limiting entirely.
    pub(crate) fn new(config: &RateLimitConfig) -> Self {
        let (Some(per_second), Some(burst)) =
            (NonZeroU32::new(config.per_second), NonZeroU32::new(config.burst()))
        else {
            return Self::default();
        };

        let quota = Quota::per_second(per_second).allow_burst(burst);
        let buckets = config
            .methods
            .iter()
            .map(|method| (method.clone(), RateLimiter::direct(quota)))
            .collect();

        Self { buckets }
    }

    /// Take one token from the method's bucket. Returns `false` if the
    /// bucket is empty.
    pub(crate) fn allow(&self, method: &str) -> bool {
        self.buckets.get(method).is_none_or(|bucket| bucket.check().is_ok())
    }
}
