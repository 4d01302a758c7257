//! Shared context for the filter API.

use crate::{
    BlockTags, FilterConfig,
    backend::{ChainReader, TxDecoder},
    events::{EventBus, EventSystem},
    interest::{FilterManager, SubscriptionManager},
    limiter::MethodLimits,
};
use std::sync::Arc;

/// Filter API context.
///
/// Owns the event system, the filter registry and its stale filter sweeper,
/// the push subscription tasks, and the per-method rate limits. Cheap to
/// clone.
///
/// # Construction
///
/// ```ignore
/// let ctx = FilterCtx::new(chain, bus, Arc::new(RlpTxDecoder), tags, FilterConfig::default());
/// ```
///
/// Construction spawns the sweeper, so it must happen within a tokio
/// runtime. The sweeper stops once every clone of the context is dropped.
pub struct FilterCtx<C, B> {
    inner: Arc<FilterCtxInner<C, B>>,
}

impl<C, B> Clone for FilterCtx<C, B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C, B> core::fmt::Debug for FilterCtx<C, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilterCtx")
            .field("tags", &self.inner.tags)
            .field("events", &self.inner.events)
            .field("filters", &self.inner.filters)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct FilterCtxInner<C, B> {
    chain: C,
    tags: BlockTags,
    events: EventSystem<B>,
    filters: FilterManager,
    subs: SubscriptionManager,
    limits: MethodLimits,
    config: FilterConfig,
}

impl<C: ChainReader, B: EventBus> FilterCtx<C, B> {
    /// Create a new filter context.
    pub fn new(
        chain: C,
        bus: B,
        decoder: Arc<dyn TxDecoder>,
        tags: BlockTags,
        config: FilterConfig,
    ) -> Self {
        let events = EventSystem::new(bus, decoder, config.subscription_buffer);
        let filters = FilterManager::new(config.filter_sweep_interval, config.stale_filter_ttl);
        let subs = SubscriptionManager::new(config.push_subscription_ttl);
        let limits = MethodLimits::new(&config.rate_limits);

        Self {
            inner: Arc::new(FilterCtxInner {
                chain,
                tags,
                events,
                filters,
                subs,
                limits,
                config,
            }),
        }
    }
}

impl<C, B> FilterCtx<C, B> {
    /// Access the chain reader.
    pub fn chain(&self) -> &C {
        &self.inner.chain
    }

    /// Access the block tags.
    pub fn tags(&self) -> &BlockTags {
        &self.inner.tags
    }

    /// Access the event system.
    pub fn events(&self) -> &EventSystem<B> {
        &self.inner.events
    }

    /// Access the configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.inner.config
    }

    /// Number of installed filters.
    pub fn filter_count(&self) -> usize {
        self.inner.filters.len()
    }

    /// Number of live push subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subs.len()
    }

    pub(crate) fn filters(&self) -> &FilterManager {
        &self.inner.filters
    }

    pub(crate) fn subs(&self) -> &SubscriptionManager {
        &self.inner.subs
    }

    pub(crate) fn limits(&self) -> &MethodLimits {
        &self.inner.limits
    }
}
