//! Filter registry for `eth_newFilter` / `eth_getFilterChanges`.

use crate::{
    events::{Subscription, SubscriptionEvent, SubscriptionHandle},
    interest::{Criteria, FilterChanges, FilterKind},
};
use alloy::primitives::U64;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, trace};

type FilterId = U64;

/// An active filter.
///
/// Records the filter criteria, the items accumulated since the last poll,
/// the [`Instant`] at which the filter was last polled, and the subscription
/// feeding it.
#[derive(Debug)]
pub(crate) struct ActiveFilter {
    criteria: Criteria,
    changes: FilterChanges,
    last_poll_time: Instant,
    subscription: SubscriptionHandle,
}

impl core::fmt::Display for ActiveFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ActiveFilter {{ kind: {}, pending: {}, ms_since_last_poll: {} }}",
            self.kind(),
            self.changes.len(),
            self.last_poll_time.elapsed().as_millis(),
        )
    }
}

impl ActiveFilter {
    fn new(criteria: Criteria, subscription: SubscriptionHandle) -> Self {
        Self {
            changes: FilterChanges::empty(subscription.kind()),
            criteria,
            last_poll_time: Instant::now(),
            subscription,
        }
    }

    /// The filter kind.
    pub(crate) const fn kind(&self) -> FilterKind {
        self.subscription.kind()
    }

    /// The criteria the filter was installed with.
    pub(crate) const fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Mark the filter as polled and take its accumulated items.
    fn poll(&mut self) -> FilterChanges {
        self.last_poll_time = Instant::now();
        self.changes.take()
    }

    /// Record an item from the subscription.
    fn append(&mut self, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::TransactionHash(hash) => self.changes.push_hash(hash),
            SubscriptionEvent::Header(header) => self.changes.push_hash(header.hash),
            SubscriptionEvent::Logs(logs) => self.changes.extend_logs(logs),
        }
    }

    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_poll_time) >= ttl
    }
}

/// Inner logic for [`FilterManager`].
///
/// Every access to the filter map happens under one lock, and no lock is
/// held across an await point.
#[derive(Debug, Default)]
pub(crate) struct FilterManagerInner {
    filters: Mutex<HashMap<FilterId, ActiveFilter>>,
}

impl FilterManagerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<FilterId, ActiveFilter>> {
        self.filters.lock().expect("filter registry lock poisoned")
    }

    /// Number of installed filters.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if the filter is installed.
    pub(crate) fn contains(&self, id: FilterId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Kind and criteria of an installed filter.
    pub(crate) fn get(&self, id: FilterId) -> Option<(FilterKind, Criteria)> {
        self.lock().get(&id).map(|filter| (filter.kind(), filter.criteria().clone()))
    }

    /// Append an event to the filter. Returns `false` if the filter is gone.
    fn append(&self, id: FilterId, event: SubscriptionEvent) -> bool {
        match self.lock().get_mut(&id) {
            Some(filter) => {
                filter.append(event);
                true
            }
            None => false,
        }
    }

    /// Reset the filter's deadline and drain its accumulated items.
    pub(crate) fn poll_changes(&self, id: FilterId) -> Option<FilterChanges> {
        self.lock().get_mut(&id).map(ActiveFilter::poll)
    }

    /// Cancel the filter's subscription and remove it. Returns `true` if the
    /// filter existed.
    pub(crate) fn uninstall(&self, id: FilterId) -> bool {
        let mut filters = self.lock();
        let Some(filter) = filters.get(&id) else { return false };
        filter.subscription.cancel();
        filters.remove(&id);
        true
    }

    /// Evict filters that have not been polled within `older_than`.
    fn clean_stale(&self, older_than: Duration) {
        let now = Instant::now();
        self.lock().retain(|id, filter| {
            if !filter.is_stale(now, older_than) {
                return true;
            }
            debug!(%id, %filter, "evicting stale filter");
            filter.subscription.cancel();
            false
        });
    }
}

impl Drop for FilterManagerInner {
    fn drop(&mut self) {
        let filters = self.filters.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        filters.values().for_each(|filter| filter.subscription.cancel());
    }
}

/// Manager for filters.
///
/// The manager tracks active filters, and periodically cleans stale filters.
/// Filter IDs are the IDs of the subscriptions feeding them.
///
/// Calling [`Self::new`] spawns a task that periodically cleans stale
/// filters, so it must be called within a tokio runtime.
#[derive(Debug, Clone)]
pub(crate) struct FilterManager {
    inner: Arc<FilterManagerInner>,
}

impl FilterManager {
    /// Create a new filter manager. Spawn a task to clean stale filters.
    pub(crate) fn new(clean_interval: Duration, age_limit: Duration) -> Self {
        let inner = Arc::new(FilterManagerInner::default());
        let manager = Self { inner };
        FilterCleanTask::new(Arc::downgrade(&manager.inner), clean_interval, age_limit).spawn();
        manager
    }

    /// Register a filter fed by `sub`, and spawn the task that drains the
    /// subscription into it.
    pub(crate) fn install(&self, sub: Subscription, criteria: Criteria) -> FilterId {
        let id = sub.id();
        let filter = ActiveFilter::new(criteria, sub.handle());
        self.lock().insert(id, filter);

        FilterTask { id, sub, manager: Arc::downgrade(&self.inner) }.spawn();
        debug!(%id, "installed filter");
        id
    }
}

impl std::ops::Deref for FilterManager {
    type Target = FilterManagerInner;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

/// Task draining one subscription into its filter.
///
/// A subscription error is fatal: the filter is removed and the task exits.
#[derive(Debug)]
struct FilterTask {
    id: FilterId,
    sub: Subscription,
    manager: Weak<FilterManagerInner>,
}

impl FilterTask {
    async fn run(mut self) {
        while let Some(res) = self.sub.next().await {
            let Some(manager) = self.manager.upgrade() else { break };
            match res {
                Ok(event) => {
                    if !manager.append(self.id, event) {
                        trace!("filter gone");
                        break;
                    }
                    trace!("appended event");
                }
                Err(err) => {
                    debug!(%err, "filter subscription failed, removing filter");
                    manager.uninstall(self.id);
                    break;
                }
            }
        }
        trace!("filter task exiting");
    }

    fn spawn(self) {
        let span = debug_span!(parent: None, "FilterTask", id = %self.id);
        tokio::spawn(self.run().instrument(span));
    }
}

/// Task to clean up unpolled filters.
#[derive(Debug)]
struct FilterCleanTask {
    manager: Weak<FilterManagerInner>,
    sleep: Duration,
    age_limit: Duration,
}

impl FilterCleanTask {
    /// Create a new filter cleaner task.
    const fn new(manager: Weak<FilterManagerInner>, sleep: Duration, age_limit: Duration) -> Self {
        Self { manager, sleep, age_limit }
    }

    /// Run the task until the manager is dropped.
    fn spawn(self) {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + self.sleep, self.sleep);
            loop {
                ticks.tick().await;
                trace!("cleaning stale filters");
                match self.manager.upgrade() {
                    Some(manager) => manager.clean_stale(self.age_limit),
                    None => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        backend::RlpTxDecoder,
        events::{BusEvent, EVM_MODULE, EventSystem, LocalEventBus, TxResult},
    };
    use alloy::{consensus::Header, primitives::Bytes};

    const TTL: Duration = Duration::from_secs(5 * 60);

    fn setup() -> (EventSystem<LocalEventBus>, FilterManager) {
        let events = EventSystem::new(LocalEventBus::new(16), Arc::new(RlpTxDecoder), 16);
        (events, FilterManager::new(TTL, TTL))
    }

    /// Let spawned tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn header(number: u64) -> Header {
        Header { number, ..Default::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn block_filter_drains_in_order() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());
        settle().await;

        for n in 1..=3 {
            events.bus().publish(BusEvent::new_block_header(header(n)));
        }
        settle().await;

        let changes = filters.poll_changes(id).unwrap();
        let expected: Vec<_> = (1..=3).map(|n| header(n).hash_slow()).collect();
        assert_eq!(changes.as_hashes().unwrap(), expected.as_slice());
        assert!(filters.poll_changes(id).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polled_filters_survive() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(4 * 60)).await;
            assert!(filters.poll_changes(id).is_some());
        }
        assert_eq!(filters.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unpolled_filters_are_evicted() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());
        settle().await;
        assert_eq!(events.bus().active_subscriptions(), 1);

        // Just before the first sweep the filter is still present.
        tokio::time::sleep(TTL - Duration::from_secs(1)).await;
        assert!(filters.contains(id));

        tokio::time::sleep(TTL).await;
        assert!(filters.poll_changes(id).is_none());
        settle().await;
        assert_eq!(events.bus().active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn uninstall_cancels_subscription() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());
        settle().await;

        assert!(filters.uninstall(id));
        assert!(!filters.uninstall(id));
        settle().await;
        assert_eq!(events.bus().active_subscriptions(), 0);
        assert_eq!(events.bus().publish(BusEvent::new_block_header(header(1))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_error_removes_filter() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());
        settle().await;

        events.bus().shutdown();
        settle().await;
        assert!(!filters.contains(id));
        assert_eq!(filters.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_event_removes_filter() {
        let (events, filters) = setup();
        let id = filters.install(
            events.subscribe_logs(Criteria::default()).await.unwrap(),
            Criteria::default(),
        );
        settle().await;

        let garbage = TxResult {
            height: 1,
            index: 0,
            tx: Bytes::from_static(b"tx"),
            data: Bytes::from_static(&[0xff]),
        };
        events.bus().publish(BusEvent::tx(garbage, EVM_MODULE));
        settle().await;

        assert!(filters.poll_changes(id).is_none());
        assert_eq!(events.bus().active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_filter_is_removed() {
        let (events, filters) = setup();
        let id = filters.install(events.subscribe_new_heads().await.unwrap(), Criteria::default());

        // More than the bus buffers before the forwarding task runs.
        for n in 1..=20 {
            events.bus().publish(BusEvent::new_block_header(header(n)));
        }
        settle().await;

        assert!(!filters.contains(id));
        assert_eq!(events.bus().active_subscriptions(), 0);
    }
}
