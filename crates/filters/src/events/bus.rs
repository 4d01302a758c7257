//! The consensus event bus primitive and an in-process implementation.

use alloy::{consensus::Header, primitives::Bytes};
use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Attribute key carrying the event type.
pub const EVENT_TYPE_KEY: &str = "tm.event";

/// Attribute key carrying the module that handled a transaction.
pub const MODULE_KEY: &str = "message.module";

/// Module name of EVM transactions.
pub const EVM_MODULE: &str = "evm";

/// Stream of events for one bus subscription. The bus closes the channel
/// when the subscription is cancelled or the bus shuts down.
pub type BusFeed = mpsc::Receiver<Result<BusEvent, BusError>>;

/// Errors reported by the event bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus is not running.
    #[error("event bus unavailable")]
    Unavailable,
    /// The bus rejected the query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// The subscriber fell behind and the bus dropped events. The feed is
    /// incomplete and ends after this error.
    #[error("subscriber lagged, {0} events dropped")]
    Lagged(u64),
}

/// Kinds of events published by the consensus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A block was committed.
    NewBlockHeader,
    /// A transaction was executed.
    Tx,
}

impl EventType {
    /// The attribute value identifying this event type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewBlockHeader => "NewBlockHeader",
            Self::Tx => "Tx",
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed transaction as published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Height of the block including the transaction.
    pub height: u64,
    /// Index of the transaction within the block.
    pub index: u64,
    /// Raw transaction bytes.
    pub tx: Bytes,
    /// Execution result data.
    pub data: Bytes,
}

/// Payload of a bus event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// A committed block header.
    NewBlockHeader(Box<Header>),
    /// An executed transaction.
    Tx(TxResult),
}

impl EventData {
    /// The event type of this payload.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::NewBlockHeader(_) => EventType::NewBlockHeader,
            Self::Tx(_) => EventType::Tx,
        }
    }
}

/// An event published on the bus: a payload plus the attributes queries
/// match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Event payload.
    pub data: EventData,
    /// Event attributes. Keys may carry several values.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl BusEvent {
    /// Create an event, tagging it with its event type.
    pub fn new(data: EventData) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(EVENT_TYPE_KEY.to_owned(), vec![data.event_type().to_string()]);
        Self { data, attributes }
    }

    /// A committed block header event.
    pub fn new_block_header(header: Header) -> Self {
        Self::new(EventData::NewBlockHeader(Box::new(header)))
    }

    /// A transaction event. `module` is the module that handled it.
    pub fn tx(result: TxResult, module: &str) -> Self {
        Self::new(EventData::Tx(result)).with_attribute(MODULE_KEY, module)
    }

    /// Add an attribute value.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.entry(key.into()).or_default().push(value.into());
        self
    }
}

/// A conjunction of equality conditions over event attributes, rooted at an
/// event type.
///
/// Renders in the consensus node's query syntax:
///
/// ```
/// use bridge_filters::events::{EventQuery, EventType};
///
/// let query = EventQuery::new(EventType::Tx).and("message.module", "evm");
/// assert_eq!(query.to_string(), "tm.event = 'Tx' AND message.module = 'evm'");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    event: EventType,
    conditions: Vec<(String, String)>,
}

impl EventQuery {
    /// Match every event of the given type.
    pub const fn new(event: EventType) -> Self {
        Self { event, conditions: Vec::new() }
    }

    /// Additionally require `key = value`.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    /// The event type this query selects.
    pub const fn event_type(&self) -> EventType {
        self.event
    }

    /// Check that every condition is well formed.
    pub fn validate(&self) -> Result<(), BusError> {
        for (key, value) in &self.conditions {
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(BusError::InvalidQuery(format!("bad attribute key {key:?}")));
            }
            if value.contains('\'') {
                return Err(BusError::InvalidQuery(format!("bad attribute value {value:?}")));
            }
        }
        Ok(())
    }

    /// True if the event satisfies the query.
    pub fn matches(&self, event: &BusEvent) -> bool {
        event.data.event_type() == self.event
            && self.conditions.iter().all(|(key, value)| {
                event.attributes.get(key).is_some_and(|values| values.iter().any(|v| v == value))
            })
    }
}

impl core::fmt::Display for EventQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{EVENT_TYPE_KEY} = '{}'", self.event)?;
        for (key, value) in &self.conditions {
            write!(f, " AND {key} = '{value}'")?;
        }
        Ok(())
    }
}

/// The consensus event bus: a subscribe-by-query primitive.
///
/// Each call opens an independent feed. Implementations stop delivering and
/// close the feed once `cancel` fires.
pub trait EventBus: Send + Sync + 'static {
    /// Subscribe to events matching `query` on behalf of `subscriber`.
    fn subscribe(
        &self,
        subscriber: &str,
        query: &EventQuery,
        capacity: usize,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<BusFeed, BusError>> + Send;
}

/// An in-process [`EventBus`] backed by a [`broadcast`] channel.
///
/// The embedding node calls [`LocalEventBus::publish`] as it commits blocks
/// and executes transactions. Every subscription runs a forwarding task that
/// applies its query and pushes matches into the subscription's feed.
///
/// A subscription that falls more than `capacity` events behind receives
/// [`BusError::Lagged`] and is closed. Feeds never skip events silently.
#[derive(Debug, Clone)]
pub struct LocalEventBus {
    inner: Arc<LocalEventBusInner>,
}

#[derive(Debug)]
struct LocalEventBusInner {
    sender: broadcast::Sender<BusEvent>,
    shutdown: CancellationToken,
    active: AtomicUsize,
}

impl LocalEventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(LocalEventBusInner {
                sender,
                shutdown: CancellationToken::new(),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish an event to every live subscription. Returns the number of
    /// subscriptions that received it.
    pub fn publish(&self, event: BusEvent) -> usize {
        self.inner.sender.send(event).unwrap_or_default()
    }

    /// Number of open subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Stop the bus. Open feeds receive [`BusError::Unavailable`] and new
    /// subscriptions are refused.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// True if [`Self::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus for LocalEventBus {
    async fn subscribe(
        &self,
        subscriber: &str,
        query: &EventQuery,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Result<BusFeed, BusError> {
        if self.is_shut_down() {
            return Err(BusError::Unavailable);
        }
        query.validate()?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = ForwardTask {
            subscriber: subscriber.to_owned(),
            query: query.clone(),
            events: self.inner.sender.subscribe(),
            feed: tx,
            cancel,
            bus: Arc::clone(&self.inner),
        };
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(task.run());

        debug!(subscriber, %query, "opened bus subscription");
        Ok(rx)
    }
}

/// Forwards matching broadcast events into one subscription's feed.
#[derive(Debug)]
struct ForwardTask {
    subscriber: String,
    query: EventQuery,
    events: broadcast::Receiver<BusEvent>,
    feed: mpsc::Sender<Result<BusEvent, BusError>>,
    cancel: CancellationToken,
    bus: Arc<LocalEventBusInner>,
}

impl ForwardTask {
    async fn run(mut self) {
        loop {
            let res = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    trace!(subscriber = %self.subscriber, "bus subscription cancelled");
                    break;
                }
                _ = self.bus.shutdown.cancelled() => {
                    let _ = self.feed.send(Err(BusError::Unavailable)).await;
                    break;
                }
                res = self.events.recv() => res,
            };

            let event = match res {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(subscriber = %self.subscriber, skipped, "bus subscriber lagged");
                    self.forward(Err(BusError::Lagged(skipped))).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            };
            if self.query.matches(&event) && !self.forward(Ok(event)).await {
                break;
            }
        }

        self.bus.active.fetch_sub(1, Ordering::AcqRel);
        debug!(subscriber = %self.subscriber, query = %self.query, "closed bus subscription");
    }

    /// Push an item into the feed. A full feed applies backpressure, but
    /// cancellation must still be observed. Returns `false` if the feed is
    /// gone or the subscription was cancelled.
    async fn forward(&self, item: Result<BusEvent, BusError>) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.feed.send(item) => sent.is_ok(),
        }
    }
}
