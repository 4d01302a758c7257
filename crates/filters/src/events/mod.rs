//! The event system: multiplexes the consensus event bus into independently
//! cancelable, typed feeds.

mod bus;
pub use bus::{
    BusError, BusEvent, BusFeed, EVENT_TYPE_KEY, EVM_MODULE, EventBus, EventData, EventQuery,
    EventType, LocalEventBus, MODULE_KEY, TxResult,
};

mod decode;
pub(crate) use decode::EventDecoder;
pub use decode::{DecodeError, SubscriptionEvent};

mod subscription;
pub use subscription::{Subscription, SubscriptionHandle};

use crate::{
    backend::TxDecoder,
    interest::{Criteria, FilterKind},
};
use alloy::primitives::U64;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors from the event system and its subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The bus refused the subscription.
    #[error("subscription failed: {0}")]
    Subscribe(BusError),
    /// The bus reported a failure on an open subscription.
    #[error("event bus: {0}")]
    Bus(BusError),
    /// The feed ended without being cancelled.
    #[error("subscription closed")]
    Closed,
    /// An event could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Owns the connection to the event bus and opens typed subscriptions on it.
///
/// Subscription ids are assigned sequentially, starting from 1. Every
/// subscription is independent; they share only the bus.
pub struct EventSystem<B> {
    bus: B,
    decoder: Arc<dyn TxDecoder>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<B> core::fmt::Debug for EventSystem<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSystem")
            .field("decoder", &self.decoder)
            .field("next_id", &self.next_id)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<B: EventBus> EventSystem<B> {
    /// Create an event system over `bus`. `capacity` bounds each
    /// subscription's event channel.
    pub fn new(bus: B, decoder: Arc<dyn TxDecoder>, capacity: usize) -> Self {
        // Start from 1, as 0 is weird in quantity encoding.
        Self { bus, decoder, next_id: AtomicU64::new(1), capacity }
    }

    /// Access the bus.
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    fn next_id(&self) -> U64 {
        U64::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn subscribe(
        &self,
        kind: FilterKind,
        query: EventQuery,
        decoder: EventDecoder,
    ) -> Result<Subscription, EventError> {
        let id = self.next_id();
        let token = CancellationToken::new();
        let subscriber = format!("filters-{id}");

        let feed = self
            .bus
            .subscribe(&subscriber, &query, self.capacity, token.clone())
            .await
            .map_err(EventError::Subscribe)?;

        debug!(%id, %kind, %query, "opened subscription");
        Ok(Subscription::new(id, kind, decoder, feed, token))
    }

    /// Subscribe to executed transactions. Each event yields the
    /// transaction hash.
    pub async fn subscribe_pending_transactions(&self) -> Result<Subscription, EventError> {
        self.subscribe(
            FilterKind::PendingTransactions,
            EventQuery::new(EventType::Tx),
            EventDecoder::PendingTransactions(Arc::clone(&self.decoder)),
        )
        .await
    }

    /// Subscribe to committed block headers.
    pub async fn subscribe_new_heads(&self) -> Result<Subscription, EventError> {
        self.subscribe(
            FilterKind::Blocks,
            EventQuery::new(EventType::NewBlockHeader),
            EventDecoder::NewHeads,
        )
        .await
    }

    /// Subscribe to logs of executed EVM transactions that match `criteria`.
    pub async fn subscribe_logs(&self, criteria: Criteria) -> Result<Subscription, EventError> {
        self.subscribe(
            criteria.filter_kind(),
            EventQuery::new(EventType::Tx).and(MODULE_KEY, EVM_MODULE),
            EventDecoder::Logs { decoder: Arc::clone(&self.decoder), criteria: Box::new(criteria) },
        )
        .await
    }
}
