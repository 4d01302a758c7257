//! A live, cancelable feed from the event bus.

use crate::{
    events::{BusFeed, EventError, SubscriptionEvent, decode::EventDecoder},
    interest::FilterKind,
};
use alloy::primitives::U64;
use tokio_util::sync::CancellationToken;

/// A live feed of decoded events, opened by
/// [`EventSystem`](crate::events::EventSystem).
///
/// Events and terminal errors share one stream: [`Self::next`] yields
/// decoded events, then at most one terminal error, then `None`. Cancelling
/// stops the bus query and ends the stream. Dropping a subscription cancels
/// it.
#[derive(Debug)]
pub struct Subscription {
    id: U64,
    kind: FilterKind,
    decoder: EventDecoder,
    feed: BusFeed,
    token: CancellationToken,
    finished: bool,
}

impl Subscription {
    pub(crate) const fn new(
        id: U64,
        kind: FilterKind,
        decoder: EventDecoder,
        feed: BusFeed,
        token: CancellationToken,
    ) -> Self {
        Self { id, kind, decoder, feed, token, finished: false }
    }

    /// The subscription id.
    pub const fn id(&self) -> U64 {
        self.id
    }

    /// The kind of items this subscription produces.
    pub const fn kind(&self) -> FilterKind {
        self.kind
    }

    /// A cloneable handle that can cancel this subscription.
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle { id: self.id, kind: self.kind, token: self.token.clone() }
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.token.cancel();
        self.feed.close();
    }

    /// Wait for the next event.
    ///
    /// Decode failures are returned as errors but do not end the stream;
    /// callers decide whether they are fatal. Bus errors and an unexpected
    /// end of the feed are terminal. Returns `None` once cancelled.
    pub async fn next(&mut self) -> Option<Result<SubscriptionEvent, EventError>> {
        if self.finished {
            return None;
        }

        let received = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            received = self.feed.recv() => received,
        };

        match received {
            Some(Ok(event)) => Some(self.decoder.decode(event).map_err(EventError::from)),
            Some(Err(err)) => {
                self.finish();
                Some(Err(EventError::Bus(err)))
            }
            None => {
                let cancelled = self.token.is_cancelled();
                self.finish();
                (!cancelled).then_some(Err(EventError::Closed))
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Handle to a [`Subscription`] owned by a listening task.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: U64,
    kind: FilterKind,
    token: CancellationToken,
}

impl SubscriptionHandle {
    /// The subscription id.
    pub const fn id(&self) -> U64 {
        self.id
    }

    /// The kind of items the subscription produces.
    pub const fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
