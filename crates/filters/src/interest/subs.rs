//! Subscription management for `eth_subscribe` / `eth_unsubscribe`.

use crate::events::{EventError, Subscription, SubscriptionEvent, SubscriptionHandle};
use ajj::HandlerCtx;
use alloy::{
    primitives::{B256, U64},
    rpc::types::{Header, Log},
};
use dashmap::DashMap;
use serde::Serialize;
use std::{
    future::{Future, pending},
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, debug_span, trace};

/// An item pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PushItem {
    /// A committed block header (`newHeads`).
    Header(Box<Header>),
    /// A transaction hash (`newPendingTransactions`).
    TransactionHash(B256),
    /// A matching log (`logs`).
    Log(Box<Log>),
}

impl PushItem {
    /// Split a subscription event into notifications. Logs are delivered one
    /// per notification.
    fn from_event(event: SubscriptionEvent) -> Vec<Self> {
        match event {
            SubscriptionEvent::TransactionHash(hash) => vec![Self::TransactionHash(hash)],
            SubscriptionEvent::Header(header) => vec![Self::Header(header)],
            SubscriptionEvent::Logs(logs) => {
                logs.into_iter().map(|log| Self::Log(Box::new(log))).collect()
            }
        }
    }
}

/// A live notification channel to a client.
pub trait SubscriptionSink: Send + 'static {
    /// Deliver one item for subscription `id`. Returns `false` if the client
    /// is gone.
    fn deliver(&mut self, id: U64, item: &PushItem) -> impl Future<Output = bool> + Send;
}

/// JSON-RPC subscription notification envelope.
#[derive(serde::Serialize)]
struct SubscriptionNotification<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: SubscriptionParams<'a>,
}

/// Params field of a subscription notification.
#[derive(serde::Serialize)]
struct SubscriptionParams<'a> {
    result: &'a PushItem,
    subscription: U64,
}

/// A transport that delivers JSON-RPC notifications.
trait Notify: Send + Sync {
    /// Send one notification. Returns `false` if the transport is closed.
    fn notify_json(
        &self,
        notification: &SubscriptionNotification<'_>,
    ) -> impl Future<Output = bool> + Send;
}

impl Notify for HandlerCtx {
    async fn notify_json(&self, notification: &SubscriptionNotification<'_>) -> bool {
        self.notify(notification).await.is_ok()
    }
}

/// Wrap `item` in a subscription notification and send it.
async fn send_notification<N: Notify>(channel: &N, id: U64, item: &PushItem) -> bool {
    let notification = SubscriptionNotification {
        jsonrpc: "2.0",
        method: "eth_subscription",
        params: SubscriptionParams { result: item, subscription: id },
    };
    channel.notify_json(&notification).await
}

impl SubscriptionSink for HandlerCtx {
    async fn deliver(&mut self, id: U64, item: &PushItem) -> bool {
        send_notification(self, id, item).await
    }
}

impl SubscriptionSink for mpsc::Sender<PushItem> {
    async fn deliver(&mut self, _id: U64, item: &PushItem) -> bool {
        self.send(item.clone()).await.is_ok()
    }
}

/// Tracks ongoing push subscription tasks.
///
/// Each task removes itself when it exits, so the map only ever holds live
/// subscriptions.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionManager {
    inner: Arc<SubscriptionManagerInner>,
}

impl SubscriptionManager {
    /// Instantiate a new subscription manager. `ttl` optionally bounds the
    /// lifetime of every subscription.
    pub(crate) fn new(ttl: Option<Duration>) -> Self {
        Self { inner: Arc::new(SubscriptionManagerInner { tasks: DashMap::new(), ttl }) }
    }

    /// Register a subscription. The returned task must be spawned.
    pub(crate) fn register(&self, sub: Subscription) -> PushSubscription {
        self.tasks.insert(sub.id(), sub.handle());
        debug!(id = %sub.id(), kind = %sub.kind(), "registered new subscription");
        PushSubscription { sub, ttl: self.ttl, manager: Arc::downgrade(&self.inner) }
    }
}

impl core::ops::Deref for SubscriptionManager {
    type Target = SubscriptionManagerInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Inner logic for [`SubscriptionManager`].
#[derive(Debug)]
pub(crate) struct SubscriptionManagerInner {
    tasks: DashMap<U64, SubscriptionHandle>,
    ttl: Option<Duration>,
}

impl SubscriptionManagerInner {
    /// Cancel a subscription task.
    pub(crate) fn unsubscribe(&self, id: U64) -> bool {
        if let Some((_, handle)) = self.tasks.remove(&id) {
            handle.cancel();
            true
        } else {
            false
        }
    }

    /// Number of live subscriptions.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Task relaying one subscription to a client.
///
/// The task exits when the client disconnects, the subscription is
/// cancelled, the lifetime expires, or the subscription fails. Failures are
/// reported on the error channel.
#[derive(Debug)]
pub(crate) struct PushSubscription {
    sub: Subscription,
    ttl: Option<Duration>,
    manager: Weak<SubscriptionManagerInner>,
}

impl PushSubscription {
    /// The subscription id.
    pub(crate) const fn id(&self) -> U64 {
        self.sub.id()
    }

    /// Create the task future.
    async fn task_future<S, C>(self, mut sink: S, closed: C, errors: oneshot::Sender<EventError>)
    where
        S: SubscriptionSink,
        C: Future<Output = ()> + Send,
    {
        let Self { mut sub, ttl, manager } = self;
        let id = sub.id();

        let expiry = async move {
            match ttl {
                Some(ttl) => tokio::time::sleep(ttl).await,
                None => pending().await,
            }
        };
        tokio::pin!(closed, expiry);

        // NB: biased select ensures we check disconnection and expiry before
        // processing new events.
        let failure = 'task: loop {
            let res = tokio::select! {
                biased;
                _ = &mut closed => {
                    trace!("subscription cancelled by client disconnect");
                    break 'task None;
                }
                _ = &mut expiry => {
                    trace!("subscription expired");
                    break 'task None;
                }
                res = sub.next() => res,
            };

            match res {
                None => {
                    trace!("subscription cancelled by user");
                    break 'task None;
                }
                Some(Ok(event)) => {
                    for item in PushItem::from_event(event) {
                        if !sink.deliver(id, &item).await {
                            trace!("channel to client closed");
                            break 'task None;
                        }
                    }
                }
                Some(Err(err)) => {
                    debug!(%err, "subscription failed");
                    break 'task Some(err);
                }
            }
        };

        sub.cancel();
        if let Some(manager) = manager.upgrade() {
            manager.tasks.remove(&id);
        }
        if let Some(err) = failure {
            let _ = errors.send(err);
        }
        trace!("subscription task exiting");
    }

    /// Spawn on the ajj [`HandlerCtx`]. The task ends when the client
    /// disconnects.
    pub(crate) fn spawn(self, ctx: &HandlerCtx) -> oneshot::Receiver<EventError> {
        let (tx, rx) = oneshot::channel();
        let span = debug_span!(parent: None, "PushSubscription", id = %self.id());
        ctx.spawn_graceful_with_ctx(move |ctx, ajj_cancel| {
            self.task_future(ctx, ajj_cancel, tx).instrument(span)
        });
        rx
    }

    /// Spawn on the tokio runtime, relaying to `sink` until `closed`
    /// resolves.
    pub(crate) fn spawn_with<S, C>(self, sink: S, closed: C) -> oneshot::Receiver<EventError>
    where
        S: SubscriptionSink,
        C: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let span = debug_span!(parent: None, "PushSubscription", id = %self.id());
        tokio::spawn(self.task_future(sink, closed, tx).instrument(span));
        rx
    }
}
