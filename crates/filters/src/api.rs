//! Filter and subscription operations.

use crate::{
    FilterCtx, FilterError,
    backend::ChainReader,
    events::{EventBus, EventError},
    interest::{Criteria, FilterChanges, PushSubscription, SubscriptionSink},
    limiter::{GET_FILTER_CHANGES, GET_LOGS, NEW_BLOCK_FILTER, NEW_FILTER, NEW_PENDING_TX_FILTER},
    logs::LogFilter,
};
use ajj::HandlerCtx;
use alloy::{primitives::U64, rpc::types::Log};
use std::future::Future;
use tokio::sync::oneshot;

/// The feed a push subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushKind {
    /// Committed block headers.
    NewHeads,
    /// Transaction hashes.
    NewPendingTransactions,
    /// Logs matching the criteria.
    Logs(Box<Criteria>),
}

impl<C: ChainReader, B: EventBus> FilterCtx<C, B> {
    /// Take a token from the method's rate limit.
    fn gate(&self, method: &str) -> Result<(), FilterError> {
        if self.limits().allow(method) { Ok(()) } else { Err(FilterError::ServerBusy) }
    }

    /// Install a filter accumulating the hashes of published transactions.
    pub async fn new_pending_transaction_filter(&self) -> Result<U64, FilterError> {
        self.gate(NEW_PENDING_TX_FILTER)?;
        let sub = self.events().subscribe_pending_transactions().await?;
        Ok(self.filters().install(sub, Criteria::default()))
    }

    /// Install a filter accumulating the hashes of committed blocks.
    pub async fn new_block_filter(&self) -> Result<U64, FilterError> {
        self.gate(NEW_BLOCK_FILTER)?;
        let sub = self.events().subscribe_new_heads().await?;
        Ok(self.filters().install(sub, Criteria::default()))
    }

    /// Install a filter accumulating logs that match `criteria`.
    pub async fn new_filter(&self, criteria: Criteria) -> Result<U64, FilterError> {
        self.gate(NEW_FILTER)?;
        let sub = self.events().subscribe_logs(criteria.clone()).await?;
        Ok(self.filters().install(sub, criteria))
    }

    /// Query committed logs matching `criteria`. Installs nothing.
    pub async fn get_logs(&self, criteria: &Criteria) -> Result<Vec<Log>, FilterError> {
        self.gate(GET_LOGS)?;
        self.query_logs(criteria).await
    }

    async fn query_logs(&self, criteria: &Criteria) -> Result<Vec<Log>, FilterError> {
        let config = self.config();
        LogFilter::new(criteria, self.tags(), config.max_blocks_per_filter)?
            .logs(self.chain(), criteria, config.max_logs_per_response)
            .await
    }

    /// Remove a filter and cancel its subscription. Returns `true` if the
    /// filter existed.
    pub fn uninstall_filter(&self, id: U64) -> bool {
        self.filters().uninstall(id)
    }

    /// Re-run a log filter's criteria against committed history.
    ///
    /// Returns every historical match, independent of what the filter has
    /// accumulated.
    pub async fn get_filter_logs(&self, id: U64) -> Result<Vec<Log>, FilterError> {
        let (kind, criteria) = self.filters().get(id).ok_or(FilterError::FilterNotFound(id))?;
        if !kind.is_logs() {
            return Err(FilterError::FilterTypeMismatch { id, kind });
        }
        self.query_logs(&criteria).await
    }

    /// Drain the items a filter accumulated since it was last polled, and
    /// reset its inactivity deadline.
    pub fn get_filter_changes(&self, id: U64) -> Result<FilterChanges, FilterError> {
        self.gate(GET_FILTER_CHANGES)?;
        self.filters().poll_changes(id).ok_or(FilterError::FilterNotFound(id))
    }

    async fn open_push(&self, kind: PushKind) -> Result<PushSubscription, FilterError> {
        let events = self.events();
        let sub = match kind {
            PushKind::NewHeads => events.subscribe_new_heads().await?,
            PushKind::NewPendingTransactions => events.subscribe_pending_transactions().await?,
            PushKind::Logs(criteria) => events.subscribe_logs(*criteria).await?,
        };
        Ok(self.subs().register(sub))
    }

    /// Open a push subscription delivering to an ajj client. The task ends
    /// when the client disconnects.
    ///
    /// Runtime failures are reported on the returned channel.
    pub async fn subscribe(
        &self,
        hctx: &HandlerCtx,
        kind: PushKind,
    ) -> Result<(U64, oneshot::Receiver<EventError>), FilterError> {
        if !hctx.notifications_enabled() {
            return Err(FilterError::NotificationsUnsupported);
        }
        let push = self.open_push(kind).await?;
        let id = push.id();
        Ok((id, push.spawn(hctx)))
    }

    /// Open a push subscription delivering to `sink` until `closed`
    /// resolves.
    ///
    /// Runtime failures are reported on the returned channel.
    pub async fn subscribe_with<S, F>(
        &self,
        kind: PushKind,
        sink: S,
        closed: F,
    ) -> Result<(U64, oneshot::Receiver<EventError>), FilterError>
    where
        S: SubscriptionSink,
        F: Future<Output = ()> + Send + 'static,
    {
        let push = self.open_push(kind).await?;
        let id = push.id();
        Ok((id, push.spawn_with(sink, closed)))
    }

    /// Cancel a push subscription. Returns `true` if it was live.
    pub fn unsubscribe(&self, id: U64) -> bool {
        self.subs().unsubscribe(id)
    }
}
