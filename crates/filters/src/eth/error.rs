//! Error types for the filter API.

use crate::{backend::BackendError, events::EventError, interest::FilterKind};
use alloy::primitives::{B256, U64};

/// Errors from the filter API.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The method's rate limit was exceeded. Nothing was changed.
    #[error("server is too busy")]
    ServerBusy,
    /// The event bus refused the subscription. No filter was installed.
    #[error(transparent)]
    SubscriptionFailed(#[from] EventError),
    /// No filter with this id is installed.
    #[error("filter {0} not found")]
    FilterNotFound(U64),
    /// The filter does not produce logs.
    #[error("filter {id} doesn't have a {expected} type", expected = FilterKind::Logs)]
    FilterTypeMismatch {
        /// The filter id.
        id: U64,
        /// The filter's actual kind.
        kind: FilterKind,
    },
    /// `fromBlock` is above `toBlock`.
    #[error("fromBlock ({from}) must not exceed toBlock ({to})")]
    InvalidBlockRange {
        /// Resolved first block.
        from: u64,
        /// Resolved last block.
        to: u64,
    },
    /// The block range is wider than allowed.
    #[error("query exceeds max block range ({max})")]
    BlockRangeTooLarge {
        /// The configured limit.
        max: u64,
    },
    /// The query matched more logs than allowed.
    #[error("query exceeds max results ({max})")]
    TooManyLogs {
        /// The configured limit.
        max: usize,
    },
    /// The requested block is unknown.
    #[error("block not found: {0}")]
    BlockNotFound(B256),
    /// Chain reader error.
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
    /// The transport cannot deliver notifications.
    #[error("notifications not supported")]
    NotificationsUnsupported,
}

impl FilterError {
    /// Convert the error to a string for JSON-RPC responses.
    pub fn into_string(self) -> String {
        self.to_string()
    }
}
