//! Filter and subscription management for log, block, and transaction
//! notifications.

mod buffer;
pub use buffer::FilterChanges;

mod criteria;
pub use criteria::{Criteria, CriteriaError, matches};

mod filters;
pub(crate) use filters::FilterManager;

mod subs;
pub(crate) use subs::{PushSubscription, SubscriptionManager};
pub use subs::{PushItem, SubscriptionSink};

/// The kinds of filter that can be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Hashes of transactions as they are published.
    PendingTransactions,
    /// Hashes of committed blocks.
    Blocks,
    /// Logs matching a [`Criteria`].
    Logs,
    /// Logs matching a [`Criteria`] whose range ends at `pending`.
    MinedAndPendingLogs,
}

impl FilterKind {
    /// True for the log-producing kinds.
    pub const fn is_logs(&self) -> bool {
        matches!(self, Self::Logs | Self::MinedAndPendingLogs)
    }
}

impl core::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::PendingTransactions => "PendingTransactionsSubscription",
            Self::Blocks => "BlocksSubscription",
            Self::Logs => "LogsSubscription",
            Self::MinedAndPendingLogs => "MinedAndPendingLogsSubscription",
        })
    }
}
