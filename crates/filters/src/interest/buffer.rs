//! Items accumulated by a polled filter.

use crate::interest::FilterKind;
use alloy::{primitives::B256, rpc::types::Log};
use serde::Serialize;

/// Items accumulated by a filter since its last poll.
///
/// Pending-transaction and block filters accumulate hashes, log filters
/// accumulate logs. Serializes as a plain JSON array either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterChanges {
    /// Transaction or block hashes.
    Hashes(Vec<B256>),
    /// Log entries.
    Logs(Vec<Log>),
}

impl FilterChanges {
    /// An empty buffer of the right shape for `kind`.
    pub(crate) const fn empty(kind: FilterKind) -> Self {
        if kind.is_logs() { Self::Logs(Vec::new()) } else { Self::Hashes(Vec::new()) }
    }

    /// True if no items have accumulated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accumulated items.
    pub fn len(&self) -> usize {
        match self {
            Self::Hashes(hashes) => hashes.len(),
            Self::Logs(logs) => logs.len(),
        }
    }

    /// Take the accumulated items, leaving an empty buffer of the same shape.
    pub(crate) fn take(&mut self) -> Self {
        match self {
            Self::Hashes(hashes) => Self::Hashes(std::mem::take(hashes)),
            Self::Logs(logs) => Self::Logs(std::mem::take(logs)),
        }
    }

    /// Append a hash. Ignored by log buffers.
    pub(crate) fn push_hash(&mut self, hash: B256) {
        if let Self::Hashes(hashes) = self {
            hashes.push(hash);
        }
    }

    /// Append logs. Ignored by hash buffers.
    pub(crate) fn extend_logs(&mut self, new: impl IntoIterator<Item = Log>) {
        if let Self::Logs(logs) = self {
            logs.extend(new);
        }
    }

    /// The accumulated hashes, if this is a hash buffer.
    pub fn as_hashes(&self) -> Option<&[B256]> {
        match self {
            Self::Hashes(hashes) => Some(hashes),
            Self::Logs(_) => None,
        }
    }

    /// The accumulated logs, if this is a log buffer.
    pub fn as_logs(&self) -> Option<&[Log]> {
        match self {
            Self::Logs(logs) => Some(logs),
            Self::Hashes(_) => None,
        }
    }
}
