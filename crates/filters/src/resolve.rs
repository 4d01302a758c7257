//! Block tag tracking and [`BlockNumberOrTag`] resolution.
//!
//! The bridge sits on a final-on-commit chain, so [`BlockTags`] only tracks
//! the latest committed height. The embedding node updates it as blocks are
//! committed.

use alloy::eips::BlockNumberOrTag;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Externally-updated block height tracker.
///
/// # Example
///
/// ```
/// use bridge_filters::BlockTags;
///
/// let tags = BlockTags::new(100);
/// assert_eq!(tags.latest(), 100);
///
/// tags.set_latest(101);
/// assert_eq!(tags.latest(), 101);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockTags {
    latest: Arc<AtomicU64>,
}

impl BlockTags {
    /// Create new block tags at the given height.
    pub fn new(latest: u64) -> Self {
        Self { latest: Arc::new(AtomicU64::new(latest)) }
    }

    /// Get the latest block number.
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Set the latest block number.
    pub fn set_latest(&self, n: u64) {
        self.latest.store(n, Ordering::Release);
    }
}

/// Resolve a [`BlockNumberOrTag`] to a block number.
///
/// - `Latest` / `Pending` / `Safe` / `Finalized` → `tags.latest()`
/// - `Earliest` → `0`
/// - `Number(n)` → `n`
pub(crate) fn resolve_block_number_or_tag(tag: BlockNumberOrTag, tags: &BlockTags) -> u64 {
    match tag {
        BlockNumberOrTag::Latest
        | BlockNumberOrTag::Pending
        | BlockNumberOrTag::Safe
        | BlockNumberOrTag::Finalized => tags.latest(),
        BlockNumberOrTag::Earliest => 0,
        BlockNumberOrTag::Number(n) => n,
    }
}
