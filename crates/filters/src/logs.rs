//! Historical log queries: single-block and block-range filters.

use crate::{
    BlockTags, FilterError,
    backend::ChainReader,
    interest::Criteria,
    resolve::resolve_block_number_or_tag,
};
use alloy::{
    eips::BlockNumberOrTag,
    primitives::B256,
    rpc::types::{Header, Log},
};
use tracing::trace;

/// A resolved historical log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFilter {
    /// Logs of exactly one block.
    Block {
        /// The block hash.
        hash: B256,
    },
    /// Logs of committed blocks `from..=to`. Empty if `from > to`.
    Range {
        /// First block.
        from: u64,
        /// Last block.
        to: u64,
    },
}

impl LogFilter {
    /// Resolve the criteria against the current chain height.
    ///
    /// A block hash takes precedence over range bounds. Missing bounds
    /// default to the latest block. The range is clamped to the latest
    /// block, so a range entirely above it is empty. At most `max_blocks`
    /// blocks are scanned; `max_blocks == 0` disables the limit.
    pub(crate) fn new(
        criteria: &Criteria,
        tags: &BlockTags,
        max_blocks: u64,
    ) -> Result<Self, FilterError> {
        if let Some(hash) = criteria.block_hash() {
            return Ok(Self::Block { hash });
        }

        let resolve = |tag: Option<BlockNumberOrTag>| {
            tag.map(|tag| resolve_block_number_or_tag(tag, tags)).unwrap_or_else(|| tags.latest())
        };
        let from = resolve(criteria.from_block());
        let to = resolve(criteria.to_block());

        if from > to {
            return Err(FilterError::InvalidBlockRange { from, to });
        }

        // Nothing above the head is committed.
        let to = to.min(tags.latest());
        if max_blocks > 0 && from <= to && to - from >= max_blocks {
            return Err(FilterError::BlockRangeTooLarge { max: max_blocks });
        }

        Ok(Self::Range { from, to })
    }

    /// Run the query, returning matching logs in chain order.
    /// `max_logs == 0` disables the result limit.
    pub(crate) async fn logs<C: ChainReader>(
        &self,
        chain: &C,
        criteria: &Criteria,
        max_logs: usize,
    ) -> Result<Vec<Log>, FilterError> {
        let mut logs = Vec::new();

        match *self {
            Self::Block { hash } => {
                let header =
                    chain.header_by_hash(hash).await?.ok_or(FilterError::BlockNotFound(hash))?;
                collect_block_logs(chain, &header, criteria, max_logs, &mut logs).await?;
            }
            Self::Range { from, to } => {
                for number in from..=to {
                    let Some(header) = chain.header_by_number(number).await? else {
                        continue;
                    };
                    collect_block_logs(chain, &header, criteria, max_logs, &mut logs).await?;
                }
            }
        }

        trace!(filter = ?self, count = logs.len(), "log query complete");
        Ok(logs)
    }
}

/// Append the block's logs that match `criteria` to `out`.
async fn collect_block_logs<C: ChainReader>(
    chain: &C,
    header: &Header,
    criteria: &Criteria,
    max_logs: usize,
    out: &mut Vec<Log>,
) -> Result<(), FilterError> {
    if !criteria.matches_bloom(&header.inner.logs_bloom) {
        return Ok(());
    }

    let logs = chain.logs_in_block(header.hash).await?;
    out.extend(logs.into_iter().filter(|log| criteria.matches_log(&log.inner)));

    if max_logs > 0 && out.len() > max_logs {
        return Err(FilterError::TooManyLogs { max: max_logs });
    }
    Ok(())
}
