//! Log selection criteria and Ethereum log-matching semantics.

use crate::interest::FilterKind;
use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, Bloom, BloomInput, Log as PrimitiveLog},
    rpc::types::Log,
};
use serde::Deserialize;
use std::collections::HashSet;

/// Maximum number of topic positions in a log.
const MAX_TOPICS: usize = 4;

/// Error building [`Criteria`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    /// More topic positions than a log can carry.
    #[error("too many topics: {0} (max {MAX_TOPICS})")]
    TooManyTopics(usize),
}

/// Address/topic/block selection for logs.
///
/// Deserializes from the Ethereum filter object:
/// `{fromBlock, toBlock, address, topics, blockHash}`. `address` is a single
/// address or a list; each `topics` entry is a topic, a list of topics, or
/// `null`. Empty address or topic sets are wildcards.
///
/// When `blockHash` is present it takes precedence, and any range bounds are
/// ignored by historical queries.
///
/// ```
/// use bridge_filters::interest::Criteria;
///
/// let criteria: Criteria = serde_json::from_str(
///     r#"{"address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "topics": [null]}"#,
/// )
/// .unwrap();
/// assert_eq!(criteria.addresses().len(), 1);
/// assert!(criteria.topics()[0].is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CriteriaRepr")]
pub struct Criteria {
    from_block: Option<BlockNumberOrTag>,
    to_block: Option<BlockNumberOrTag>,
    block_hash: Option<B256>,
    addresses: HashSet<Address>,
    topics: Vec<HashSet<B256>>,
}

/// Wire shape of [`Criteria`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CriteriaRepr {
    #[serde(default)]
    from_block: Option<BlockNumberOrTag>,
    #[serde(default)]
    to_block: Option<BlockNumberOrTag>,
    #[serde(default)]
    block_hash: Option<B256>,
    #[serde(default)]
    address: Option<OneOrMany<Address>>,
    #[serde(default)]
    topics: Option<Vec<Option<OneOrMany<B256>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Eq + core::hash::Hash> OneOrMany<T> {
    fn into_set(self) -> HashSet<T> {
        match self {
            Self::One(t) => HashSet::from([t]),
            Self::Many(ts) => ts.into_iter().collect(),
        }
    }
}

impl TryFrom<CriteriaRepr> for Criteria {
    type Error = CriteriaError;

    fn try_from(repr: CriteriaRepr) -> Result<Self, Self::Error> {
        let topics: Vec<_> = repr
            .topics
            .unwrap_or_default()
            .into_iter()
            .map(|position| position.map(OneOrMany::into_set).unwrap_or_default())
            .collect();
        if topics.len() > MAX_TOPICS {
            return Err(CriteriaError::TooManyTopics(topics.len()));
        }

        Ok(Self {
            from_block: repr.from_block,
            to_block: repr.to_block,
            block_hash: repr.block_hash,
            addresses: repr.address.map(OneOrMany::into_set).unwrap_or_default(),
            topics,
        })
    }
}

impl Criteria {
    /// Set the first block of the range.
    pub fn with_from_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.from_block = Some(block.into());
        self
    }

    /// Set the last block of the range.
    pub fn with_to_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.to_block = Some(block.into());
        self
    }

    /// Restrict matching to a single block.
    pub const fn with_block_hash(mut self, hash: B256) -> Self {
        self.block_hash = Some(hash);
        self
    }

    /// Accept logs emitted by `address`.
    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.insert(address);
        self
    }

    /// Append a topic position accepting any of `topics`. An empty set
    /// matches anything.
    ///
    /// # Panics
    ///
    /// Panics if the criteria already hold four topic positions.
    pub fn with_topic(mut self, topics: impl IntoIterator<Item = B256>) -> Self {
        assert!(self.topics.len() < MAX_TOPICS, "too many topics");
        self.topics.push(topics.into_iter().collect());
        self
    }

    /// First block of the range, if set.
    pub const fn from_block(&self) -> Option<BlockNumberOrTag> {
        self.from_block
    }

    /// Last block of the range, if set.
    pub const fn to_block(&self) -> Option<BlockNumberOrTag> {
        self.to_block
    }

    /// The single block to match, if set.
    pub const fn block_hash(&self) -> Option<B256> {
        self.block_hash
    }

    /// Accepted emitting addresses. Empty matches any address.
    pub const fn addresses(&self) -> &HashSet<Address> {
        &self.addresses
    }

    /// Accepted topics per position.
    pub fn topics(&self) -> &[HashSet<B256>] {
        &self.topics
    }

    /// The kind of filter these criteria install.
    ///
    /// A range ending at `pending` that does not also start there selects
    /// both mined and pending logs.
    pub fn filter_kind(&self) -> FilterKind {
        let pending = Some(BlockNumberOrTag::Pending);
        if self.to_block == pending && self.from_block != pending {
            FilterKind::MinedAndPendingLogs
        } else {
            FilterKind::Logs
        }
    }

    /// True if the log's address and topics match.
    pub fn matches_log(&self, log: &PrimitiveLog) -> bool {
        matches(log, &self.addresses, &self.topics)
    }

    /// True if `number` lies within any concrete range bounds. Symbolic
    /// bounds are not checked.
    pub const fn matches_block_number(&self, number: u64) -> bool {
        if let Some(BlockNumberOrTag::Number(from)) = self.from_block {
            if number < from {
                return false;
            }
        }
        if let Some(BlockNumberOrTag::Number(to)) = self.to_block {
            if number > to {
                return false;
            }
        }
        true
    }

    /// Match a log streamed from the event bus: address, topics, and block
    /// height against concrete range bounds.
    pub fn matches_live_log(&self, log: &Log) -> bool {
        self.matches_log(&log.inner) && log.block_number.is_none_or(|n| self.matches_block_number(n))
    }

    /// False if the block bloom proves no log in the block can match. An
    /// empty bloom is treated as unknown.
    pub fn matches_bloom(&self, bloom: &Bloom) -> bool {
        if *bloom == Bloom::ZERO {
            return true;
        }

        let contains = |input: &[u8]| bloom.contains_input(BloomInput::Raw(input));

        (self.addresses.is_empty() || self.addresses.iter().any(|a| contains(a.as_slice())))
            && self
                .topics
                .iter()
                .all(|set| set.is_empty() || set.iter().any(|t| contains(t.as_slice())))
    }
}

/// Ethereum log matching.
///
/// The address matches if `addresses` is empty or contains the log's
/// address. Topic position `i` matches if `topics[i]` is empty or contains
/// the log's `i`th topic. A log with fewer topics than a non-empty position
/// requires never matches. Positions are AND-ed, members of a position are
/// OR-ed.
pub fn matches(log: &PrimitiveLog, addresses: &HashSet<Address>, topics: &[HashSet<B256>]) -> bool {
    if !addresses.is_empty() && !addresses.contains(&log.address) {
        return false;
    }

    let log_topics = log.topics();
    topics.iter().enumerate().all(|(i, set)| {
        set.is_empty() || log_topics.get(i).is_some_and(|topic| set.contains(topic))
    })
}
