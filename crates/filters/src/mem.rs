//! In-memory chain for tests and embedders without persistent storage.

use crate::{
    backend::{BackendError, ChainReader, RlpTxDecoder},
    events::{BusEvent, EVM_MODULE, TxResult},
};
use alloy::{
    consensus::Header as ConsensusHeader,
    primitives::{B256, Bytes, Log as PrimitiveLog, keccak256, logs_bloom},
    rpc::types::{Header, Log},
};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard},
};

/// A block committed to a [`MemChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemBlock {
    /// The block header.
    pub header: ConsensusHeader,
    /// The block hash.
    pub hash: B256,
    /// The executed transactions, as published on the event bus.
    pub txs: Vec<TxResult>,
}

impl MemBlock {
    /// The block number.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// The events a consensus node publishes when committing this block:
    /// one EVM transaction event per transaction, then the header.
    pub fn events(&self) -> Vec<BusEvent> {
        self.txs
            .iter()
            .map(|tx| BusEvent::tx(tx.clone(), EVM_MODULE))
            .chain(std::iter::once(BusEvent::new_block_header(self.header.clone())))
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemChainInner {
    headers: HashMap<u64, Header>,
    numbers: HashMap<B256, u64>,
    logs: HashMap<B256, Vec<Log>>,
}

/// An append-only in-memory [`ChainReader`].
///
/// Blocks are numbered from 1. Transaction results are RLP-encoded log
/// lists, as read by [`RlpTxDecoder`].
#[derive(Debug, Clone, Default)]
pub struct MemChain {
    inner: Arc<RwLock<MemChainInner>>,
}

impl MemChain {
    fn read(&self) -> RwLockReadGuard<'_, MemChainInner> {
        self.inner.read().expect("chain lock poisoned")
    }

    /// Height of the last committed block, or 0 if empty.
    pub fn latest(&self) -> u64 {
        self.read().headers.len() as u64
    }

    /// Commit a block. Each entry of `txs` holds the logs emitted by one
    /// transaction.
    pub fn commit(&self, txs: Vec<Vec<PrimitiveLog>>) -> MemBlock {
        let mut inner = self.inner.write().expect("chain lock poisoned");

        let number = inner.headers.len() as u64 + 1;
        let parent_hash = inner.headers.get(&(number - 1)).map(|h| h.hash).unwrap_or_default();
        let header = ConsensusHeader {
            number,
            parent_hash,
            timestamp: number,
            logs_bloom: logs_bloom(txs.iter().flatten()),
            ..Default::default()
        };
        let hash = header.hash_slow();

        let mut results = Vec::with_capacity(txs.len());
        let mut logs = Vec::new();
        for (index, tx_logs) in txs.into_iter().enumerate() {
            let tx = Bytes::from(format!("tx-{number}-{index}").into_bytes());
            let tx_hash = keccak256(&tx);

            results.push(TxResult {
                height: number,
                index: index as u64,
                tx,
                data: RlpTxDecoder::encode_logs(&tx_logs),
            });

            for log in tx_logs {
                let log_index = logs.len() as u64;
                logs.push(Log {
                    inner: log,
                    block_hash: Some(hash),
                    block_number: Some(number),
                    block_timestamp: Some(header.timestamp),
                    transaction_hash: Some(tx_hash),
                    transaction_index: Some(index as u64),
                    log_index: Some(log_index),
                    removed: false,
                });
            }
        }

        inner.headers.insert(
            number,
            Header { hash, inner: header.clone(), total_difficulty: None, size: None },
        );
        inner.numbers.insert(hash, number);
        inner.logs.insert(hash, logs);

        MemBlock { header, hash, txs: results }
    }
}

impl ChainReader for MemChain {
    async fn header_by_number(&self, number: u64) -> Result<Option<Header>, BackendError> {
        Ok(self.read().headers.get(&number).cloned())
    }

    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>, BackendError> {
        let inner = self.read();
        Ok(inner.numbers.get(&hash).and_then(|number| inner.headers.get(number)).cloned())
    }

    async fn logs_in_block(&self, hash: B256) -> Result<Vec<Log>, BackendError> {
        Ok(self.read().logs.get(&hash).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy::primitives::{Address, LogData};

    #[tokio::test]
    async fn commit_and_read() {
        let chain = MemChain::default();
        let log = PrimitiveLog {
            address: Address::repeat_byte(1),
            data: LogData::new_unchecked(vec![], Bytes::new()),
        };

        let first = chain.commit(vec![vec![log.clone()], vec![log.clone()]]);
        let second = chain.commit(vec![]);

        assert_eq!(chain.latest(), 2);
        assert_eq!(second.header.parent_hash, first.hash);

        let header = chain.header_by_hash(first.hash).await.unwrap().unwrap();
        assert_eq!(header.inner.number, 1);
        assert!(chain.header_by_number(3).await.unwrap().is_none());

        let logs = chain.logs_in_block(first.hash).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].log_index, Some(1));
        assert_eq!(logs[1].transaction_index, Some(1));

        let events = first.events();
        assert_eq!(events.len(), 3);
    }
}
