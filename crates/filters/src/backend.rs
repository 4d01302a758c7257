//! Collaborator interfaces consumed by the bridge.
//!
//! - [`ChainReader`]: committed header and log lookup.
//! - [`TxDecoder`]: turns raw transaction bytes and execution results from
//!   the event bus into hashes and logs.

use crate::events::{DecodeError, TxResult};
use alloy::{
    primitives::{B256, Log as PrimitiveLog, keccak256},
    rlp::{Decodable, Encodable},
    rpc::types::{Header, Log},
};
use std::future::Future;

/// Error returned by a [`ChainReader`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(Box<dyn std::error::Error + Send + Sync>);

impl BackendError {
    /// Wrap a backend error.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Read access to committed chain history.
pub trait ChainReader: Send + Sync + 'static {
    /// Get the header at `number`, if committed.
    fn header_by_number(
        &self,
        number: u64,
    ) -> impl Future<Output = Result<Option<Header>, BackendError>> + Send;

    /// Get the header with the given hash, if committed.
    fn header_by_hash(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<Header>, BackendError>> + Send;

    /// Get every log emitted in the block, in emission order.
    fn logs_in_block(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Vec<Log>, BackendError>> + Send;
}

/// Decodes transaction payloads published on the event bus.
pub trait TxDecoder: core::fmt::Debug + Send + Sync + 'static {
    /// Hash of the raw transaction bytes.
    fn tx_hash(&self, tx: &[u8]) -> B256;

    /// Logs produced by an executed transaction, in emission order.
    fn decode_logs(&self, result: &TxResult) -> Result<Vec<Log>, DecodeError>;
}

/// [`TxDecoder`] for transactions whose execution result data is an RLP
/// list of logs.
///
/// Transaction hashes are the keccak256 of the raw transaction bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RlpTxDecoder;

impl RlpTxDecoder {
    /// Encode logs as execution result data.
    pub fn encode_logs(logs: &[PrimitiveLog]) -> alloy::primitives::Bytes {
        let mut out = Vec::with_capacity(logs.length());
        logs.encode(&mut out);
        out.into()
    }
}

impl TxDecoder for RlpTxDecoder {
    fn tx_hash(&self, tx: &[u8]) -> B256 {
        keccak256(tx)
    }

    fn decode_logs(&self, result: &TxResult) -> Result<Vec<Log>, DecodeError> {
        let logs = Vec::<PrimitiveLog>::decode(&mut result.data.as_ref())
            .map_err(|e| DecodeError::ResultData(e.to_string()))?;
        let tx_hash = self.tx_hash(&result.tx);

        Ok(logs
            .into_iter()
            .enumerate()
            .map(|(idx, inner)| Log {
                inner,
                block_hash: None,
                block_number: Some(result.height),
                block_timestamp: None,
                transaction_hash: Some(tx_hash),
                transaction_index: Some(result.index),
                log_index: Some(idx as u64),
                removed: false,
            })
            .collect())
    }
}
