//! Kind-specific decoding of bus events.

use crate::{
    backend::TxDecoder,
    events::{BusEvent, EventData, EventType},
    interest::Criteria,
};
use alloy::{
    primitives::B256,
    rpc::types::{Header, Log},
};
use std::sync::Arc;

/// Error decoding a bus event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The event payload does not have the shape the subscription expects.
    #[error("invalid event data {found}, expected {expected}")]
    UnexpectedEvent {
        /// The event type the subscription decodes.
        expected: EventType,
        /// The event type received.
        found: EventType,
    },
    /// The transaction result data could not be decoded.
    #[error("invalid transaction result data: {0}")]
    ResultData(String),
}

/// An item produced by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// Hash of a transaction.
    TransactionHash(B256),
    /// A committed block header.
    Header(Box<Header>),
    /// Logs of one transaction that matched the criteria, possibly empty.
    Logs(Vec<Log>),
}

/// Decoder selected when the subscription is created.
#[derive(Debug, Clone)]
pub(crate) enum EventDecoder {
    /// Transaction events to transaction hashes.
    PendingTransactions(Arc<dyn TxDecoder>),
    /// Block header events to rpc headers.
    NewHeads,
    /// Transaction events to matching logs.
    Logs { decoder: Arc<dyn TxDecoder>, criteria: Box<Criteria> },
}

impl EventDecoder {
    /// The event type this decoder accepts.
    pub(crate) const fn expects(&self) -> EventType {
        match self {
            Self::NewHeads => EventType::NewBlockHeader,
            Self::PendingTransactions(_) | Self::Logs { .. } => EventType::Tx,
        }
    }

    /// Decode one bus event.
    pub(crate) fn decode(&self, event: BusEvent) -> Result<SubscriptionEvent, DecodeError> {
        match (self, event.data) {
            (Self::PendingTransactions(decoder), EventData::Tx(result)) => {
                Ok(SubscriptionEvent::TransactionHash(decoder.tx_hash(&result.tx)))
            }
            (Self::NewHeads, EventData::NewBlockHeader(header)) => {
                let header = Header {
                    hash: header.hash_slow(),
                    inner: *header,
                    total_difficulty: None,
                    size: None,
                };
                Ok(SubscriptionEvent::Header(Box::new(header)))
            }
            (Self::Logs { decoder, criteria }, EventData::Tx(result)) => {
                let logs = decoder
                    .decode_logs(&result)?
                    .into_iter()
                    .filter(|log| criteria.matches_live_log(log))
                    .collect();
                Ok(SubscriptionEvent::Logs(logs))
            }
            (_, data) => {
                Err(DecodeError::UnexpectedEvent { expected: self.expects(), found: data.event_type() })
            }
        }
    }
}
