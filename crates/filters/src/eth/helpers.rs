//! Parameter types for filter RPC endpoints.

use crate::{api::PushKind, interest::Criteria};
use serde::Deserialize;

/// Feed names accepted by `eth_subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum PushKindName {
    NewHeads,
    NewPendingTransactions,
    Logs,
}

/// Args for `eth_subscribe`.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeParams(pub PushKindName, #[serde(default)] pub Option<Criteria>);

impl From<SubscribeParams> for PushKind {
    fn from(SubscribeParams(name, criteria): SubscribeParams) -> Self {
        match name {
            PushKindName::NewHeads => Self::NewHeads,
            PushKindName::NewPendingTransactions => Self::NewPendingTransactions,
            PushKindName::Logs => Self::Logs(Box::new(criteria.unwrap_or_default())),
        }
    }
}
