//! ETH namespace filter and subscription RPC router.

mod endpoints;
use endpoints::{
    get_filter_changes, get_filter_logs, get_logs, new_block_filter, new_filter,
    new_pending_transaction_filter, subscribe, uninstall_filter, unsubscribe,
};

mod error;
pub use error::FilterError;

mod helpers;

use crate::{FilterCtx, backend::ChainReader, events::EventBus};

/// Instantiate the `eth` filter router.
pub(crate) fn eth<C, B>() -> ajj::Router<FilterCtx<C, B>>
where
    C: ChainReader,
    B: EventBus,
{
    ajj::Router::new()
        .route("newPendingTransactionFilter", new_pending_transaction_filter::<C, B>)
        .route("newBlockFilter", new_block_filter::<C, B>)
        .route("newFilter", new_filter::<C, B>)
        .route("getLogs", get_logs::<C, B>)
        .route("uninstallFilter", uninstall_filter::<C, B>)
        .route("getFilterChanges", get_filter_changes::<C, B>)
        .route("getFilterLogs", get_filter_logs::<C, B>)
        .route("subscribe", subscribe::<C, B>)
        .route("unsubscribe", unsubscribe::<C, B>)
}
