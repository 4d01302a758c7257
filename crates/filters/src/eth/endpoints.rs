//! ETH namespace filter endpoint implementations.

use crate::{
    FilterCtx, FilterError,
    backend::ChainReader,
    eth::helpers::SubscribeParams,
    events::EventBus,
    interest::{Criteria, FilterChanges},
};
use ajj::HandlerCtx;
use alloy::{primitives::U64, rpc::types::Log};
use tracing::{Instrument, debug, trace_span};

// ---------------------------------------------------------------------------
// Filter Creation
// ---------------------------------------------------------------------------

pub(crate) async fn new_pending_transaction_filter<C, B>(
    ctx: FilterCtx<C, B>,
) -> Result<U64, String>
where
    C: ChainReader,
    B: EventBus,
{
    ctx.new_pending_transaction_filter().await.map_err(FilterError::into_string)
}

pub(crate) async fn new_block_filter<C, B>(ctx: FilterCtx<C, B>) -> Result<U64, String>
where
    C: ChainReader,
    B: EventBus,
{
    ctx.new_block_filter().await.map_err(FilterError::into_string)
}

pub(crate) async fn new_filter<C, B>(
    _hctx: HandlerCtx,
    (criteria,): (Criteria,),
    ctx: FilterCtx<C, B>,
) -> Result<U64, String>
where
    C: ChainReader,
    B: EventBus,
{
    ctx.new_filter(criteria).await.map_err(FilterError::into_string)
}

// ---------------------------------------------------------------------------
// Log Queries
// ---------------------------------------------------------------------------

pub(crate) async fn get_logs<C, B>(
    _hctx: HandlerCtx,
    (criteria,): (Criteria,),
    ctx: FilterCtx<C, B>,
) -> Result<Vec<Log>, String>
where
    C: ChainReader,
    B: EventBus,
{
    let span = trace_span!("eth_getLogs");
    ctx.get_logs(&criteria).instrument(span).await.map_err(FilterError::into_string)
}

pub(crate) async fn get_filter_logs<C, B>(
    _hctx: HandlerCtx,
    (id,): (U64,),
    ctx: FilterCtx<C, B>,
) -> Result<Vec<Log>, String>
where
    C: ChainReader,
    B: EventBus,
{
    let span = trace_span!("eth_getFilterLogs", %id);
    ctx.get_filter_logs(id).instrument(span).await.map_err(FilterError::into_string)
}

// ---------------------------------------------------------------------------
// Filter Polling
// ---------------------------------------------------------------------------

pub(crate) async fn get_filter_changes<C, B>(
    _hctx: HandlerCtx,
    (id,): (U64,),
    ctx: FilterCtx<C, B>,
) -> Result<FilterChanges, String>
where
    C: ChainReader,
    B: EventBus,
{
    ctx.get_filter_changes(id).map_err(FilterError::into_string)
}

pub(crate) async fn uninstall_filter<C, B>(
    _hctx: HandlerCtx,
    (id,): (U64,),
    ctx: FilterCtx<C, B>,
) -> Result<bool, String>
where
    C: ChainReader,
    B: EventBus,
{
    Ok(ctx.uninstall_filter(id))
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

pub(crate) async fn subscribe<C, B>(
    hctx: HandlerCtx,
    params: SubscribeParams,
    ctx: FilterCtx<C, B>,
) -> Result<U64, String>
where
    C: ChainReader,
    B: EventBus,
{
    let (id, errors) =
        ctx.subscribe(&hctx, params.into()).await.map_err(FilterError::into_string)?;

    hctx.spawn(async move {
        if let Ok(err) = errors.await {
            debug!(%id, %err, "subscription terminated");
        }
    });

    Ok(id)
}

pub(crate) async fn unsubscribe<C, B>(
    _hctx: HandlerCtx,
    (id,): (U64,),
    ctx: FilterCtx<C, B>,
) -> Result<bool, String>
where
    C: ChainReader,
    B: EventBus,
{
    Ok(ctx.unsubscribe(id))
}
