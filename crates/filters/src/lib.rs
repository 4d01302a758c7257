#![doc = include_str!("../README.md")]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod api;
pub use api::PushKind;

pub mod backend;
pub use backend::{BackendError, ChainReader, RlpTxDecoder, TxDecoder};

mod config;
pub use config::{FilterConfig, RateLimitConfig};

mod ctx;
pub use ctx::FilterCtx;

mod eth;
pub use eth::FilterError;

pub mod events;
pub use events::{EventBus, EventSystem, LocalEventBus, Subscription};

pub mod interest;
pub use interest::{Criteria, FilterChanges, FilterKind};

mod limiter;

mod logs;

pub mod mem;

mod resolve;
pub use resolve::BlockTags;

/// Instantiate the `eth` filter router. Methods are registered without the
/// namespace prefix.
pub fn eth<C, B>() -> ajj::Router<FilterCtx<C, B>>
where
    C: ChainReader,
    B: EventBus,
{
    eth::eth()
}

/// Instantiate a router serving the filter methods under the `eth`
/// namespace, e.g. `eth_newFilter`.
pub fn router<C, B>() -> ajj::Router<FilterCtx<C, B>>
where
    C: ChainReader,
    B: EventBus,
{
    ajj::Router::new().nest("eth", eth::eth())
}
