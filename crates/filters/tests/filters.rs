//! Integration tests for the `bridge-filters` ETH RPC endpoints.
//!
//! Tests exercise the public router API via the axum service layer, using an
//! in-memory chain (`MemChain`) and event bus (`LocalEventBus`). Time-based
//! tests run on tokio's paused clock.

use alloy::primitives::{Address, B256, Bytes, Log as PrimitiveLog, LogData, address};
use axum::body::Body;
use bridge_filters::{
    BlockTags, FilterConfig, FilterCtx, LocalEventBus, RateLimitConfig, RlpTxDecoder,
    mem::{MemBlock, MemChain},
};
use http::Request;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Everything needed to make RPC calls against the filter router.
struct TestHarness {
    app: axum::Router,
    ctx: FilterCtx<MemChain, LocalEventBus>,
}

impl TestHarness {
    /// Create a harness with an empty chain and default configuration.
    fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    fn with_config(config: FilterConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let ctx = FilterCtx::new(
            MemChain::default(),
            LocalEventBus::new(256),
            Arc::new(RlpTxDecoder),
            BlockTags::new(0),
            config,
        );
        let app = bridge_filters::eth::<MemChain, LocalEventBus>()
            .into_axum("/")
            .with_state(ctx.clone());
        Self { app, ctx }
    }

    fn bus(&self) -> &LocalEventBus {
        self.ctx.events().bus()
    }

    /// Commit a block, advance the latest tag, and publish the block's
    /// events. Each entry of `txs` holds the logs of one transaction.
    async fn commit(&self, txs: Vec<Vec<PrimitiveLog>>) -> MemBlock {
        let block = self.ctx.chain().commit(txs);
        self.ctx.tags().set_latest(block.number());
        for event in block.events() {
            self.bus().publish(event);
        }
        settle().await;
        block
    }
}

/// Let spawned tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Make a JSON-RPC call and return the `"result"` field.
///
/// The `method` parameter is the short name (e.g. `"newFilter"`), without
/// the `eth_` prefix. The router registers methods without namespace prefix.
///
/// Panics if the response contains an `"error"` field.
async fn rpc_call(app: &axum::Router, method: &str, params: Value) -> Value {
    let resp = rpc_call_raw(app, method, params).await;
    if let Some(error) = resp.get("error") {
        panic!("RPC error for {method}: {error}");
    }
    resp["result"].clone()
}

/// Make a JSON-RPC call and return the full response (including any error).
async fn rpc_call_raw(app: &axum::Router, method: &str, params: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Make a JSON-RPC call that must fail, and return the error object as a
/// string.
async fn rpc_error(app: &axum::Router, method: &str, params: Value) -> String {
    let resp = rpc_call_raw(app, method, params).await;
    match resp.get("error") {
        Some(error) => error.to_string(),
        None => panic!("expected RPC error for {method}, got {resp}"),
    }
}

// ---------------------------------------------------------------------------
// Test data builders
// ---------------------------------------------------------------------------

const ADDR_A: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

const ADDR_B: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

const TOPIC: B256 = B256::repeat_byte(0xcc);

/// A log from `address` whose data byte identifies it.
fn make_log(address: Address, tag: u8) -> PrimitiveLog {
    PrimitiveLog { address, data: LogData::new_unchecked(vec![TOPIC], Bytes::from(vec![tag])) }
}

fn addresses(logs: &Value) -> Vec<Address> {
    logs.as_array()
        .unwrap()
        .iter()
        .map(|l| l["address"].as_str().unwrap().parse().unwrap())
        .collect()
}

fn data_tags(logs: &Value) -> Vec<String> {
    logs.as_array().unwrap().iter().map(|l| l["data"].as_str().unwrap().to_owned()).collect()
}

// ---------------------------------------------------------------------------
// Polled filters
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_log_filter_drains_exactly() {
    let h = TestHarness::new();

    let filter_id = rpc_call(&h.app, "newFilter", json!([{}])).await;

    h.commit(vec![vec![make_log(ADDR_A, 1), make_log(ADDR_B, 2)]]).await;
    h.commit(vec![vec![make_log(ADDR_A, 3)], vec![make_log(ADDR_B, 4)]]).await;

    let changes = rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert_eq!(data_tags(&changes), vec!["0x01", "0x02", "0x03", "0x04"]);

    // Poll again with no new events, should be empty
    let changes = rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert_eq!(changes, json!([]));
}

#[tokio::test(start_paused = true)]
async fn test_block_filter_returns_hashes() {
    let h = TestHarness::new();

    let filter_id = rpc_call(&h.app, "newBlockFilter", json!([])).await;

    let first = h.commit(vec![]).await;
    let second = h.commit(vec![vec![make_log(ADDR_A, 1)]]).await;

    let changes = rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert_eq!(changes, json!([first.hash, second.hash]));
}

#[tokio::test(start_paused = true)]
async fn test_pending_transaction_filter() {
    let h = TestHarness::new();

    let filter_id = rpc_call(&h.app, "newPendingTransactionFilter", json!([])).await;
    let block = h.commit(vec![vec![], vec![make_log(ADDR_A, 1)]]).await;

    let changes = rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    let expected: Vec<_> = block.txs.iter().map(|tx| alloy::primitives::keccak256(&tx.tx)).collect();
    assert_eq!(changes, json!(expected));
}

#[tokio::test(start_paused = true)]
async fn test_uninstall_filter() {
    let h = TestHarness::new();

    let filter_id = rpc_call(&h.app, "newBlockFilter", json!([])).await;
    settle().await;
    assert_eq!(h.bus().active_subscriptions(), 1);

    // Uninstall
    let result = rpc_call(&h.app, "uninstallFilter", json!([filter_id])).await;
    assert_eq!(result, json!(true));

    // Uninstall again, should return false
    let result = rpc_call(&h.app, "uninstallFilter", json!([filter_id])).await;
    assert_eq!(result, json!(false));

    // The subscription is gone and nothing is delivered
    settle().await;
    assert_eq!(h.bus().active_subscriptions(), 0);
    h.commit(vec![]).await;
    let err = rpc_error(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert!(err.contains("not found"), "unexpected error: {err}");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_filter() {
    let h = TestHarness::new();

    let err = rpc_error(&h.app, "getFilterChanges", json!(["0x2a"])).await;
    assert!(err.contains("filter 42 not found"), "unexpected error: {err}");

    let err = rpc_error(&h.app, "getFilterLogs", json!(["0x2a"])).await;
    assert!(err.contains("filter 42 not found"), "unexpected error: {err}");
}

// ---------------------------------------------------------------------------
// Inactivity deadline
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_polled_filter_survives() {
    let h = TestHarness::new();
    let filter_id = rpc_call(&h.app, "newBlockFilter", json!([])).await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    }
    assert_eq!(h.ctx.filter_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unpolled_filter_is_evicted() {
    let h = TestHarness::new();
    let filter_id = rpc_call(&h.app, "newBlockFilter", json!([])).await;
    settle().await;

    // Inactivity window plus one sweep interval
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;

    assert_eq!(h.ctx.filter_count(), 0);
    assert_eq!(h.bus().active_subscriptions(), 0);
    let err = rpc_error(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert!(err.contains("not found"), "unexpected error: {err}");
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_rate_limit_rejects_without_side_effects() {
    let h = TestHarness::with_config(FilterConfig {
        rate_limits: RateLimitConfig::new(["eth_newFilter", "eth_getLogs"], 2),
        ..Default::default()
    });

    rpc_call(&h.app, "newFilter", json!([{}])).await;
    rpc_call(&h.app, "newFilter", json!([{}])).await;
    settle().await;

    let err = rpc_error(&h.app, "newFilter", json!([{}])).await;
    assert!(err.contains("server is too busy"), "unexpected error: {err}");

    settle().await;
    assert_eq!(h.ctx.filter_count(), 2);
    assert_eq!(h.bus().active_subscriptions(), 2);

    // Unlimited methods are unaffected
    rpc_call(&h.app, "newBlockFilter", json!([])).await;
    assert_eq!(h.ctx.filter_count(), 3);
}

// ---------------------------------------------------------------------------
// Log queries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_address_filter_live_and_historical() {
    let h = TestHarness::new();

    let filter_id = rpc_call(
        &h.app,
        "newFilter",
        json!([{
            "fromBlock": "0x1",
            "toBlock": "latest",
            "address": ADDR_A,
            "topics": [],
        }]),
    )
    .await;

    h.commit(vec![vec![make_log(ADDR_A, 1)], vec![make_log(ADDR_B, 2)]]).await;

    let changes = rpc_call(&h.app, "getFilterChanges", json!([filter_id])).await;
    assert_eq!(addresses(&changes), vec![ADDR_A]);

    let logs = rpc_call(&h.app, "getFilterLogs", json!([filter_id])).await;
    assert_eq!(addresses(&logs), vec![ADDR_A]);
    assert_eq!(data_tags(&logs), vec!["0x01"]);
}

#[tokio::test(start_paused = true)]
async fn test_get_logs_by_block_hash() {
    let h = TestHarness::new();

    let block = h
        .commit(vec![vec![make_log(ADDR_A, 1), make_log(ADDR_B, 2)], vec![make_log(ADDR_A, 3)]])
        .await;
    h.commit(vec![vec![make_log(ADDR_A, 4)]]).await;

    let logs = rpc_call(
        &h.app,
        "getLogs",
        json!([{ "blockHash": block.hash, "address": [ADDR_A] }]),
    )
    .await;
    assert_eq!(data_tags(&logs), vec!["0x01", "0x03"]);
    assert_eq!(logs[0]["logIndex"], json!("0x0"));
    assert_eq!(logs[1]["logIndex"], json!("0x2"));

    // blockHash takes precedence over range bounds
    let logs = rpc_call(
        &h.app,
        "getLogs",
        json!([{ "blockHash": block.hash, "fromBlock": "0x2", "toBlock": "0x2" }]),
    )
    .await;
    assert_eq!(logs.as_array().unwrap().len(), 3);

    let err = rpc_error(&h.app, "getLogs", json!([{ "blockHash": B256::repeat_byte(9) }])).await;
    assert!(err.contains("block not found"), "unexpected error: {err}");
}

#[tokio::test(start_paused = true)]
async fn test_get_logs_by_range() {
    let h = TestHarness::new();

    h.commit(vec![vec![make_log(ADDR_A, 1)]]).await;
    h.commit(vec![vec![make_log(ADDR_B, 2)]]).await;
    h.commit(vec![vec![make_log(ADDR_A, 3)]]).await;

    // Default range is the latest block only
    let logs = rpc_call(&h.app, "getLogs", json!([{}])).await;
    assert_eq!(data_tags(&logs), vec!["0x03"]);

    let logs = rpc_call(
        &h.app,
        "getLogs",
        json!([{ "fromBlock": "earliest", "toBlock": "0x2", "topics": [[TOPIC]] }]),
    )
    .await;
    assert_eq!(data_tags(&logs), vec!["0x01", "0x02"]);

    let err = rpc_error(&h.app, "getLogs", json!([{ "fromBlock": "0x3", "toBlock": "0x1" }])).await;
    assert!(err.contains("must not exceed"), "unexpected error: {err}");
}

#[tokio::test(start_paused = true)]
async fn test_get_logs_range_stops_at_head() {
    let h = TestHarness::with_config(FilterConfig {
        max_blocks_per_filter: 0,
        ..Default::default()
    });

    h.commit(vec![vec![make_log(ADDR_A, 1)]]).await;
    h.commit(vec![vec![make_log(ADDR_A, 2)]]).await;

    let logs = rpc_call(
        &h.app,
        "getLogs",
        json!([{ "fromBlock": "0x0", "toBlock": "0xffffffffffffffff" }]),
    )
    .await;
    assert_eq!(data_tags(&logs), vec!["0x01", "0x02"]);

    let logs = rpc_call(
        &h.app,
        "getLogs",
        json!([{ "fromBlock": "0x10", "toBlock": "0xffffffffffffffff" }]),
    )
    .await;
    assert_eq!(logs, json!([]));
}

#[tokio::test(start_paused = true)]
async fn test_get_filter_logs_requires_log_filter() {
    let h = TestHarness::new();

    let filter_id = rpc_call(&h.app, "newBlockFilter", json!([])).await;
    let err = rpc_error(&h.app, "getFilterLogs", json!([filter_id])).await;
    assert!(err.contains("doesn't have a LogsSubscription type"), "unexpected error: {err}");
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_subscribe_requires_notifications() {
    let h = TestHarness::new();

    let err = rpc_error(&h.app, "subscribe", json!(["newHeads"])).await;
    assert!(err.contains("notifications not supported"), "unexpected error: {err}");
    assert_eq!(h.ctx.subscription_count(), 0);

    let result = rpc_call(&h.app, "unsubscribe", json!(["0x1"])).await;
    assert_eq!(result, json!(false));
}
