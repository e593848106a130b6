//! End-to-end tick scenarios.
//!
//! Drives a full `XeggexAgent` against the scripted exchange with real
//! snapshot stores and event logs.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use xeggex_agent::engine::dispatcher::XeggexAgent;
use xeggex_agent::options::RawOptions;
use xeggex_agent::storage::events::{MemoryEventLog, SqliteEventLog};
use xeggex_agent::storage::{JsonFileSnapshotStore, MemorySnapshotStore, SnapshotRepository};
use xeggex_agent::types::{AgentError, Mode, Record};

use crate::mock_exchange::MockExchange;

fn balance_options() -> RawOptions {
    RawOptions {
        api_key: Some("key".into()),
        api_secret: Some("secret".into()),
        ..RawOptions::default()
    }
}

fn order_options(symbol: &str) -> RawOptions {
    RawOptions {
        mode: Some("check_orders".into()),
        symbol: Some(symbol.into()),
        status: Some("active".into()),
        ..balance_options()
    }
}

fn agent(
    options: RawOptions,
    exchange: &MockExchange,
    snapshots: &MemorySnapshotStore,
    log: &MemoryEventLog,
) -> XeggexAgent {
    XeggexAgent::new(
        "xeggex",
        options,
        Box::new(exchange.clone()),
        Box::new(snapshots.clone()),
        Box::new(log.clone()),
    )
}

fn rec(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn temp_snapshot_path() -> String {
    std::env::temp_dir()
        .join(format!("xeggex_snapshot_test_{}.json", Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

#[tokio::test]
async fn first_run_emits_every_record() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([
        {"asset": "BTC", "available": "1.0"},
        {"asset": "ETH", "available": "2.0"},
        {"asset": "CLO", "available": "100"}
    ]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    let report = agent.check().await.unwrap();
    assert_eq!(report.mode, Mode::CheckBalance);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.emitted(), 3);
    assert!(!report.fast_path);

    let events = log.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].payload["asset"], "BTC");
    assert_eq!(events[2].payload["asset"], "CLO");
    assert_eq!(snapshots.current().unwrap().len(), 3);
}

#[tokio::test]
async fn identical_payload_emits_nothing() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC", "available": "1.0"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    for _ in 0..3 {
        let report = agent.check().await.unwrap();
        assert!(report.fast_path);
        assert_eq!(report.emitted(), 0);
    }

    assert_eq!(exchange.fetch_count(), 4);
    assert_eq!(log.events().len(), 1);
}

#[tokio::test]
async fn reordered_payload_emits_nothing() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}, {"asset": "ETH"}]));
    exchange.push_json(json!([{"asset": "ETH"}, {"asset": "BTC"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    let report = agent.check().await.unwrap();
    assert!(!report.fast_path);
    assert_eq!(report.emitted(), 0);
    assert_eq!(log.events().len(), 2);
}

#[tokio::test]
async fn superset_payload_emits_one_event() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"id": "o1"}, {"id": "o2"}]));
    exchange.push_json(json!([{"id": "o1"}, {"id": "o2"}, {"id": "o3"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(order_options("CLO/BTC"), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    let report = agent.check().await.unwrap();
    assert_eq!(report.new_records, vec![rec(json!({"id": "o3"}))]);
    assert_eq!(log.events().len(), 3);
    assert_eq!(snapshots.current().unwrap().len(), 3);
}

#[tokio::test]
async fn changed_balance_emits_only_the_change() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([
        {"asset": "BTC", "available": "1.0"},
        {"asset": "ETH", "available": "2.0"}
    ]));
    exchange.push_json(json!([
        {"asset": "BTC", "available": "1.5"},
        {"asset": "ETH", "available": "2.0"}
    ]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    let report = agent.check().await.unwrap();

    assert_eq!(report.new_records, vec![rec(json!({"asset": "BTC", "available": "1.5"}))]);
    let events = log.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].payload["available"], "1.5");
}

#[tokio::test]
async fn removed_records_emit_nothing() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"id": "o1"}, {"id": "o2"}, {"id": "o3"}]));
    exchange.push_json(json!([{"id": "o2"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(order_options("CLO/BTC"), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    let report = agent.check().await.unwrap();
    assert_eq!(report.emitted(), 0);
    assert_eq!(snapshots.current().unwrap(), vec![rec(json!({"id": "o2"}))]);
}

#[tokio::test]
async fn duplicate_new_records_each_emit() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"id": "x"}, {"id": "x"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    let report = agent.check().await.unwrap();
    assert_eq!(report.emitted(), 2);

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert_ne!(events[0].id, events[1].id);
}

#[tokio::test]
async fn orders_request_carries_query() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(order_options("CLO/BTC"), &exchange, &snapshots, &log);

    let report = agent.check().await.unwrap();
    assert_eq!(report.mode, Mode::CheckOrders);
    assert_eq!(report.fetched, 0);
    assert_eq!(
        exchange.requests(),
        vec!["/getorders?symbol=CLO%2FBTC&status=active&limit=10&skip=0".to_string()]
    );
    // An empty first payload still seeds the snapshot.
    assert_eq!(snapshots.current(), Some(Vec::new()));
}

#[tokio::test]
async fn malformed_body_keeps_previous_snapshot() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}]));
    exchange.push_body(r#"{"error":"Unauthorized"}"#);
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    agent.check().await.unwrap();
    let err = agent.check().await.unwrap_err();
    assert!(matches!(err, AgentError::MalformedResponse { status: 200, .. }));

    assert_eq!(snapshots.current(), Some(vec![rec(json!({"asset": "BTC"}))]));
    assert_eq!(log.events().len(), 1);
    assert_eq!(agent.health().read().await.errors_logged, 1);
}

#[tokio::test]
async fn network_failure_then_recovery() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    exchange.set_error("connection refused");
    assert!(matches!(agent.check().await, Err(AgentError::Network(_))));
    assert!(snapshots.current().is_none());

    exchange.clear_error();
    let report = agent.check().await.unwrap();
    assert_eq!(report.emitted(), 1);
}

#[tokio::test]
async fn failed_emit_retries_records_next_tick() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log);

    log.set_error("event log unavailable");
    assert!(matches!(agent.check().await, Err(AgentError::Emit(_))));
    assert!(snapshots.current().is_none());

    log.clear_error();
    let report = agent.check().await.unwrap();
    assert_eq!(report.emitted(), 1);
    assert_eq!(log.events().len(), 1);
}

#[tokio::test]
async fn receive_interpolates_symbol_from_each_event() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(order_options("{{ market.symbol }}"), &exchange, &snapshots, &log);

    let results = agent
        .receive(&[
            rec(json!({"market": {"symbol": "CLO/BTC"}})),
            rec(json!({"market": {"symbol": "XRG/USDT"}})),
        ])
        .await;

    assert!(results.iter().all(|r| r.is_ok()));
    let requests = exchange.requests();
    assert!(requests[0].contains("symbol=CLO%2FBTC"));
    assert!(requests[1].contains("symbol=XRG%2FUSDT"));
    assert_eq!(agent.health().read().await.ticks_run, 2);
}

#[tokio::test]
async fn file_snapshot_survives_restart() {
    let path = temp_snapshot_path();
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC", "available": "1.0"}]));
    let log = MemoryEventLog::new();

    let build = |exchange: &MockExchange, log: &MemoryEventLog| {
        XeggexAgent::new(
            "xeggex",
            balance_options(),
            Box::new(exchange.clone()),
            Box::new(JsonFileSnapshotStore::new("xeggex", Some(path.as_str()))),
            Box::new(log.clone()),
        )
    };

    let mut first = build(&exchange, &log);
    assert_eq!(first.check().await.unwrap().emitted(), 1);
    drop(first);

    let mut restarted = build(&exchange, &log);
    let report = restarted.check().await.unwrap();
    assert!(report.fast_path);
    assert_eq!(log.events().len(), 1);

    JsonFileSnapshotStore::new("xeggex", Some(path.as_str())).clear().unwrap();
}

#[tokio::test]
async fn torn_staging_file_does_not_block_ticks() {
    let path = temp_snapshot_path();
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}]));
    exchange.push_json(json!([{"asset": "BTC"}, {"asset": "ETH"}]));
    let log = MemoryEventLog::new();
    let mut agent = XeggexAgent::new(
        "xeggex",
        balance_options(),
        Box::new(exchange.clone()),
        Box::new(JsonFileSnapshotStore::new("xeggex", Some(path.as_str()))),
        Box::new(log.clone()),
    );

    agent.check().await.unwrap();
    std::fs::write(format!("{path}.tmp"), r#"{"agent":"xeggex","updated_at":"2026-"#).unwrap();

    for _ in 0..3 {
        agent.check().await.unwrap();
    }
    assert_eq!(log.events().len(), 2);
    assert_eq!(log.events()[1].payload["asset"], "ETH");

    JsonFileSnapshotStore::new("xeggex", Some(path.as_str())).clear().unwrap();
}

#[tokio::test]
async fn sqlite_log_records_events_and_seeds_health() {
    let log = SqliteEventLog::in_memory().await.unwrap();
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}, {"asset": "ETH"}]));

    let mut agent = XeggexAgent::new(
        "xeggex",
        balance_options(),
        Box::new(exchange.clone()),
        Box::new(MemorySnapshotStore::new()),
        Box::new(log.clone()),
    );
    agent.check().await.unwrap();

    assert_eq!(log.count("xeggex").await.unwrap(), 2);
    let recent = log.recent("xeggex", 10).await.unwrap();
    assert_eq!(recent[0].payload["asset"], "ETH");
    assert!(log.last_event_at("xeggex").await.unwrap().is_some());
    assert!(agent.is_working().await);

    // A restarted agent picks its health up from the stored history.
    let restarted = XeggexAgent::new(
        "xeggex",
        balance_options(),
        Box::new(exchange.clone()),
        Box::new(MemorySnapshotStore::new()),
        Box::new(log.clone()),
    )
    .with_health(Arc::new(RwLock::new(log.load_health("xeggex").await.unwrap())));
    assert!(restarted.is_working().await);
    assert_eq!(restarted.health().read().await.events_created, 2);
    assert_eq!(restarted.health().read().await.ticks_run, 0);

    let other = log.load_health("someone-else").await.unwrap();
    assert_eq!(other.events_created, 0);
    assert!(other.last_event_at.is_none());
}

#[tokio::test]
async fn dry_run_leaves_snapshot_untouched() {
    let exchange = MockExchange::new();
    exchange.push_json(json!([{"asset": "BTC"}]));
    let snapshots = MemorySnapshotStore::new();
    let log = MemoryEventLog::new();
    let mut agent = agent(balance_options(), &exchange, &snapshots, &log).with_dry_run(true);

    let report = agent.check().await.unwrap();
    assert_eq!(report.new_records.len(), 1);
    assert_eq!(report.emitted(), 0);
    assert!(log.events().is_empty());
    assert!(snapshots.read().unwrap().is_none());
}
