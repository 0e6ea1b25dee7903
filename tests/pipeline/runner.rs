use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{collect_records, init_tracing, message_of},
    mock_logs::{MockLogServer, MockLogStore, RecordedFetch},
};
use anyhow::Result;
use serde_json::json;
use streamtail::{
    ChannelSink, CheckpointStore, JsonRpcLogSource, LogSource, Runner, SourceError, TailerConfig,
    TailerConfigBuilder, Target,
};
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(10);

fn base_config(url: &str, checkpoint: &Path) -> TailerConfigBuilder {
    TailerConfig::builder()
        .endpoint(url)
        .access_key("key")
        .secret_key("secret")
        .region("eu-west-1")
        .tag("cloud.logs")
        .checkpoint_path(checkpoint)
        .fetch_interval(Duration::from_millis(200))
        .tick(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(2))
}

fn start_runner(config: TailerConfig) -> Result<(Runner, tokio::sync::mpsc::UnboundedReceiver<streamtail::Record>)> {
    let source = JsonRpcLogSource::from_config(&config)?;
    let (sink, records) = ChannelSink::new();
    Ok((Runner::new(config, Arc::new(source), Arc::new(sink)), records))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tails_every_group_and_persists_tokens() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "x", 1_700_000_000_500, r#"request done {"status":200}"#);
    store.append("A", "x", 1_700_000_001_000, "plain text line");
    store.append("B", "y", 1_700_000_002_000, r#"{"level":"warn"}"#);
    let server = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;
    let checkpoint = dir.path().join("state").join("tokens.yml");

    let (mut runner, mut records) = start_runner(base_config(server.url(), &checkpoint).build()?)?;
    runner.start().await?;

    let first = collect_records(&mut records, 3, WAIT).await?;
    assert_eq!(first[0].time, 1_700_000_000);
    assert_eq!(first[0].fields.get("status"), Some(&json!(200)));
    assert_eq!(message_of(&first[1]), Some("plain text line"));
    assert_eq!(first[1].fields.get("@log_name"), Some(&json!("cloud.logs")));
    assert_eq!(first[2].fields.get("level"), Some(&json!("warn")));
    assert!(first.iter().all(|record| record.tag == "cloud.logs"));

    store.append("A", "x", 1_700_000_003_000, "late arrival");
    let late = collect_records(&mut records, 1, WAIT).await?;
    assert_eq!(message_of(&late[0]), Some("late arrival"));

    runner.stop().await?;
    server.shutdown().await;

    let table = CheckpointStore::new(&checkpoint).load()?;
    assert_eq!(table.get(&Target::new("A", "x")), Some("3"));
    assert_eq!(table.get(&Target::new("B", "y")), Some("1"));

    assert!(store
        .authorization_headers()
        .iter()
        .all(|header| header == "Basic a2V5OnNlY3JldA=="));
    assert!(store.region_headers().iter().all(|region| region == "eu-west-1"));
    assert!(runner.telemetry().snapshot().cycles_completed >= 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restart_resumes_from_persisted_token() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "x", 1_000, "one");
    store.append("A", "x", 2_000, "two");
    let server = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;
    let checkpoint = dir.path().join("tokens.yml");

    let (mut runner, mut records) = start_runner(base_config(server.url(), &checkpoint).build()?)?;
    runner.start().await?;
    collect_records(&mut records, 2, WAIT).await?;
    runner.stop().await?;

    store.append("A", "x", 3_000, "three");
    let fetches_before_restart = store.fetches().len();

    let (mut restarted, mut records) =
        start_runner(base_config(server.url(), &checkpoint).build()?)?;
    restarted.start().await?;
    let resumed = collect_records(&mut records, 1, WAIT).await?;
    restarted.stop().await?;
    server.shutdown().await;

    assert_eq!(message_of(&resumed[0]), Some("three"));
    assert_eq!(resumed[0].time, 3);
    assert_eq!(
        store.fetches()[fetches_before_restart],
        RecordedFetch {
            group: "A".to_owned(),
            stream: "x".to_owned(),
            token: Some("2".to_owned()),
        }
    );
    assert!(records.try_recv().is_err(), "no event may be delivered twice");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fixed_stream_polls_only_that_stream() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "x", 1_000, "wanted");
    store.append("A", "other", 1_000, "ignored");
    store.append("B", "x", 1_000, "ignored");
    let server = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;

    let config = base_config(server.url(), &dir.path().join("tokens.yml"))
        .group("A")
        .stream("x")
        .build()?;
    let (mut runner, mut records) = start_runner(config)?;
    runner.start().await?;
    let received = collect_records(&mut records, 1, WAIT).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    runner.stop().await?;
    server.shutdown().await;

    assert_eq!(message_of(&received[0]), Some("wanted"));
    assert!(records.try_recv().is_err());
    assert!(store
        .fetches()
        .iter()
        .all(|fetch| fetch.group == "A" && fetch.stream == "x"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stream_prefix_filters_discovered_streams() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "web-1", 1_000, "from web");
    store.append("A", "db-1", 1_000, "from db");
    let server = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;

    let config = base_config(server.url(), &dir.path().join("tokens.yml"))
        .group("A")
        .stream_prefix("web-")
        .build()?;
    let (mut runner, mut records) = start_runner(config)?;
    runner.start().await?;
    let received = collect_records(&mut records, 1, WAIT).await?;
    runner.stop().await?;
    server.shutdown().await;

    assert_eq!(message_of(&received[0]), Some("from web"));
    assert!(store.fetches().iter().all(|fetch| fetch.stream == "web-1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_errors_surface_as_call_errors() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "x", 1_000, "one");
    let server = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;
    let config = base_config(server.url(), &dir.path().join("tokens.yml")).build()?;
    let source = JsonRpcLogSource::from_config(&config)?;

    assert_eq!(source.list_groups().await?, vec!["A".to_owned()]);
    let err = source.list_streams("missing").await.unwrap_err();
    match err.downcast_ref::<SourceError>() {
        Some(SourceError::Call { method, message }) => {
            assert_eq!(*method, "listStreams");
            assert!(message.contains("log group not found"));
        }
        other => panic!("expected SourceError::Call, got {other:?}"),
    }

    let page = source
        .fetch_events(&Target::new("A", "x"), Some("1"))
        .await?;
    assert!(page.events.is_empty());
    assert_eq!(page.next_token, "1");
    assert_eq!(source.metrics().total_errors(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_proxy_carries_every_call() -> Result<()> {
    init_tracing();
    let store = MockLogStore::new();
    store.append("A", "x", 1_000, r#"{"via":"proxy"}"#);
    // The mock answers absolute-form requests, so it stands in for a forward proxy.
    let proxy = MockLogServer::start(store.clone()).await?;
    let dir = tempdir()?;

    // Unresolvable upstream: records can only arrive through the proxy.
    let config = base_config("http://logs.invalid:1", &dir.path().join("tokens.yml"))
        .proxy(proxy.url())
        .build()?;
    let source = JsonRpcLogSource::from_config(&config)?;
    assert!(source.is_proxied());

    let (sink, mut records) = ChannelSink::new();
    let mut runner = Runner::new(config, Arc::new(source), Arc::new(sink));
    runner.start().await?;
    let received = collect_records(&mut records, 1, WAIT).await?;
    runner.stop().await?;

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].fields.get("via"), Some(&json!("proxy")));

    let targets = store.request_targets();
    assert!(!targets.is_empty());
    assert!(targets
        .iter()
        .all(|target| target.starts_with("http://logs.invalid:1")));
    assert!(store
        .authorization_headers()
        .iter()
        .all(|auth| auth.starts_with("Basic ")));

    proxy.shutdown().await;
    Ok(())
}
