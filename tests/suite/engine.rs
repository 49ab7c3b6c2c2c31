//! Engine behaviour through the public facade, on virtual time.

use std::sync::Arc;
use std::time::Duration;

use settle_lsp::{
    ClientCapabilities, DeliveryMode, DiagnosticsEngine, DiagnosticsError, DiagnosticsOptions,
    EngineEvent, ExperimentalFeature,
};
use settle_types::{Position, Range};
use tokio::sync::mpsc;

use crate::common::{ClientEvent, RecordingClient, WordBackend, key, v};

const SCENARIO_V1: &str = "func foo() {\n  invalid\n}";

fn options(debounce_ms: u64) -> DiagnosticsOptions {
    DiagnosticsOptions {
        publish_debounce_ms: debounce_ms,
        ..DiagnosticsOptions::default()
    }
}

fn pull_setup(debounce_ms: u64) -> (DiagnosticsOptions, ClientCapabilities) {
    let mut options = options(debounce_ms);
    options
        .experimental_features
        .insert(ExperimentalFeature::PullDiagnostics);
    let capabilities = ClientCapabilities {
        pull_diagnostics: true,
        work_done_progress: true,
    };
    (options, capabilities)
}

fn engine(
    backend: &WordBackend,
    options: &DiagnosticsOptions,
    capabilities: ClientCapabilities,
) -> (DiagnosticsEngine, Arc<RecordingClient>) {
    let client = Arc::new(RecordingClient::default());
    let engine = DiagnosticsEngine::new(
        Arc::new(backend.clone()),
        client.clone(),
        options,
        capabilities,
        None,
    );
    (engine, client)
}

#[tokio::test(start_paused = true)]
async fn scenario_settled_document_is_pulled_at_its_version() {
    let backend = WordBackend::default();
    let (options, capabilities) = pull_setup(2_000);
    let (engine, client) = engine(&backend, &options, capabilities);
    assert_eq!(engine.mode(), DeliveryMode::Pull);

    engine.open(key("foo.swift"), v(1), SCENARIO_V1);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let report = engine.pull(&key("foo.swift"), Some(v(1)), None).await.unwrap();
    assert_eq!(report.for_version(), v(1));
    assert_eq!(report.items().len(), 1);
    assert_eq!(
        report.items()[0].range(),
        Range::new(Position::new(1, 2), Position::new(1, 9))
    );
    assert_eq!(backend.calls(), 1);
    assert!(client.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_edit_before_first_fire_runs_only_v2() {
    let backend = WordBackend::default();
    let (engine, client) = engine(&backend, &options(2_000), ClientCapabilities::default());
    assert_eq!(engine.mode(), DeliveryMode::Push);

    engine.open(key("foo.swift"), v(1), SCENARIO_V1);
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    engine
        .edit(&key("foo.swift"), v(2), "func foo() {\n}")
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(backend.versions(), vec![v(2)]);
    assert_eq!(client.published(&key("foo.swift")), vec![v(2)]);
}

#[tokio::test(start_paused = true)]
async fn published_versions_never_go_backwards_under_churn() {
    let backend = WordBackend::with_delay(Duration::from_millis(300));
    let (engine, client) = engine(&backend, &options(100), ClientCapabilities::default());

    engine.open(key("churn.swift"), v(1), "invalid");
    for version in 2..=10 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        engine
            .edit(&key("churn.swift"), v(version), "invalid")
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let published = client.published(&key("churn.swift"));
    assert!(published.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(published.last(), Some(&v(10)));
    assert_eq!(backend.versions().last(), Some(&v(10)));
}

#[tokio::test(start_paused = true)]
async fn pull_is_never_older_than_the_observed_version() {
    let backend = WordBackend::with_delay(Duration::from_millis(200));
    let (options, capabilities) = pull_setup(300);
    let (engine, _client) = engine(&backend, &options, capabilities);
    let doc = key("pull.swift");

    engine.open(doc.clone(), v(1), "a");
    let (report, ()) = tokio::join!(engine.pull(&doc, Some(v(3)), None), async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        engine.edit(&doc, v(2), "b").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        engine.edit(&doc, v(3), "c invalid").unwrap();
    });

    let report = report.unwrap();
    assert!(report.for_version() >= v(3));
    assert_eq!(report.items().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_releases_waiting_pulls() {
    let backend = WordBackend::with_delay(Duration::from_secs(60));
    let (options, capabilities) = pull_setup(100);
    let (engine, _client) = engine(&backend, &options, capabilities);
    let doc = key("closing.swift");

    engine.open(doc.clone(), v(1), "a");
    let (result, closed) = tokio::join!(engine.pull(&doc, None, None), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.close(&doc)
    });

    assert!(closed);
    assert_eq!(result, Err(DiagnosticsError::ClosedDuringWait));
    assert!(!engine.is_open(&doc));
}

#[tokio::test(start_paused = true)]
async fn background_progress_is_shown_only_for_long_tasks() {
    let backend = WordBackend::default();
    let options = DiagnosticsOptions {
        progress_debounce_ms: 500,
        ..DiagnosticsOptions::default()
    };
    let capabilities = ClientCapabilities {
        pull_diagnostics: false,
        work_done_progress: true,
    };
    let (engine, client) = engine(&backend, &options, capabilities);

    let quick = engine.progress().begin("Indexing");
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(quick);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(client.events().is_empty());

    let slow = engine.progress().begin("Indexing");
    let token = slow.token().clone();
    tokio::time::sleep(Duration::from_millis(700)).await;
    slow.report("12 of 40 files");
    drop(slow);

    assert_eq!(
        client.events(),
        vec![
            ClientEvent::Begin(token.clone(), "Indexing".to_string()),
            ClientEvent::Report(token.clone(), "12 of 40 files".to_string()),
            ClientEvent::End(token),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn computations_report_progress_when_enabled() {
    let backend = WordBackend::with_delay(Duration::from_secs(2));
    let options = DiagnosticsOptions {
        publish_debounce_ms: 100,
        progress_debounce_ms: 500,
        computation_progress: true,
        ..DiagnosticsOptions::default()
    };
    let capabilities = ClientCapabilities {
        pull_diagnostics: false,
        work_done_progress: true,
    };
    let (engine, client) = engine(&backend, &options, capabilities);

    engine.open(key("slow.swift"), v(1), "invalid");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let events = client.events();
    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(&events[0], ClientEvent::Begin(_, title) if title == "Computing diagnostics"));
    assert!(matches!(events[1], ClientEvent::End(_)));
    assert_eq!(events[2], ClientEvent::Published(key("slow.swift"), v(1)));
}

#[tokio::test(start_paused = true)]
async fn events_channel_sees_publications() {
    let backend = WordBackend::default();
    let (tx, mut rx) = mpsc::channel(8);
    let engine = DiagnosticsEngine::new(
        Arc::new(backend),
        Arc::new(RecordingClient::default()),
        &options(100),
        ClientCapabilities::default(),
        Some(tx),
    );

    engine.open(key("events.swift"), v(4), "fine");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        rx.try_recv().unwrap(),
        EngineEvent::Published {
            key: key("events.swift"),
            version: v(4)
        }
    );
}
