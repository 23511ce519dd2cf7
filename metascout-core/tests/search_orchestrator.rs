mod support;

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use metascout_core::{
    MemoryPersistence, Persistence, ResultSink, SearchOrchestrator,
    SearchOutcome, SessionMode,
};
use metascout_model::{
    ErrorProjection, FetchRequest, FetchResponse, MetadataRecord, ViewStatus,
};
use support::{FetchScript, Gate, ScriptedTransport, StreamScript, records, search_config, settle, wait_until};

fn orchestrator(transport: &Arc<ScriptedTransport>) -> SearchOrchestrator {
    SearchOrchestrator::new(transport.transport(), ResultSink::new(), search_config())
}

#[tokio::test]
async fn streamed_result_becomes_the_visible_result() {
    let transport = ScriptedTransport::new();
    transport.script("ABC-123", StreamScript::found(&["ABC-123"]));
    let mut orchestrator = orchestrator(&transport);

    let outcome = orchestrator.search("ABC-123").await;

    assert!(outcome.is_found());
    let view = orchestrator.sink().current();
    assert_eq!(view.status, ViewStatus::Result);
    assert_eq!(view.results.records, vec![MetadataRecord::new("ABC-123")]);
    assert_eq!(view.query.as_deref(), Some("ABC-123"));
    assert_eq!(orchestrator.mode(), SessionMode::Resolved);
    assert!(transport.fetch_calls().is_empty());
}

#[tokio::test]
async fn truncated_stream_falls_back_exactly_once() {
    let transport = ScriptedTransport::new();
    transport.script("ABC-123", StreamScript::truncated());
    let mut orchestrator = orchestrator(&transport);

    let outcome = orchestrator.search("ABC-123").await;

    assert!(outcome.is_found());
    assert_eq!(transport.fetch_calls(), vec![FetchRequest::query("ABC-123")]);
    assert_eq!(
        orchestrator.sink().current().results.records,
        records(&["ABC-123"])
    );
}

#[tokio::test]
async fn connection_errors_and_refusals_fall_back() {
    for script in [
        StreamScript::connection_error("reset by peer"),
        StreamScript::refused("connection refused"),
    ] {
        let transport = ScriptedTransport::new();
        transport.script("ABC-123", script);
        let mut orchestrator = orchestrator(&transport);

        assert!(orchestrator.search("ABC-123").await.is_found());
        assert_eq!(transport.fetch_calls().len(), 1);
    }
}

#[tokio::test]
async fn failed_fallback_is_recoverable_and_not_retried() {
    let transport = ScriptedTransport::new();
    transport.script("ABC-123", StreamScript::truncated());
    transport.fetch("ABC-123", FetchScript::Fail("connection refused".into()));
    let mut orchestrator = orchestrator(&transport);

    let outcome = orchestrator.search("ABC-123").await;

    let SearchOutcome::Failed(error) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert!(error.recoverable);
    assert!(error.message.contains("connection refused"));
    assert_eq!(transport.fetch_calls().len(), 1);
    assert_eq!(orchestrator.mode(), SessionMode::Failed);
    assert_eq!(orchestrator.sink().current().error, Some(error));
}

#[tokio::test]
async fn rejected_fallback_is_a_server_error() {
    let transport = ScriptedTransport::new();
    transport.script("ABC-123", StreamScript::truncated());
    transport.fetch(
        "ABC-123",
        FetchScript::Respond(FetchResponse::rejected("unknown identifier")),
    );
    let mut orchestrator = orchestrator(&transport);

    assert_eq!(
        orchestrator.search("ABC-123").await,
        SearchOutcome::Failed(ErrorProjection {
            message: "unknown identifier".into(),
            recoverable: false,
        })
    );
}

#[tokio::test]
async fn newer_search_supersedes_an_unresolved_one() {
    let transport = ScriptedTransport::new();
    let gate = Gate::new();
    transport.script("ABC-001", StreamScript::found(&["ABC-001"]).gated(&gate));
    transport.script("ABC-002", StreamScript::found(&["ABC-002"]));
    let mut orchestrator = orchestrator(&transport);

    orchestrator.start("ABC-001");
    orchestrator.start("ABC-002");
    let outcome = orchestrator.run_until_idle().await;

    assert_eq!(
        outcome,
        Some(SearchOutcome::Found(metascout_model::ResultSet::new(
            records(&["ABC-002"]),
            false
        )))
    );

    gate.open();
    settle().await;
    assert_eq!(orchestrator.next().await, None);

    let view = orchestrator.sink().current();
    assert_eq!(view.query.as_deref(), Some("ABC-002"));
    assert_eq!(view.results.records, records(&["ABC-002"]));
}

#[tokio::test]
async fn cancel_restores_the_state_before_start() {
    let transport = ScriptedTransport::new();
    let gate = Gate::new();
    transport.script("ABC-002", StreamScript::found(&["ABC-002"]).gated(&gate));
    let mut orchestrator = orchestrator(&transport);

    orchestrator.search("ABC-001").await;
    orchestrator.sink().set_page_offset(4);
    orchestrator.sink().set_title_edit(Some("draft".into()));
    let before = orchestrator.sink().current();

    orchestrator.start("ABC-002");
    assert!(orchestrator.sink().current().is_loading());
    wait_until(|| transport.opened_count("ABC-002") == 1).await;

    assert!(orchestrator.cancel());
    assert_eq!(orchestrator.mode(), SessionMode::Cancelled);
    assert_eq!(orchestrator.sink().current(), before);

    gate.open();
    settle().await;
    assert_eq!(orchestrator.run_until_idle().await, None);
    assert_eq!(orchestrator.sink().current(), before);
}

#[tokio::test]
async fn cancel_after_start_twice_restores_the_original_state() {
    let transport = ScriptedTransport::new();
    let gate = Gate::new();
    transport.script("ABC-002", StreamScript::found(&["ABC-002"]).gated(&gate));
    transport.script("ABC-003", StreamScript::found(&["ABC-003"]).gated(&gate));
    let mut orchestrator = orchestrator(&transport);

    orchestrator.search("ABC-001").await;
    let before = orchestrator.sink().current();

    orchestrator.start("ABC-002");
    orchestrator.start("ABC-003");
    orchestrator.cancel();

    assert_eq!(orchestrator.sink().current(), before);
}

#[tokio::test]
async fn cancel_after_resolution_leaves_the_view_alone() {
    let transport = ScriptedTransport::new();
    let mut orchestrator = orchestrator(&transport);

    orchestrator.search("ABC-001").await;
    let before = orchestrator.sink().current();

    assert!(!orchestrator.cancel());
    assert_eq!(orchestrator.sink().current(), before);
    assert_eq!(orchestrator.mode(), SessionMode::Resolved);
}

#[tokio::test]
async fn load_more_appends_and_failures_keep_has_more() {
    let transport = ScriptedTransport::new();
    transport.script("ABC", StreamScript::found_paged(&["ABC-001", "ABC-002"]));
    transport.fetch("ABC", FetchScript::Fail("timeout".into()));
    let mut orchestrator = orchestrator(&transport);

    orchestrator.search("ABC").await;
    assert!(orchestrator.load_more());
    orchestrator.run_until_idle().await;

    let view = orchestrator.sink().current();
    assert_eq!(view.results.len(), 2);
    assert!(view.results.has_more);
    assert_eq!(view.status, ViewStatus::Result);

    transport.fetch(
        "ABC",
        FetchScript::Respond(FetchResponse::found(records(&["ABC-003"]), true)),
    );
    assert!(orchestrator.load_more());
    orchestrator.run_until_idle().await;

    let view = orchestrator.sink().current();
    assert_eq!(view.results.len(), 3);
    assert_eq!(view.results.next_offset(), 3);
    assert_eq!(
        transport.fetch_calls(),
        vec![
            FetchRequest::page("ABC", 2, 20),
            FetchRequest::page("ABC", 2, 20),
        ]
    );
}

#[tokio::test]
async fn page_for_a_superseded_search_is_dropped() {
    let transport = ScriptedTransport::new();
    transport.script("ABC", StreamScript::found_paged(&["ABC-001"]));
    transport.fetch(
        "ABC",
        FetchScript::Respond(FetchResponse::found(records(&["ABC-002"]), false)),
    );
    let mut orchestrator = orchestrator(&transport);

    orchestrator.search("ABC").await;
    assert!(orchestrator.load_more());
    orchestrator.search("XYZ-999").await;
    settle().await;
    orchestrator.run_until_idle().await;

    let view = orchestrator.sink().current();
    assert_eq!(view.results.records, records(&["XYZ-999"]));
}

#[tokio::test]
async fn resolved_state_is_persisted_and_restored() -> Result<()> {
    let transport = ScriptedTransport::new();
    let store = Arc::new(MemoryPersistence::new());
    let mut orchestrator =
        orchestrator(&transport).with_persistence(store.clone() as Arc<dyn Persistence>);

    orchestrator.search("ABC-123").await;
    assert_eq!(store.len(), 1);
    let saved = orchestrator.sink().current();

    let mut restored =
        SearchOrchestrator::new(transport.transport(), ResultSink::new(), search_config())
            .with_persistence(store.clone() as Arc<dyn Persistence>);
    assert!(restored.restore_persisted().await?);
    assert_eq!(restored.sink().current(), saved);
    Ok(())
}

#[tokio::test]
async fn restored_results_keep_paging() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.script("ABC", StreamScript::found_paged(&["ABC-001"]));
    transport.fetch(
        "ABC",
        FetchScript::Respond(FetchResponse::found(records(&["ABC-002"]), false)),
    );
    let store = Arc::new(MemoryPersistence::new());
    orchestrator(&transport)
        .with_persistence(store.clone() as Arc<dyn Persistence>)
        .search("ABC")
        .await;

    let mut restored =
        orchestrator(&transport).with_persistence(store.clone() as Arc<dyn Persistence>);
    assert!(!restored.load_more());
    assert!(restored.restore_persisted().await?);
    assert_eq!(restored.mode(), SessionMode::Resolved);

    assert!(restored.load_more());
    restored.run_until_idle().await;

    let view = restored.sink().current();
    assert_eq!(view.results.records, records(&["ABC-001", "ABC-002"]));
    assert!(!view.results.has_more);
    assert_eq!(transport.fetch_calls(), vec![FetchRequest::page("ABC", 1, 20)]);
    Ok(())
}

#[tokio::test]
async fn renderer_sees_loading_then_result() {
    let transport = ScriptedTransport::new();
    let mut orchestrator = orchestrator(&transport);
    let mut updates = orchestrator.sink().updates();

    let initial = updates.next().await.unwrap();
    assert_eq!(initial.status, ViewStatus::Idle);

    orchestrator.start("ABC-123");
    let loading = updates.next().await.unwrap();
    assert!(loading.is_loading());

    orchestrator.run_until_idle().await;
    let last = updates.next().await.unwrap();
    assert_eq!(last.status, ViewStatus::Result);
}
