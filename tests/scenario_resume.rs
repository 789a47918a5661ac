//! Scenario S6: a run fails partway through, and a resumed run against the
//! same graph reuses the completed upstream node's checkpoint while
//! re-executing the node that previously failed.

mod common;

use common::Workspace;
use taskgraph::recovery::records::RunMode;
use taskgraph::scheduler::NodeState;
use taskgraph_test_utils::builders::{GraphBuilder, TaskSpec};

fn graph_with_a_succeeding_and_b_failing() -> Vec<u8> {
    GraphBuilder::new()
        .task(TaskSpec::new("a", "echo keep > a.out").output("a.out"))
        .task(TaskSpec::new("b", "false").input("a.out").after("a"))
        .to_document_bytes()
}

#[tokio::test]
async fn resume_reuses_completed_upstream_and_reexecutes_the_failed_node() {
    common::init_tracing();
    let ws = Workspace::new();
    ws.write_graph(&graph_with_a_succeeding_and_b_failing());

    let first = taskgraph::run_clean(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        1,
    )
    .await
    .expect("run_clean itself should not error even though task b fails");

    assert!(first.result.has_failure());
    assert_eq!(first.result.final_state["a"], NodeState::Completed);
    assert_eq!(first.result.final_state["b"], NodeState::Failed);

    let resumed = taskgraph::resume_run(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        first.run_record.run_id.as_str(),
        1,
        false,
    )
    .await
    .expect("resume against the same graph hash should be accepted");

    // a has a valid checkpoint and an unchanged input, so it's restored from
    // cache rather than re-run; b has no checkpoint (it never completed) and
    // its command is still "false", so it re-executes and fails again.
    assert_eq!(resumed.result.final_state["a"], NodeState::Cached);
    assert!(resumed.result.results["a"].from_cache);
    assert_eq!(resumed.result.final_state["b"], NodeState::Failed);
    assert!(resumed.result.has_failure());
    assert_eq!(resumed.run_record.previous_run_id.as_deref(), Some(first.run_record.run_id.as_str()));
    assert_eq!(resumed.run_record.retry_count, first.run_record.retry_count + 1);
}

/// A multi-hop reuse chain (a -> b -> c, all three completed and
/// checkpointed) resumed against a work dir that starts out empty, as if
/// the resume were happening on a fresh checkout. Hashing `c` requires
/// `b`'s output on disk, which in turn requires `a`'s — neither is there
/// until the resume planner restores it. If restoration ran as a pass
/// separate from (and after) plan-building, this would see missing-input
/// errors while hashing and silently fall back to executing everything.
#[tokio::test]
async fn resume_restores_a_multi_hop_reuse_chain_into_a_fresh_work_dir() {
    common::init_tracing();
    let ws = Workspace::new();
    let graph = GraphBuilder::new()
        .task(TaskSpec::new("a", "echo a > a.out").output("a.out"))
        .task(TaskSpec::new("b", "echo b > b.out").input("a.out").output("b.out").after("a"))
        .task(TaskSpec::new("c", "echo c > c.out").input("b.out").output("c.out").after("b"))
        .to_document_bytes();
    ws.write_graph(&graph);

    let first = taskgraph::run_clean(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        1,
    )
    .await
    .expect("all three nodes should succeed");
    assert!(!first.result.has_failure());

    // Wipe the work dir clean, as if resuming against a fresh checkout with
    // nothing left over from the previous run; cache and recovery state
    // (checkpoints, cache entries) persist independently of the work dir.
    std::fs::remove_dir_all(ws.work_dir()).unwrap();
    std::fs::create_dir_all(ws.work_dir()).unwrap();

    let resumed = taskgraph::resume_run(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        first.run_record.run_id.as_str(),
        1,
        false,
    )
    .await
    .expect("resume into a fresh work dir should be accepted");

    assert!(!resumed.result.has_failure());
    assert_eq!(resumed.result.final_state["a"], NodeState::Cached);
    assert_eq!(resumed.result.final_state["b"], NodeState::Cached);
    assert_eq!(resumed.result.final_state["c"], NodeState::Cached);
    assert!(ws.work_file_exists("a.out"));
    assert!(ws.work_file_exists("b.out"));
    assert!(ws.work_file_exists("c.out"));
}

#[tokio::test]
async fn resume_rejects_a_graph_hash_mismatch() {
    common::init_tracing();
    let ws = Workspace::new();
    ws.write_graph(&graph_with_a_succeeding_and_b_failing());

    let first = taskgraph::run_clean(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        1,
    )
    .await
    .expect("run_clean itself should not error even though task b fails");

    // Changing the graph (here: b's command) changes the graph hash, so
    // resuming against the previous run's checkpoints must be rejected
    // outright rather than silently reusing stale state.
    let changed = GraphBuilder::new()
        .task(TaskSpec::new("a", "echo keep > a.out").output("a.out"))
        .task(TaskSpec::new("b", "true").input("a.out").after("a"))
        .to_document_bytes();
    ws.write_graph(&changed);

    let err = taskgraph::resume_run(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        first.run_record.run_id.as_str(),
        1,
        false,
    )
    .await
    .expect_err("graph hash mismatch must be rejected");
    assert_eq!(err.kind(), taskgraph::errors::ErrorKind::Structural);
}

/// The `--failed-only` flag doesn't narrow planning (cache presence is
/// always consulted regardless of prior per-node status), but it must still
/// be recorded faithfully on the resulting run record.
#[tokio::test]
async fn resume_records_the_failed_only_mode_distinctly_from_plain_resume() {
    common::init_tracing();
    let ws = Workspace::new();
    ws.write_graph(&graph_with_a_succeeding_and_b_failing());

    let first = taskgraph::run_clean(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        1,
    )
    .await
    .expect("run_clean itself should not error even though task b fails");

    let plain = taskgraph::resume_run(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        first.run_record.run_id.as_str(),
        1,
        false,
    )
    .await
    .expect("plain resume should be accepted");
    assert_eq!(plain.run_record.mode, RunMode::Resume);

    let failed_only = taskgraph::resume_run(
        &ws.graph_path(),
        &ws.work_dir(),
        &ws.cache_dir(),
        &ws.recovery_dir(),
        plain.run_record.run_id.as_str(),
        1,
        true,
    )
    .await
    .expect("failed-only resume should be accepted");
    assert_eq!(failed_only.run_record.mode, RunMode::ResumeFailedOnly);
}
