//! End-to-end coverage of the four MCP tool handlers through
//! `HandlerContext`, against a fake peer fleet — the level the
//! algorithm-only tests in `discovery.rs`/`registration.rs` don't reach.

#![cfg(unix)]

mod common;

use std::sync::Arc;

use broker_core::pipe_name::PipeName;
use broker_core::session::SessionManager;
use broker_core::{HandlerContext, InvokeExpressionArgs};
use common::{spawn_fake_peer, spawn_persistent_fake_peer, status_response, status_response_with_body, FakeLauncher};

// `find_ready_pipe`'s `get_status` probe only treats Standby/Completed as
// "ready"; a pipe that will actually be invoked against in these tests must
// answer that probe with "standby" before the real request (a second, or
// for `invoke_expression`/`consume_output`, a third round trip on the same
// pipe) carries the interesting status/body.

fn ctx_in(dir: &tempfile::TempDir, proxy_pid: u32) -> (Arc<SessionManager>, HandlerContext) {
    let session = Arc::new(SessionManager::with_socket_dir(proxy_pid, dir.path().to_path_buf()));
    let launcher = Arc::new(FakeLauncher {
        session: Arc::clone(&session),
        agent_id: "a1".to_owned(),
        peer_pid: 77,
        location_body: "C:\\Users\\test".to_owned(),
    });
    let ctx = HandlerContext::new(Arc::clone(&session), launcher);
    (session, ctx)
}

#[tokio::test]
async fn get_current_location_launches_a_console_when_fleet_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, ctx) = ctx_in(&dir, 1);

    let response = ctx.get_current_location(Some("a1")).await;

    assert!(response.contains("Console started successfully"));
    assert!(response.contains("C:\\Users\\test"));
}

#[tokio::test]
async fn get_current_location_reports_directly_from_a_standby_active_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let (session, ctx) = ctx_in(&dir, 1);

    let active = PipeName::owned(1, "a1", 10);
    session.set_active_pipe_name("a1", Some(active.clone()));
    // Two round trips: find_ready_pipe's get_status probe, then the actual
    // get_current_location call.
    let _peer = spawn_persistent_fake_peer(session.pipe_path(&active), status_response_with_body(10, "standby", "/home/test"));

    let response = ctx.get_current_location(Some("a1")).await;

    assert_eq!(response, "/home/test");
    assert!(!response.contains("Switched to console"));
}

#[tokio::test]
async fn get_current_location_announces_a_switch_when_claiming_an_unowned_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let (session, ctx) = ctx_in(&dir, 1);

    let unowned = PipeName::unowned(20);
    let claimed = PipeName::owned(1, "a1", 20);

    // claim_console is fire-and-forget: the unowned peer just needs to
    // accept and drop the claim frame.
    let _claim_peer = spawn_fake_peer(session.pipe_path(&unowned), Vec::new());
    // It then "reopens" under its claimed name, answering every subsequent
    // get_status/get_current_location/set_window_title call there.
    let _claimed_peer = spawn_persistent_fake_peer(
        session.pipe_path(&claimed),
        status_response_with_body(20, "standby", "/srv/app"),
    );

    let response = ctx.get_current_location(Some("a1")).await;

    assert!(response.contains("Switched to console"), "got: {response:?}");
    assert!(response.contains("/srv/app"), "got: {response:?}");
}

#[tokio::test]
async fn invoke_expression_starts_a_console_when_none_is_available() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, ctx) = ctx_in(&dir, 1);

    let response = ctx
        .invoke_expression(
            Some("a1"),
            InvokeExpressionArgs {
                pipeline: "Get-Location",
                timeout_seconds: None,
                env: None,
            },
        )
        .await;

    assert!(response.contains("Console started"));
    assert!(response.contains("NOT executed"));
}

#[tokio::test]
async fn invoke_expression_returns_success_output_from_a_ready_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let (session, ctx) = ctx_in(&dir, 1);

    let active = PipeName::owned(1, "a1", 10);
    session.set_active_pipe_name("a1", Some(active.clone()));
    // find_ready_pipe's get_status probe only treats Standby/Completed as
    // ready; the subsequent real invoke_expression call reads the same
    // canned body back through the Standby arm.
    let _peer = spawn_persistent_fake_peer(
        session.pipe_path(&active),
        status_response_with_body(10, "standby", "2 + 2 = 4"),
    );

    let response = ctx
        .invoke_expression(
            Some("a1"),
            InvokeExpressionArgs {
                pipeline: "2 + 2",
                timeout_seconds: None,
                env: None,
            },
        )
        .await;

    assert_eq!(response, "2 + 2 = 4");
}

#[tokio::test]
async fn invoke_expression_flags_an_unprefixed_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let (session, ctx) = ctx_in(&dir, 1);

    let active = PipeName::owned(1, "a1", 10);
    session.set_active_pipe_name("a1", Some(active.clone()));
    let _peer = spawn_persistent_fake_peer(session.pipe_path(&active), status_response_with_body(10, "standby", "5"));

    let response = ctx
        .invoke_expression(
            Some("a1"),
            InvokeExpressionArgs {
                pipeline: "$count = 5",
                timeout_seconds: None,
                env: None,
            },
        )
        .await;

    assert!(response.contains("SCOPE WARNING"));
    assert!(response.contains("$count"));
}

#[tokio::test]
async fn wait_for_completion_reports_nothing_on_empty_fleet() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, ctx) = ctx_in(&dir, 1);

    let response = ctx.wait_for_completion(Some("a1"), Some(1)).await;

    assert_eq!(response, "No commands to wait for completion.");
}

#[tokio::test]
async fn wait_for_completion_consumes_an_already_completed_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let (session, ctx) = ctx_in(&dir, 1);

    let pipe = PipeName::owned(1, "a1", 10);
    // get_status then consume_output: two sequential round trips.
    let path = session.pipe_path(&pipe);
    let listener = broker_core::transport::Listener::bind(&path).unwrap();
    let _task = tokio::spawn(async move {
        let mut conn = listener.accept().await.unwrap();
        let _ = conn.read_frame(None).await;
        conn.write_frame(&status_response(10, "completed")).await.unwrap();
        let mut conn2 = listener.accept().await.unwrap();
        let _ = conn2.read_frame(None).await;
        conn2
            .write_frame(&status_response_with_body(10, "completed", "done"))
            .await
            .unwrap();
    });

    let response = ctx.wait_for_completion(Some("a1"), Some(1)).await;

    assert_eq!(response, "done");
}

#[tokio::test]
async fn start_powershell_console_reports_a_fresh_console() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, ctx) = ctx_in(&dir, 1);

    let response = ctx.start_powershell_console(Some("a1")).await;

    assert!(response.contains("Console started successfully"));
    assert!(response.contains("C:\\Users\\test"));
}
