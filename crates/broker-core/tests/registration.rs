//! The registration server accepts a new peer only when no existing pipe
//! in the fleet is currently standby or completed.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use broker_core::pipe_name::PipeName;
use broker_core::session::SessionManager;
use broker_core::transport::{dial, CONTROL_MESSAGE_CAP};
use broker_core::RegistrationServerTask;
use broker_task::ShutdownHandle;
use common::{spawn_fake_peer, status_response};

async fn register(registration_path: &str, pid: u32) -> Vec<u8> {
    let mut conn = dial(registration_path).await.expect("dial registration pipe");
    conn.write_frame(format!("REGISTER:{pid}").as_bytes()).await.unwrap();
    conn.read_frame(Some(CONTROL_MESSAGE_CAP)).await.unwrap()
}

#[tokio::test]
async fn accepts_registration_when_fleet_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let session = Arc::new(SessionManager::with_socket_dir(1, dir.path().to_path_buf()));
    let registration_path = session.pipe_path(&PipeName::Registration);

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    let task = broker_task::spawn_task(RegistrationServerTask::new(Arc::clone(&session)), shutdown_signal);

    // Give the server a moment to bind before dialing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = register(&registration_path, 999).await;
    assert_eq!(reply, b"OK");

    shutdown_handle.signal();
    task.join().await.unwrap().unwrap();
}

#[tokio::test]
async fn rejects_registration_when_a_standby_pipe_already_exists() {
    let dir = tempfile::tempdir().unwrap();
    let session = Arc::new(SessionManager::with_socket_dir(7, dir.path().to_path_buf()));
    let registration_path = session.pipe_path(&PipeName::Registration);

    let existing = PipeName::owned(7, "a1", 42);
    let _existing_peer = spawn_fake_peer(session.pipe_path(&existing), status_response(42, "standby"));

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    let task = broker_task::spawn_task(RegistrationServerTask::new(Arc::clone(&session)), shutdown_signal);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = register(&registration_path, 1000).await;
    assert_eq!(reply, b"REJECT");

    shutdown_handle.signal();
    task.join().await.unwrap().unwrap();
}

#[tokio::test]
async fn accepts_registration_when_existing_pipes_are_all_busy() {
    let dir = tempfile::tempdir().unwrap();
    let session = Arc::new(SessionManager::with_socket_dir(7, dir.path().to_path_buf()));
    let registration_path = session.pipe_path(&PipeName::Registration);

    let existing = PipeName::owned(7, "a1", 42);
    let _existing_peer = spawn_fake_peer(session.pipe_path(&existing), status_response(42, "busy"));

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
    let task = broker_task::spawn_task(RegistrationServerTask::new(Arc::clone(&session)), shutdown_signal);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = register(&registration_path, 1001).await;
    assert_eq!(reply, b"OK");

    shutdown_handle.signal();
    task.join().await.unwrap().unwrap();
}
