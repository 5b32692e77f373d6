//! Shared fake-peer helpers for integration tests.
//!
//! A "fake peer" is a one-shot [`broker_core::transport::Listener`] that
//! accepts a single connection, ignores the request frame, and replies with
//! a canned header+body response, mimicking a real peer console closely
//! enough to exercise discovery and registration without spawning a shell.

use std::sync::Arc;

use async_trait::async_trait;
use broker_core::launch::ConsoleLauncher;
use broker_core::pipe_name::PipeName;
use broker_core::session::SessionManager;
use broker_core::transport::Listener;

/// Spawn a fake peer at `pipe_path` that answers its first connection with
/// `response` and then exits. Binds before returning so callers can dial
/// immediately without a race.
pub fn spawn_fake_peer(pipe_path: String, response: Vec<u8>) -> tokio::task::JoinHandle<()> {
    let listener = Listener::bind(&pipe_path).expect("bind fake peer");
    tokio::spawn(async move {
        if let Ok(mut conn) = listener.accept().await {
            let _ = conn.read_frame(None).await;
            let _ = conn.write_frame(&response).await;
        }
    })
}

/// Spawn a fake peer at `pipe_path` that answers every connection it
/// accepts with the same canned `response`, for handlers that make several
/// round trips to the same pipe (e.g. launch-then-title-then-location).
/// Binds before returning so callers can dial immediately without a race.
pub fn spawn_persistent_fake_peer(pipe_path: String, response: Vec<u8>) -> tokio::task::JoinHandle<()> {
    let listener = Listener::bind(&pipe_path).expect("bind persistent fake peer");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok(mut conn) => {
                    let _ = conn.read_frame(None).await;
                    if conn.write_frame(&response).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

/// Build a `get_status`-shaped response: a JSON header with no body.
pub fn status_response(pid: u32, status: &str) -> Vec<u8> {
    format!("{{\"pid\":{pid},\"status\":\"{status}\"}}\n\n").into_bytes()
}

/// Build a response with a body, e.g. for `consume_output`.
pub fn status_response_with_body(pid: u32, status: &str, body: &str) -> Vec<u8> {
    format!("{{\"pid\":{pid},\"status\":\"{status}\"}}\n\n{body}").into_bytes()
}

/// A [`ConsoleLauncher`] whose `spawn` brings a fresh peer pipe online by
/// binding a persistent fake peer under the owned name the broker expects
/// to find it at, mimicking a real peer registering after its window opens.
pub struct FakeLauncher {
    pub session: Arc<SessionManager>,
    pub agent_id: String,
    pub peer_pid: u32,
    pub location_body: String,
}

#[async_trait]
impl ConsoleLauncher for FakeLauncher {
    async fn spawn(&self) -> anyhow::Result<()> {
        let pipe = PipeName::owned(self.session.proxy_pid(), &self.agent_id, self.peer_pid);
        let path = self.session.pipe_path(&pipe);
        spawn_persistent_fake_peer(path, status_response_with_body(self.peer_pid, "standby", &self.location_body));
        Ok(())
    }
}
