//! Inbound registration endpoint for newly imported peers.
//!
//! Runs as a supervised [`broker_task::Task`] for the lifetime of the
//! broker: spawned once, handed a `ShutdownSignal`, and polled via
//! `tokio::select!` against that signal on every iteration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_task::{ShutdownSignal, Task};
use tracing::{debug, error, warn};

use crate::peer_client::{self, PeerStatusKind};
use crate::pipe_name::PipeName;
use crate::session::SessionManager;
use crate::transport::{Connection, Listener};

/// Registration exchange timeout.
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Hard cap on the inbound `REGISTER:<pid>` frame.
const REGISTER_FRAME_CAP: u32 = 1024;

pub struct RegistrationServerTask {
    session: Arc<SessionManager>,
}

impl RegistrationServerTask {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Task for RegistrationServerTask {
    type Output = anyhow::Result<()>;

    const NAME: &'static str = "registration server";

    async fn run(self, shutdown_signal: ShutdownSignal) -> Self::Output {
        run_registration_server(self.session, shutdown_signal).await
    }
}

async fn run_registration_server(session: Arc<SessionManager>, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
    let pipe_path = session.pipe_path(&PipeName::Registration);
    let listener = Listener::bind(&pipe_path)?;

    debug!(pipe = %pipe_path, "registration server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok(conn) => {
                        let session = Arc::clone(&session);
                        tokio::spawn(async move {
                            if let Err(error) = handle_registration(conn, &session).await {
                                warn!(error = %error, "registration exchange failed");
                            }
                        });
                    }
                    Err(error) => {
                        error!(%error, "registration listener accept failed");
                    }
                }
            }
            _ = shutdown_signal.wait() => {
                debug!("registration server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_registration(mut conn: Connection, session: &SessionManager) -> anyhow::Result<()> {
    let body = tokio::time::timeout(REGISTRATION_TIMEOUT, conn.read_frame(Some(REGISTER_FRAME_CAP))).await??;

    let text = String::from_utf8(body).map_err(|_| anyhow::anyhow!("invalid UTF-8 in registration frame"))?;
    let pid_str = text
        .strip_prefix("REGISTER:")
        .ok_or_else(|| anyhow::anyhow!("malformed registration message: {text:?}"))?;
    let pid: u32 = pid_str.parse().map_err(|_| anyhow::anyhow!("non-numeric PID: {pid_str:?}"))?;

    let accept = at_most_one_ready(session).await;

    let reply = if accept { b"OK".as_slice() } else { b"REJECT".as_slice() };
    tokio::time::timeout(REGISTRATION_TIMEOUT, conn.write_frame(reply)).await??;

    debug!(pid, accept, "registration decided");

    Ok(())
}

/// Accept only if, at the moment of decision, no other pipe for this broker
/// (any agent) currently reports non-busy: exactly one ready console may
/// exist at import time, to avoid ambiguity about which console a user's
/// subsequent shell commands bind to.
async fn at_most_one_ready(session: &SessionManager) -> bool {
    let mut candidates = session.enumerate_all_owned_pipes().await;
    candidates.extend(session.enumerate_unowned_pipes().await);

    for pipe in candidates {
        let path = session.pipe_path(&pipe);
        if let Ok(status) = peer_client::get_status(&path).await {
            if matches!(status.status, PeerStatusKind::Standby | PeerStatusKind::Completed) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_when_fleet_empty() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionManager::with_socket_dir(1234, dir.path().to_path_buf());
        assert!(at_most_one_ready(&session).await);
    }
}
