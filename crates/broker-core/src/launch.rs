//! Spawning a fresh peer console and waiting for it to come online.
//!
//! Spawning a console window is host-OS presentation logic this crate does
//! not own (a `cmd.exe`/terminal-emulator invocation lives above this
//! layer); [`ConsoleLauncher`] is the narrow seam the broker depends on,
//! isolating the one OS-specific `Command` invocation behind a small
//! async function.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::peer_client;
use crate::pipe_name::PipeName;
use crate::session::SessionManager;

/// Upper bound on waiting for a freshly launched peer to register and
/// become reachable under its claimed name.
pub const CONSOLE_STARTUP_TIMEOUT: Duration = Duration::from_secs(40);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reasons a console launch can fail, surfaced to the client as a
/// diagnostic rather than an internal error.
#[derive(Debug)]
pub enum LaunchError {
    /// The OS-level spawn call itself failed (no terminal emulator found,
    /// executable missing, permission denied).
    SpawnFailed(anyhow::Error),
    /// The process started but never registered and opened its pipe
    /// within [`CONSOLE_STARTUP_TIMEOUT`].
    TimedOut,
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::SpawnFailed(e) => write!(
                f,
                "failed to launch a new console: {e:#}. Likely causes: no terminal emulator available, \
                 the launcher invocation failed, or the peer module failed to initialize."
            ),
            LaunchError::TimedOut => write!(
                f,
                "launched a new console but it never became reachable within {:?}. \
                 The peer module may have failed to initialize or register.",
                CONSOLE_STARTUP_TIMEOUT
            ),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Spawns the peer host process in a new, visible console window.
#[async_trait]
pub trait ConsoleLauncher: Send + Sync {
    async fn spawn(&self) -> anyhow::Result<()>;
}

/// Launch a new peer console for `agent_id` and block until its owned pipe
/// is reachable.
///
/// Returns the newly owned [`PipeName`] once the peer has registered and
/// answers `get_status`. The peer PID embedded in that name is discovered
/// by diffing the owned-pipe enumeration before and after the spawn.
pub async fn launch_and_wait(
    session: &SessionManager,
    agent_id: &str,
    launcher: &dyn ConsoleLauncher,
) -> Result<PipeName, LaunchError> {
    let before: std::collections::HashSet<u32> = session
        .enumerate_pipes(agent_id)
        .await
        .iter()
        .filter_map(PipeName::peer_pid)
        .collect();

    launcher.spawn().await.map_err(LaunchError::SpawnFailed)?;

    let deadline = tokio::time::Instant::now() + CONSOLE_STARTUP_TIMEOUT;

    loop {
        let after = session.enumerate_pipes(agent_id).await;
        for candidate in &after {
            let Some(pid) = candidate.peer_pid() else { continue };
            if before.contains(&pid) {
                continue;
            }
            if peer_client::get_status(&session.pipe_path(candidate)).await.is_ok() {
                debug!(pipe = %candidate, "newly launched console is reachable");
                return Ok(candidate.clone());
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(LaunchError::TimedOut);
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
