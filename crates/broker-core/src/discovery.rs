//! Pipe discovery & selection.
//!
//! `find_ready_pipe` is the heart of the broker: detect closures, probe the
//! active pipe, probe owned siblings, then claim an unowned pipe, in that
//! order, returning as soon as a ready pipe is found.

use std::time::Duration;

use tracing::{debug, warn};

use crate::peer_client::{self, PeerStatusKind};
use crate::pipe_name::PipeName;
use crate::session::SessionManager;

/// Result of [`find_ready_pipe`].
#[derive(Debug, Default)]
pub struct PipeDiscoveryResult {
    pub ready_pipe_name: Option<PipeName>,
    pub console_switched: bool,
    pub closed_console_messages: Vec<String>,
    pub all_pipes_status_info: Option<String>,
}

/// Result of [`collect_all_cached_outputs`].
#[derive(Debug, Default)]
pub struct CachedOutputResult {
    pub completed_output: String,
    pub busy_status_info: String,
}

fn closed_console_message(pid: u32) -> String {
    format!("Console PID {pid} was closed")
}

fn busy_line(pid: u32, reason: Option<&str>, status_line: Option<&str>) -> String {
    if let Some(line) = status_line {
        return line.to_owned();
    }
    match reason {
        Some(reason) => format!("Console PID {pid} is busy: {reason}"),
        None => format!("Console PID {pid} is busy"),
    }
}

/// Number of polls and the interval used while waiting for a claimed pipe
/// to reopen under its new, owned name.
const CLAIM_POLL_ATTEMPTS: u32 = 20;
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn find_ready_pipe(session: &SessionManager, agent_id: &str) -> PipeDiscoveryResult {
    let mut closed_messages = Vec::new();
    let mut busy_lines: Vec<String> = Vec::new();

    // Step 1: detect closures since the last call. Surviving PIDs are left
    // untracked until the probes below re-observe and re-mark them busy.
    let previously_busy = session.consume_known_busy_pids(agent_id);
    if !previously_busy.is_empty() {
        let live: std::collections::HashSet<u32> = session
            .enumerate_pipes(agent_id)
            .await
            .iter()
            .filter_map(PipeName::peer_pid)
            .collect();
        for pid in previously_busy {
            if !live.contains(&pid) {
                closed_messages.push(closed_console_message(pid));
            }
        }
    }

    // Step 2: probe the active pipe, if any.
    if let Some(active) = session.get_active_pipe_name(agent_id) {
        let path = session.pipe_path(&active);
        match peer_client::get_status(&path).await {
            Err(_) => {
                debug!(pipe = %active, "active pipe is dead");
                session.clear_dead_pipe(agent_id, &active);
                if let Some(pid) = active.peer_pid() {
                    closed_messages.push(closed_console_message(pid));
                }
            }
            Ok(status) if matches!(status.status, PeerStatusKind::Standby | PeerStatusKind::Completed) => {
                session.unmark_pipe_busy(agent_id, status.pid);
                return PipeDiscoveryResult {
                    ready_pipe_name: Some(active),
                    console_switched: false,
                    closed_console_messages: closed_messages,
                    all_pipes_status_info: None,
                };
            }
            Ok(status) => {
                session.mark_pipe_busy(agent_id, status.pid);
                busy_lines.push(busy_line(status.pid, status.reason.as_deref(), status.status_line.as_deref()));
            }
        }
    }

    // Step 3: probe owned siblings.
    let active_after_step2 = session.get_active_pipe_name(agent_id);
    for sibling in session.enumerate_pipes(agent_id).await {
        if Some(&sibling) == active_after_step2.as_ref() {
            continue;
        }

        let path = session.pipe_path(&sibling);
        match peer_client::get_status(&path).await {
            Err(_) => {
                session.clear_dead_pipe(agent_id, &sibling);
            }
            Ok(status) if matches!(status.status, PeerStatusKind::Standby | PeerStatusKind::Completed) => {
                session.set_active_pipe_name(agent_id, Some(sibling.clone()));
                session.unmark_pipe_busy(agent_id, status.pid);
                return PipeDiscoveryResult {
                    ready_pipe_name: Some(sibling),
                    console_switched: true,
                    closed_console_messages: closed_messages,
                    all_pipes_status_info: None,
                };
            }
            Ok(status) => {
                session.mark_pipe_busy(agent_id, status.pid);
                busy_lines.push(busy_line(status.pid, status.reason.as_deref(), status.status_line.as_deref()));
            }
        }
    }

    // Step 4: claim an unowned pipe.
    for unowned in session.enumerate_unowned_pipes().await {
        let path = session.pipe_path(&unowned);
        let status = match peer_client::get_status(&path).await {
            Ok(status) => status,
            Err(_) => continue,
        };

        if !matches!(status.status, PeerStatusKind::Standby | PeerStatusKind::Completed) {
            continue;
        }

        let Some(peer_pid) = unowned.peer_pid() else { continue };

        if peer_client::claim_console(&path, session.proxy_pid(), agent_id).await.is_err() {
            // Expected: the peer closes the pipe as part of the rename before replying.
            debug!(pipe = %unowned, "claim_console connection closed as expected");
        }

        let new_name = PipeName::owned(session.proxy_pid(), agent_id, peer_pid);
        let new_path = session.pipe_path(&new_name);

        for attempt in 0..CLAIM_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CLAIM_POLL_INTERVAL).await;
            }
            if peer_client::get_status(&new_path).await.is_ok() {
                session.set_active_pipe_name(agent_id, Some(new_name.clone()));
                return PipeDiscoveryResult {
                    ready_pipe_name: Some(new_name),
                    console_switched: true,
                    closed_console_messages: closed_messages,
                    all_pipes_status_info: None,
                };
            }
        }

        warn!(pipe = %new_name, "claimed console never became reachable");
    }

    // Step 5: nothing found.
    let all_pipes_status_info = if busy_lines.is_empty() {
        None
    } else {
        Some(busy_lines.join("\n"))
    };

    PipeDiscoveryResult {
        ready_pipe_name: None,
        console_switched: false,
        closed_console_messages: closed_messages,
        all_pipes_status_info,
    }
}

/// Visit every owned pipe except `exclude`, harvesting completed output and
/// busy-sibling status lines.
pub async fn collect_all_cached_outputs(
    session: &SessionManager,
    agent_id: &str,
    exclude: Option<&PipeName>,
) -> CachedOutputResult {
    let mut completed_output = String::new();
    let mut busy_lines = Vec::new();

    for pipe in session.enumerate_pipes(agent_id).await {
        if Some(&pipe) == exclude {
            continue;
        }

        let path = session.pipe_path(&pipe);
        let status = match peer_client::get_status(&path).await {
            Ok(status) => status,
            Err(_) => {
                session.clear_dead_pipe(agent_id, &pipe);
                continue;
            }
        };

        match status.status {
            PeerStatusKind::Completed => {
                let output = peer_client::consume_output(&path).await.unwrap_or_default();
                let rewritten = output.replace("| Status: Ready |", "| Status: Standby |");
                if !completed_output.is_empty() {
                    completed_output.push('\n');
                }
                completed_output.push_str(&rewritten);
                session.unmark_pipe_busy(agent_id, status.pid);
            }
            PeerStatusKind::Busy => {
                busy_lines.push(busy_line(status.pid, status.reason.as_deref(), status.status_line.as_deref()));
                session.mark_pipe_busy(agent_id, status.pid);
            }
            PeerStatusKind::Standby => {
                session.unmark_pipe_busy(agent_id, status.pid);
            }
            PeerStatusKind::Success | PeerStatusKind::Timeout => {
                // get_status never legitimately returns these; ignore defensively.
            }
        }
    }

    CachedOutputResult {
        completed_output,
        busy_status_info: busy_lines.join("\n"),
    }
}
