//! WaitForCompletion tool handler.

use std::collections::HashSet;
use std::time::Duration;

use crate::discovery::collect_all_cached_outputs;
use crate::peer_client::{self, PeerStatusKind};
use crate::pipe_name::PipeName;
use crate::response::ResponseBuilder;
use crate::session::SessionManager;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT_SECONDS: u32 = 30;
const MIN_TIMEOUT_SECONDS: u32 = 1;
const MAX_TIMEOUT_SECONDS: u32 = 170;

fn clamp_timeout(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_TIMEOUT_SECONDS).clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS)
}

pub async fn wait_for_completion(session: &SessionManager, agent_id: &str, timeout_seconds: Option<u32>) -> String {
    let timeout = Duration::from_secs(u64::from(clamp_timeout(timeout_seconds)));

    let mut polling: HashSet<PipeName> = HashSet::new();

    for pipe in session.enumerate_pipes(agent_id).await {
        let path = session.pipe_path(&pipe);
        let status = match peer_client::get_status(&path).await {
            Ok(s) => s,
            Err(_) => {
                session.clear_dead_pipe(agent_id, &pipe);
                continue;
            }
        };

        match status.status {
            PeerStatusKind::Completed => return consume_and_report(session, agent_id, &pipe, status.pid).await,
            PeerStatusKind::Busy => {
                session.mark_pipe_busy(agent_id, status.pid);
                polling.insert(pipe);
            }
            _ => {}
        }
    }

    if polling.is_empty() {
        return "No commands to wait for completion.".to_owned();
    }

    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;

        let mut still_polling = HashSet::new();
        for pipe in polling {
            let path = session.pipe_path(&pipe);
            match peer_client::get_status(&path).await {
                Ok(status) if matches!(status.status, PeerStatusKind::Completed) => {
                    return consume_and_report(session, agent_id, &pipe, status.pid).await;
                }
                Ok(status) if matches!(status.status, PeerStatusKind::Standby) => {
                    session.unmark_pipe_busy(agent_id, status.pid);
                }
                Ok(_) => {
                    still_polling.insert(pipe);
                }
                Err(_) => {
                    session.clear_dead_pipe(agent_id, &pipe);
                }
            }
        }
        polling = still_polling;

        if polling.is_empty() {
            return "No commands to wait for completion.".to_owned();
        }
    }

    let aggregate = collect_all_cached_outputs(session, agent_id, None).await;
    ResponseBuilder::new()
        .busy_lines(aggregate.busy_status_info)
        .cached_outputs(aggregate.completed_output)
        .primary("Timed out waiting for completion.".to_owned())
        .build()
}

async fn consume_and_report(session: &SessionManager, agent_id: &str, pipe: &PipeName, peer_pid: u32) -> String {
    let path = session.pipe_path(pipe);
    let output = peer_client::consume_output(&path).await.unwrap_or_default();
    session.unmark_pipe_busy(agent_id, peer_pid);

    let siblings = collect_all_cached_outputs(session, agent_id, Some(pipe)).await;
    ResponseBuilder::new()
        .busy_lines(siblings.busy_status_info)
        .primary(output)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_nothing_to_wait_for_on_empty_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionManager::with_socket_dir(1, dir.path().to_path_buf());
        let result = wait_for_completion(&session, "a1", Some(1)).await;
        assert_eq!(result, "No commands to wait for completion.");
    }
}
