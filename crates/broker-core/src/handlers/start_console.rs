//! StartPowerShellConsole tool handler, plus the shared "launch a fresh
//! console and report it" routine the other three handlers fall back to
//! when no ready pipe is found.

use crate::discovery::collect_all_cached_outputs;
use crate::launch::{self, ConsoleLauncher, LaunchError};
use crate::peer_client::{self, PeerStatusKind};
use crate::pipe_name::PipeName;
use crate::response::ResponseBuilder;
use crate::session::SessionManager;

const CATCHY_NAMES: &[&str] = &[
    "Aurora", "Borealis", "Cascade", "Delta", "Ember", "Falcon", "Granite", "Harbor", "Indigo", "Juniper", "Kestrel",
    "Lumen", "Meridian", "Nimbus", "Onyx", "Prairie", "Quartz", "Ridge", "Summit", "Tundra",
];

pub(crate) fn catchy_name(peer_pid: u32) -> &'static str {
    CATCHY_NAMES[(peer_pid as usize) % CATCHY_NAMES.len()]
}

pub(crate) struct StartedConsole {
    pub pipe_name: PipeName,
    pub location_body: String,
}

/// Launch a peer, claim its pipe, title its window, and make it active.
pub(crate) async fn start_console_internal(
    session: &SessionManager,
    launcher: &dyn ConsoleLauncher,
    agent_id: &str,
) -> Result<StartedConsole, LaunchError> {
    // Existing work must not be forgotten once a new console takes over as active.
    for pipe in session.enumerate_pipes(agent_id).await {
        let path = session.pipe_path(&pipe);
        if let Ok(status) = peer_client::get_status(&path).await {
            if matches!(status.status, PeerStatusKind::Busy) {
                session.mark_pipe_busy(agent_id, status.pid);
            }
        }
    }

    let pipe_name = launch::launch_and_wait(session, agent_id, launcher).await?;

    if let Some(peer_pid) = pipe_name.peer_pid() {
        let title = format!("#{peer_pid} {}", catchy_name(peer_pid));
        let _ = peer_client::set_window_title(&session.pipe_path(&pipe_name), &title).await;
    }

    session.set_active_pipe_name(agent_id, Some(pipe_name.clone()));

    let location_body = peer_client::get_current_location(&session.pipe_path(&pipe_name))
        .await
        .unwrap_or_else(|e| format!("(failed to read location: {e})"));

    Ok(StartedConsole { pipe_name, location_body })
}

pub async fn start_powershell_console(session: &SessionManager, launcher: &dyn ConsoleLauncher, agent_id: &str) -> String {
    match start_console_internal(session, launcher, agent_id).await {
        Ok(started) => {
            let cached = collect_all_cached_outputs(session, agent_id, Some(&started.pipe_name)).await;
            ResponseBuilder::new()
                .busy_lines(cached.busy_status_info)
                .cached_outputs(cached.completed_output)
                .primary(format!("Console started successfully. Location: {}", started.location_body))
                .build()
        }
        Err(e) => e.to_string(),
    }
}
