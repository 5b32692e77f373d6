//! GetCurrentLocation tool handler.

use crate::discovery::{collect_all_cached_outputs, find_ready_pipe, PipeDiscoveryResult};
use crate::launch::ConsoleLauncher;
use crate::peer_client;
use crate::response::ResponseBuilder;
use crate::session::SessionManager;

use super::start_console::{catchy_name, start_console_internal};

pub async fn get_current_location(session: &SessionManager, launcher: &dyn ConsoleLauncher, agent_id: &str) -> String {
    let discovery = find_ready_pipe(session, agent_id).await;

    let Some(pipe) = discovery.ready_pipe_name.clone() else {
        return start_console_and_report(session, launcher, agent_id, discovery).await;
    };

    let path = session.pipe_path(&pipe);
    let location_body = peer_client::get_current_location(&path)
        .await
        .unwrap_or_else(|e| format!("(failed to read location: {e})"));

    let cached = collect_all_cached_outputs(session, agent_id, Some(&pipe)).await;

    let primary = if discovery.console_switched {
        if let Some(peer_pid) = pipe.peer_pid() {
            let title = format!("#{peer_pid} {}", catchy_name(peer_pid));
            let _ = peer_client::set_window_title(&path, &title).await;
        }
        format!("Switched to console. Location: {location_body}")
    } else {
        location_body
    };

    ResponseBuilder::new()
        .closed_console_messages(discovery.closed_console_messages)
        .busy_lines(cached.busy_status_info)
        .cached_outputs(cached.completed_output)
        .primary(primary)
        .build()
}

async fn start_console_and_report(
    session: &SessionManager,
    launcher: &dyn ConsoleLauncher,
    agent_id: &str,
    discovery: PipeDiscoveryResult,
) -> String {
    match start_console_internal(session, launcher, agent_id).await {
        Ok(started) => ResponseBuilder::new()
            .closed_console_messages(discovery.closed_console_messages)
            .all_pipes_status(discovery.all_pipes_status_info.unwrap_or_default())
            .primary(format!("Console started successfully. Location: {}", started.location_body))
            .build(),
        Err(e) => ResponseBuilder::new()
            .closed_console_messages(discovery.closed_console_messages)
            .primary(e.to_string())
            .build(),
    }
}
