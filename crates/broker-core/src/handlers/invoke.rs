//! InvokeExpression tool handler.

use std::collections::HashMap;

use crate::discovery::{collect_all_cached_outputs, find_ready_pipe, PipeDiscoveryResult};
use crate::launch::ConsoleLauncher;
use crate::peer_client::{self, InvokeExpressionRequest, PeerStatusKind};
use crate::pipe_name::PipeName;
use crate::response::ResponseBuilder;
use crate::session::SessionManager;

use super::start_console::{catchy_name, start_console_internal};

const DEFAULT_TIMEOUT_SECONDS: u32 = 170;
const MIN_TIMEOUT_SECONDS: u32 = 1;
const MAX_TIMEOUT_SECONDS: u32 = 170;

/// Reserved/automatic names the SCOPE WARNING never flags; extend this
/// list as more automatic variables come up in practice.
const RESERVED_NAMES: &[&str] = &["null", "true", "false", "_", "matches", "psitem", "args", "input", "this"];
const SCOPE_PREFIXES: &[&str] = &["script:", "global:", "env:", "local:", "private:"];

pub struct InvokeExpressionArgs<'a> {
    pub pipeline: &'a str,
    pub timeout_seconds: Option<u32>,
    pub env: Option<&'a HashMap<String, String>>,
}

fn clamp_timeout(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_TIMEOUT_SECONDS).clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS)
}

/// Best-effort scan for `$name = …` assignments lacking an explicit scope
/// prefix. This is a heuristic lexical scan, not a PowerShell parser: it
/// is advisory only and never blocks execution.
fn scope_warning_for(pipeline: &str) -> Option<String> {
    let chars: Vec<char> = pipeline.chars().collect();
    let mut offenders: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut j = start;
        while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == ':') {
            j += 1;
        }
        let token: String = chars[start..j].iter().collect();
        i = j;

        let mut k = i;
        while k < chars.len() && chars[k].is_whitespace() {
            k += 1;
        }

        let is_assignment = k < chars.len()
            && chars[k] == '='
            && chars.get(k + 1) != Some(&'=')
            && !matches!(chars.get(k.wrapping_sub(1)), Some('<') | Some('>') | Some('!') | Some('+') | Some('-') | Some('*') | Some('/') | Some('%'));

        if is_assignment && !token.is_empty() {
            let lower = token.to_lowercase();
            let has_scope_prefix = SCOPE_PREFIXES.iter().any(|p| lower.starts_with(p));
            let bare_name = token.rsplit(':').next().unwrap_or(&token);
            let is_reserved = RESERVED_NAMES.contains(&bare_name.to_lowercase().as_str());

            if !has_scope_prefix && !is_reserved && !offenders.iter().any(|o| o == bare_name) {
                offenders.push(bare_name.to_owned());
            }
        }
    }

    if offenders.is_empty() {
        return None;
    }

    let vars = offenders.iter().map(|o| format!("${o}")).collect::<Vec<_>>().join(", ");
    Some(format!(
        "SCOPE WARNING: assignment(s) to {vars} will not persist across future invocations in this \
         non-interactive session unless prefixed with $script: or $global: (e.g. $script:{}).",
        offenders[0]
    ))
}

pub async fn invoke_expression(
    session: &SessionManager,
    launcher: &dyn ConsoleLauncher,
    agent_id: &str,
    args: InvokeExpressionArgs<'_>,
) -> String {
    let scope_warning = scope_warning_for(args.pipeline);
    let timeout_seconds = clamp_timeout(args.timeout_seconds);

    let discovery = find_ready_pipe(session, agent_id).await;

    let Some(pipe) = discovery.ready_pipe_name.clone() else {
        return no_pipe_available(session, launcher, agent_id, discovery, scope_warning).await;
    };

    if discovery.console_switched {
        return console_switched(session, agent_id, &pipe, discovery, scope_warning).await;
    }

    let path = session.pipe_path(&pipe);
    let response = match peer_client::invoke_expression(
        &path,
        InvokeExpressionRequest {
            pipeline: args.pipeline,
            timeout_seconds,
            env: args.env,
        },
    )
    .await
    {
        Ok(resp) => resp,
        Err(e) => {
            session.clear_dead_pipe(agent_id, &pipe);
            return ResponseBuilder::new()
                .scope_warning(scope_warning.unwrap_or_default())
                .closed_console_messages(discovery.closed_console_messages)
                .primary(format!("Console became unreachable mid-request: {e}"))
                .build();
        }
    };

    let history_note = (args.pipeline.contains('\n') || args.pipeline.contains('\r'))
        .then(|| "HISTORY NOTE: multi-line pipelines may not appear in the shell's interactive history.".to_owned());

    match response.status.status {
        PeerStatusKind::Success => {
            let cached = collect_all_cached_outputs(session, agent_id, Some(&pipe)).await;
            ResponseBuilder::new()
                .scope_warning(scope_warning.unwrap_or_default())
                .busy_lines(cached.busy_status_info)
                .cached_outputs(cached.completed_output)
                .primary(response.body)
                .hint(history_note.unwrap_or_default())
                .build()
        }
        PeerStatusKind::Completed => ResponseBuilder::new()
            .scope_warning(scope_warning.unwrap_or_default())
            .primary(response.body)
            .hint("Result cached — use wait_for_completion or re-invoke to retrieve.")
            .build(),
        PeerStatusKind::Timeout => {
            session.mark_pipe_busy(agent_id, response.status.pid);
            ResponseBuilder::new()
                .scope_warning(scope_warning.unwrap_or_default())
                .primary("Pipeline is still running. Call wait_for_completion to retrieve its result.".to_owned())
                .build()
        }
        PeerStatusKind::Busy => {
            session.mark_pipe_busy(agent_id, response.status.pid);
            let line = response
                .status
                .status_line
                .unwrap_or_else(|| format!("Console PID {} is busy", response.status.pid));
            ResponseBuilder::new()
                .scope_warning(scope_warning.unwrap_or_default())
                .primary(line)
                .build()
        }
        PeerStatusKind::Standby => ResponseBuilder::new()
            .scope_warning(scope_warning.unwrap_or_default())
            .primary(response.body)
            .build(),
    }
}

async fn no_pipe_available(
    session: &SessionManager,
    launcher: &dyn ConsoleLauncher,
    agent_id: &str,
    discovery: PipeDiscoveryResult,
    scope_warning: Option<String>,
) -> String {
    match start_console_internal(session, launcher, agent_id).await {
        Ok(started) => {
            let cached = collect_all_cached_outputs(session, agent_id, Some(&started.pipe_name)).await;
            ResponseBuilder::new()
                .scope_warning(scope_warning.unwrap_or_default())
                .closed_console_messages(discovery.closed_console_messages)
                .busy_lines(cached.busy_status_info)
                .cached_outputs(cached.completed_output)
                .primary(format!(
                    "Console started. Location: {}. Pipeline NOT executed — verify location and re-execute.",
                    started.location_body
                ))
                .build()
        }
        Err(e) => ResponseBuilder::new()
            .scope_warning(scope_warning.unwrap_or_default())
            .closed_console_messages(discovery.closed_console_messages)
            .primary(e.to_string())
            .build(),
    }
}

async fn console_switched(
    session: &SessionManager,
    agent_id: &str,
    pipe: &PipeName,
    discovery: PipeDiscoveryResult,
    scope_warning: Option<String>,
) -> String {
    let path = session.pipe_path(pipe);
    let location_body = peer_client::get_current_location(&path)
        .await
        .unwrap_or_else(|e| format!("(failed to read location: {e})"));

    if let Some(peer_pid) = pipe.peer_pid() {
        let title = format!("#{peer_pid} {}", catchy_name(peer_pid));
        let _ = peer_client::set_window_title(&path, &title).await;
    }

    let cached = collect_all_cached_outputs(session, agent_id, Some(pipe)).await;

    ResponseBuilder::new()
        .scope_warning(scope_warning.unwrap_or_default())
        .closed_console_messages(discovery.closed_console_messages)
        .busy_lines(cached.busy_status_info)
        .cached_outputs(cached.completed_output)
        .primary(format!(
            "Switched to console. Location: {location_body}. Pipeline NOT executed; verify location and re-execute."
        ))
        .build()
}
