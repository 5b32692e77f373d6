//! Typed request/response wrappers over [`crate::transport`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SendError, TransportError};
use crate::transport::{self, CONTROL_MESSAGE_CAP};

/// Wire version sent as `proxy_version` on every outbound request.
pub const PROXY_VERSION: &str = "1.0.0.0";

/// Status reported by a peer in its response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatusKind {
    Standby,
    Busy,
    Completed,
    Success,
    Timeout,
}

/// Status header returned by a peer on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerStatus {
    pub pid: u32,
    pub status: PeerStatusKind,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub status_line: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A peer response: header plus free-form body text.
#[derive(Debug, Clone)]
pub struct PeerResponse {
    pub status: PeerStatus,
    pub body: String,
}

fn request_envelope(verb: &str, extra: serde_json::Value) -> Vec<u8> {
    let mut obj = serde_json::Map::new();
    obj.insert("proxy_version".to_owned(), serde_json::Value::String(PROXY_VERSION.to_owned()));
    obj.insert("name".to_owned(), serde_json::Value::String(verb.to_owned()));
    if let serde_json::Value::Object(extra_map) = extra {
        obj.extend(extra_map);
    }
    serde_json::to_vec(&serde_json::Value::Object(obj)).expect("request envelope always serializes")
}

/// Parse a peer response of the form `<jsonHeader>\n\n<body>`.
///
/// A non-JSON header is treated as opaque success with the entire raw
/// bytes as body (best-effort compatibility with peers that don't emit a
/// structured header).
fn parse_response(raw: &[u8]) -> PeerResponse {
    let raw = String::from_utf8_lossy(raw);

    if let Some((header, body)) = raw.split_once("\n\n") {
        if let Ok(status) = serde_json::from_str::<PeerStatus>(header) {
            return PeerResponse {
                status,
                body: body.to_owned(),
            };
        }
    }

    PeerResponse {
        status: PeerStatus {
            pid: 0,
            status: PeerStatusKind::Success,
            pipeline: None,
            duration: 0.0,
            reason: None,
            status_line: None,
            output: None,
        },
        body: raw.into_owned(),
    }
}

async fn call(pipe_path: &str, verb: &str, extra: serde_json::Value) -> Result<PeerResponse, TransportError> {
    let payload = request_envelope(verb, extra);
    let raw = transport::exchange(pipe_path, &payload, None).await?;
    Ok(parse_response(&raw))
}

/// `get_status` — header only, null body.
pub async fn get_status(pipe_path: &str) -> Result<PeerStatus, TransportError> {
    let payload = request_envelope("get_status", serde_json::Value::Object(Default::default()));
    let raw = transport::exchange(pipe_path, &payload, Some(CONTROL_MESSAGE_CAP)).await?;
    Ok(parse_response(&raw).status)
}

/// `get_current_location` — body is a human-readable location listing.
pub async fn get_current_location(pipe_path: &str) -> Result<String, TransportError> {
    let resp = call(pipe_path, "get_current_location", serde_json::Value::Object(Default::default())).await?;
    Ok(resp.body)
}

/// `consume_output` — body is the cached completed output; the peer clears
/// its cache as a side effect, so a second call for the same completion
/// returns an empty body.
pub async fn consume_output(pipe_path: &str) -> Result<String, TransportError> {
    let resp = call(pipe_path, "consume_output", serde_json::Value::Object(Default::default())).await?;
    Ok(resp.body)
}

/// `invoke_expression` request parameters.
#[derive(Debug, Clone)]
pub struct InvokeExpressionRequest<'a> {
    pub pipeline: &'a str,
    pub timeout_seconds: u32,
    pub env: Option<&'a HashMap<String, String>>,
}

/// `invoke_expression` — status ∈ {success, timeout, completed, busy}.
pub async fn invoke_expression(pipe_path: &str, req: InvokeExpressionRequest<'_>) -> Result<PeerResponse, TransportError> {
    let mut extra = serde_json::Map::new();
    extra.insert("pipeline".to_owned(), serde_json::Value::String(req.pipeline.to_owned()));
    extra.insert(
        "timeout_seconds".to_owned(),
        serde_json::Value::Number(req.timeout_seconds.into()),
    );
    if let Some(env) = req.env {
        extra.insert(
            "env".to_owned(),
            serde_json::to_value(env).expect("string map always serializes"),
        );
    }
    call(pipe_path, "invoke_expression", serde_json::Value::Object(extra)).await
}

/// `claim_console` — fire-and-forget: the peer closes the pipe as part of
/// renaming it, so a response may never arrive. The caller should ignore
/// the outcome and instead poll the expected new pipe name.
pub async fn claim_console(pipe_path: &str, proxy_pid: u32, agent_id: &str) -> Result<(), SendError> {
    let mut extra = serde_json::Map::new();
    extra.insert("proxy_pid".to_owned(), serde_json::Value::Number(proxy_pid.into()));
    extra.insert("agent_id".to_owned(), serde_json::Value::String(agent_id.to_owned()));
    let payload = request_envelope("claim_console", serde_json::Value::Object(extra));

    match transport::dial(pipe_path).await {
        Ok(mut conn) => match conn.write_frame(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// `set_window_title` — best-effort; failures are intentionally swallowed
/// by callers.
pub async fn set_window_title(pipe_path: &str, title: &str) -> Result<(), TransportError> {
    let mut extra = serde_json::Map::new();
    extra.insert("title".to_owned(), serde_json::Value::String(title.to_owned()));
    call(pipe_path, "set_window_title", serde_json::Value::Object(extra)).await?;
    Ok(())
}
