// Console Session Broker — MCP stdio server (no-argh edition).
//
// Reads newline-delimited JSON-RPC 2.0 requests from stdin, dispatches each
// to an independent task, and writes responses to stdout through a single
// serialized writer. Everything that isn't plain JSON-RPC framing or the
// console launcher lives in `broker-core`.

use std::env;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use broker_core::{ConsoleLauncher, HandlerContext, InvokeExpressionArgs, SessionManager, ToolKind};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, warn};

const USAGE: &str = "Usage: console-session-broker [-c CMD] [-l FILTER] [-f FILE] [-h]
  -c, --peer-command CMD  command line used to launch a new peer console
  -l, --log-filter FILTER tracing env-filter directives (default: info)
  -f, --log-file FILE     also write logs to this file
  -h, --help              show this help";

const DEFAULT_PEER_COMMAND: &str = "pwsh";

#[derive(Debug, Default)]
struct Args {
    peer_command: Option<String>,
    log_filter: Option<String>,
    log_file: Option<Utf8PathBuf>,
    show_usage: bool,
}

fn parse_cli() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = env::args().skip(1);

    while let Some(flag) = it.next() {
        match flag.as_str() {
            "-c" | "--peer-command" => {
                args.peer_command = Some(it.next().context("missing value for --peer-command")?);
            }
            "-l" | "--log-filter" => {
                args.log_filter = Some(it.next().context("missing value for --log-filter")?);
            }
            "-f" | "--log-file" => {
                let raw = it.next().context("missing value for --log-file")?;
                args.log_file = Some(Utf8PathBuf::from(raw));
            }
            "-h" | "--help" => args.show_usage = true,
            other => anyhow::bail!("unexpected argument: {other}\n{USAGE}"),
        }
    }

    Ok(args)
}

/// Spawns the peer host in a new, visible console window.
///
/// Which executable to spawn is implementation-defined — platform-specific
/// console-window spawning is out of scope for the broker core itself;
/// this binary defaults to `pwsh` and lets `--peer-command` override it
/// end to end.
struct ProcessConsoleLauncher {
    command: String,
}

#[async_trait]
impl ConsoleLauncher for ProcessConsoleLauncher {
    async fn spawn(&self) -> anyhow::Result<()> {
        spawn_detached_console(&self.command)
    }
}

#[cfg(unix)]
fn spawn_detached_console(command: &str) -> anyhow::Result<()> {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .spawn()
        .with_context(|| format!("failed to spawn peer console via `sh -c {command}`"))?;
    Ok(())
}

#[cfg(windows)]
fn spawn_detached_console(command: &str) -> anyhow::Result<()> {
    use std::os::windows::process::CommandExt as _;
    use windows_sys::Win32::System::Threading::CREATE_NEW_CONSOLE;

    std::process::Command::new("cmd")
        .arg("/C")
        .arg(command)
        .creation_flags(CREATE_NEW_CONSOLE)
        .spawn()
        .with_context(|| format!("failed to spawn peer console via `cmd /C {command}`"))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
struct JsonRpcErrorBody {
    code: i32,
    message: String,
}

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INTERNAL_ERROR: i32 = -32603;

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

fn tool_catalogue() -> Value {
    json!([
        {
            "name": "get_current_location",
            "description": "Get the current working directory of the active (or a newly started) shell console.",
            "inputSchema": {
                "type": "object",
                "properties": { "agent_id": { "type": "string" } },
            },
        },
        {
            "name": "invoke_expression",
            "description": "Run a PowerShell pipeline in the active console, waiting up to timeout_seconds for it to finish.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "pipeline": { "type": "string" },
                    "timeout_seconds": { "type": "integer", "minimum": 1, "maximum": 170 },
                    "agent_id": { "type": "string" },
                    "env": { "type": "object", "additionalProperties": { "type": "string" } },
                },
                "required": ["pipeline"],
            },
        },
        {
            "name": "wait_for_completion",
            "description": "Wait for a previously timed-out invocation to finish and retrieve its output.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "timeout_seconds": { "type": "integer", "minimum": 1, "maximum": 170 },
                    "agent_id": { "type": "string" },
                },
            },
        },
        {
            "name": "start_powershell_console",
            "description": "Start a new PowerShell console and make it the active console for this agent.",
            "inputSchema": {
                "type": "object",
                "properties": { "agent_id": { "type": "string" } },
            },
        },
    ])
}

fn text_result(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

async fn dispatch_tool_call(ctx: &HandlerContext, params: &Value) -> Result<Value, (i32, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| (INTERNAL_ERROR, "tools/call missing `name`".to_owned()))?;

    let Some(kind) = ToolKind::from_method_name(name) else {
        return Ok(text_result(format!("Unknown tool: {name}")));
    };

    let empty = Value::Object(Default::default());
    let arguments = params.get("arguments").unwrap_or(&empty);
    let agent_id = arguments.get("agent_id").and_then(Value::as_str);

    let output = match kind {
        ToolKind::GetCurrentLocation => ctx.get_current_location(agent_id).await,
        ToolKind::InvokeExpression => {
            let pipeline = arguments
                .get("pipeline")
                .and_then(Value::as_str)
                .ok_or_else(|| (INTERNAL_ERROR, "invoke_expression missing `pipeline`".to_owned()))?;
            let timeout_seconds = arguments.get("timeout_seconds").and_then(Value::as_u64).map(|v| v as u32);
            let env = arguments.get("env").and_then(|v| serde_json::from_value(v.clone()).ok());
            ctx.invoke_expression(
                agent_id,
                InvokeExpressionArgs {
                    pipeline,
                    timeout_seconds,
                    env: env.as_ref(),
                },
            )
            .await
        }
        ToolKind::WaitForCompletion => {
            let timeout_seconds = arguments.get("timeout_seconds").and_then(Value::as_u64).map(|v| v as u32);
            ctx.wait_for_completion(agent_id, timeout_seconds).await
        }
        ToolKind::StartPowershellConsole => ctx.start_powershell_console(agent_id).await,
    };

    Ok(text_result(output))
}

async fn handle_request(ctx: Arc<HandlerContext>, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id?;

    let result = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {}, "prompts": {} },
            "serverInfo": { "name": "console-session-broker", "version": env!("CARGO_PKG_VERSION") },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_catalogue() })),
        "tools/call" => dispatch_tool_call(&ctx, &request.params).await,
        "prompts/list" => Ok(json!({ "prompts": [] })),
        "prompts/get" => Err((INTERNAL_ERROR, "no prompts are registered".to_owned())),
        other => Err((METHOD_NOT_FOUND, format!("method not found: {other}"))),
    };

    Some(match result {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err((code, message)) => JsonRpcResponse::err(id, code, message),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_cli().context("failed to parse CLI")?;

    if args.show_usage {
        println!("{USAGE}");
        return Ok(());
    }

    let log_filter = args.log_filter.as_deref().unwrap_or("info");
    let _log_guard = broker_log::init(log_filter, args.log_file.as_deref()).context("failed to initialize logging")?;

    let session = Arc::new(SessionManager::new(std::process::id()));
    let launcher = Arc::new(ProcessConsoleLauncher {
        command: args.peer_command.unwrap_or_else(|| DEFAULT_PEER_COMMAND.to_owned()),
    });
    let ctx = Arc::new(HandlerContext::new(Arc::clone(&session), launcher));

    let (shutdown_handle, shutdown_signal) = broker_task::ShutdownHandle::new();
    let _registration_task = broker_task::spawn_task(broker_core::RegistrationServerTask::new(Arc::clone(&session)), shutdown_signal);

    let stdout = Arc::new(AsyncMutex::new(tokio::io::stdout()));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await.context("failed to read line from stdin")? {
        let line = line.trim().to_owned();
        if line.is_empty() {
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let stdout = Arc::clone(&stdout);

        tokio::spawn(async move {
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(error) => {
                    warn!(%error, "failed to parse JSON-RPC request");
                    let response = JsonRpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {error}"));
                    write_response(&stdout, &response).await;
                    return;
                }
            };

            debug!(method = %request.method, "dispatching request");

            if let Some(response) = handle_request(ctx, request).await {
                write_response(&stdout, &response).await;
            }
        });
    }

    shutdown_handle.signal();
    Ok(())
}

async fn write_response(stdout: &AsyncMutex<tokio::io::Stdout>, response: &JsonRpcResponse) {
    let serialized = match serde_json::to_string(response) {
        Ok(s) => s,
        Err(error) => {
            error!(%error, "failed to serialize JSON-RPC response");
            return;
        }
    };

    let mut stdout = stdout.lock().await;
    if let Err(error) = stdout.write_all(serialized.as_bytes()).await {
        error!(%error, "failed to write JSON-RPC response");
        return;
    }
    if let Err(error) = stdout.write_all(b"\n").await {
        error!(%error, "failed to write newline after JSON-RPC response");
        return;
    }
    let _ = stdout.flush().await;
}
