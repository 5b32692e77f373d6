//! The four MCP tools this broker exposes, and the shared dependencies
//! they're dispatched with.

mod invoke;
mod location;
mod start_console;
mod wait;

pub use invoke::InvokeExpressionArgs;

use std::sync::Arc;

use crate::launch::ConsoleLauncher;
use crate::session::{SessionManager, DEFAULT_AGENT_ID};

/// Shared dependencies every tool handler needs: the session singleton and
/// the console-launching seam, exposed behind a narrow interface so tests
/// can substitute an in-memory fake.
#[derive(Clone)]
pub struct HandlerContext {
    pub session: Arc<SessionManager>,
    pub launcher: Arc<dyn ConsoleLauncher>,
}

impl HandlerContext {
    pub fn new(session: Arc<SessionManager>, launcher: Arc<dyn ConsoleLauncher>) -> Self {
        Self { session, launcher }
    }

    fn resolve_agent_id(agent_id: Option<&str>) -> &str {
        agent_id.unwrap_or(DEFAULT_AGENT_ID)
    }

    pub async fn get_current_location(&self, agent_id: Option<&str>) -> String {
        location::get_current_location(&self.session, self.launcher.as_ref(), Self::resolve_agent_id(agent_id)).await
    }

    pub async fn invoke_expression(&self, agent_id: Option<&str>, args: InvokeExpressionArgs<'_>) -> String {
        invoke::invoke_expression(&self.session, self.launcher.as_ref(), Self::resolve_agent_id(agent_id), args).await
    }

    pub async fn wait_for_completion(&self, agent_id: Option<&str>, timeout_seconds: Option<u32>) -> String {
        wait::wait_for_completion(&self.session, Self::resolve_agent_id(agent_id), timeout_seconds).await
    }

    pub async fn start_powershell_console(&self, agent_id: Option<&str>) -> String {
        start_console::start_powershell_console(&self.session, self.launcher.as_ref(), Self::resolve_agent_id(agent_id)).await
    }
}

/// One of the four tools the stdio loop may dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    GetCurrentLocation,
    InvokeExpression,
    WaitForCompletion,
    StartPowershellConsole,
}

impl ToolKind {
    pub fn from_method_name(name: &str) -> Option<Self> {
        match name {
            "get_current_location" => Some(Self::GetCurrentLocation),
            "invoke_expression" => Some(Self::InvokeExpression),
            "wait_for_completion" => Some(Self::WaitForCompletion),
            "start_powershell_console" => Some(Self::StartPowershellConsole),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetCurrentLocation => "get_current_location",
            Self::InvokeExpression => "invoke_expression",
            Self::WaitForCompletion => "wait_for_completion",
            Self::StartPowershellConsole => "start_powershell_console",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_kind_round_trips_known_names() {
        for kind in [
            ToolKind::GetCurrentLocation,
            ToolKind::InvokeExpression,
            ToolKind::WaitForCompletion,
            ToolKind::StartPowershellConsole,
        ] {
            assert_eq!(ToolKind::from_method_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_tool_name_is_none() {
        assert_eq!(ToolKind::from_method_name("delete_everything"), None);
    }
}
