//! Console session broker core: session bookkeeping, pipe discovery, typed
//! peer requests, response composition, the registration server, and the
//! four MCP tool handlers built on top of them.
//!
//! The stdio JSON-RPC framing loop and the platform console launcher are
//! assembled by the binary crate on top of this library; this crate never
//! touches stdin/stdout directly.

pub mod discovery;
pub mod error;
pub mod handlers;
pub mod launch;
pub mod peer_client;
pub mod pipe_name;
pub mod platform;
pub mod registration;
pub mod response;
pub mod session;
pub mod transport;

pub use handlers::{HandlerContext, InvokeExpressionArgs, ToolKind};
pub use launch::ConsoleLauncher;
pub use registration::RegistrationServerTask;
pub use session::SessionManager;
