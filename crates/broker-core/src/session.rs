//! Per-agent session state.
//!
//! A process singleton. Every mutating operation acquires one mutex covering
//! all agents; the guard never crosses an `.await` — all peer I/O is driven
//! from outside this module, after the lock has been released.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::pipe_name::PipeName;
use crate::platform;

#[derive(Debug, Default)]
struct AgentState {
    active_pipe_name: Option<PipeName>,
    known_busy_pids: HashSet<u32>,
}

/// Tracks, per agent id, the active pipe and the peer PIDs last observed
/// busy. Created lazily on first reference; never destroyed — state is
/// process-lifetime only and is not persisted across restarts.
pub struct SessionManager {
    proxy_pid: u32,
    socket_dir: PathBuf,
    agents: Mutex<HashMap<String, AgentState>>,
}

/// Agent id used when the caller doesn't specify one.
pub const DEFAULT_AGENT_ID: &str = "default";

impl SessionManager {
    pub fn new(proxy_pid: u32) -> Self {
        Self::with_socket_dir(proxy_pid, platform::default_socket_dir())
    }

    pub fn with_socket_dir(proxy_pid: u32, socket_dir: PathBuf) -> Self {
        Self {
            proxy_pid,
            socket_dir,
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn proxy_pid(&self) -> u32 {
        self.proxy_pid
    }

    pub fn pipe_path(&self, name: &PipeName) -> String {
        platform::pipe_path(&self.socket_dir, name)
    }

    pub fn get_active_pipe_name(&self, agent_id: &str) -> Option<PipeName> {
        let agents = self.agents.lock().expect("session mutex poisoned");
        agents.get(agent_id).and_then(|s| s.active_pipe_name.clone())
    }

    pub fn set_active_pipe_name(&self, agent_id: &str, name: Option<PipeName>) {
        let mut agents = self.agents.lock().expect("session mutex poisoned");
        agents.entry(agent_id.to_owned()).or_default().active_pipe_name = name;
    }

    pub fn mark_pipe_busy(&self, agent_id: &str, peer_pid: u32) {
        let mut agents = self.agents.lock().expect("session mutex poisoned");
        agents.entry(agent_id.to_owned()).or_default().known_busy_pids.insert(peer_pid);
    }

    pub fn unmark_pipe_busy(&self, agent_id: &str, peer_pid: u32) {
        let mut agents = self.agents.lock().expect("session mutex poisoned");
        if let Some(state) = agents.get_mut(agent_id) {
            state.known_busy_pids.remove(&peer_pid);
        }
    }

    /// Return the busy-PID set accumulated since the last call, and clear it.
    pub fn consume_known_busy_pids(&self, agent_id: &str) -> HashSet<u32> {
        let mut agents = self.agents.lock().expect("session mutex poisoned");
        agents
            .entry(agent_id.to_owned())
            .or_default()
            .known_busy_pids
            .drain()
            .collect()
    }

    /// Remove `pipe_name`'s PID from the busy set, and clear active-pipe if
    /// it currently points at `pipe_name`.
    pub fn clear_dead_pipe(&self, agent_id: &str, pipe_name: &PipeName) {
        let mut agents = self.agents.lock().expect("session mutex poisoned");
        if let Some(state) = agents.get_mut(agent_id) {
            if let Some(peer_pid) = pipe_name.peer_pid() {
                state.known_busy_pids.remove(&peer_pid);
            }
            if state.active_pipe_name.as_ref() == Some(pipe_name) {
                state.active_pipe_name = None;
            }
        }
    }

    pub async fn enumerate_pipes(&self, agent_id: &str) -> Vec<PipeName> {
        platform::enumerate_owned_pipes(&self.socket_dir, self.proxy_pid, agent_id).await
    }

    pub async fn enumerate_unowned_pipes(&self) -> Vec<PipeName> {
        platform::enumerate_unowned_pipes(&self.socket_dir).await
    }

    /// All owned pipes for this broker, across every agent.
    pub async fn enumerate_all_owned_pipes(&self) -> Vec<PipeName> {
        platform::enumerate_all_owned_pipes(&self.socket_dir, self.proxy_pid).await
    }
}
