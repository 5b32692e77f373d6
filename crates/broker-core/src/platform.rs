//! Platform-scoped pipe enumeration.
//!
//! On Unix the broker's pipes are Unix domain sockets living as files under
//! one directory; enumeration lists that directory. On Windows, named pipes
//! live in a single flat kernel namespace (`\\.\pipe\*`) that can be listed
//! the same way a directory is listed. Either way, enumeration never opens
//! the pipes it finds — it is a pure name lookup.

use std::path::{Path, PathBuf};

use crate::pipe_name::PipeName;

/// Directory (Unix) holding this broker's socket files. Windows ignores
/// this and lists the global pipe namespace instead.
#[cfg(unix)]
pub fn default_socket_dir() -> PathBuf {
    std::env::temp_dir().join("powershell-mcp-pipes")
}

#[cfg(windows)]
pub fn default_socket_dir() -> PathBuf {
    PathBuf::new()
}

/// The on-disk/on-namespace path for a given pipe name.
#[cfg(unix)]
pub fn pipe_path(socket_dir: &Path, name: &PipeName) -> String {
    socket_dir.join(name.to_raw()).to_string_lossy().into_owned()
}

#[cfg(windows)]
pub fn pipe_path(_socket_dir: &Path, name: &PipeName) -> String {
    format!(r"\\.\pipe\{name}")
}

/// List every live pipe name matching `BASE.<proxy_pid>.<agent_id>.*`.
pub async fn enumerate_owned_pipes(socket_dir: &Path, proxy_pid: u32, agent_id: &str) -> Vec<PipeName> {
    list_pipe_names(socket_dir)
        .await
        .into_iter()
        .filter(|name| matches!(name, PipeName::Owned { proxy_pid: p, agent_id: a, .. } if *p == proxy_pid && a == agent_id))
        .collect()
}

/// List every live pipe name owned by this broker, across all agents.
pub async fn enumerate_all_owned_pipes(socket_dir: &Path, proxy_pid: u32) -> Vec<PipeName> {
    list_pipe_names(socket_dir)
        .await
        .into_iter()
        .filter(|name| matches!(name, PipeName::Owned { proxy_pid: p, .. } if *p == proxy_pid))
        .collect()
}

/// List every live pipe name matching `BASE.<peer_pid>` (no proxy/agent claim).
pub async fn enumerate_unowned_pipes(socket_dir: &Path) -> Vec<PipeName> {
    list_pipe_names(socket_dir)
        .await
        .into_iter()
        .filter(|name| matches!(name, PipeName::Unowned { .. }))
        .collect()
}

#[cfg(unix)]
async fn list_pipe_names(socket_dir: &Path) -> Vec<PipeName> {
    let mut names = Vec::new();

    let mut read_dir = match tokio::fs::read_dir(socket_dir).await {
        Ok(rd) => rd,
        Err(_) => return names,
    };

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        if let Some(file_name) = entry.file_name().to_str() {
            if let Some(name) = PipeName::parse(file_name) {
                names.push(name);
            }
        }
    }

    names
}

#[cfg(windows)]
async fn list_pipe_names(_socket_dir: &Path) -> Vec<PipeName> {
    tokio::task::spawn_blocking(|| {
        let mut names = Vec::new();
        if let Ok(read_dir) = std::fs::read_dir(r"\\.\pipe\") {
            for entry in read_dir.flatten() {
                if let Some(file_name) = entry.file_name().to_str() {
                    if let Some(name) = PipeName::parse(file_name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    })
    .await
    .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumerates_only_matching_owned_pipes() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            PipeName::owned(1, "a1", 10).to_raw(),
            PipeName::owned(1, "a1", 11).to_raw(),
            PipeName::owned(1, "a2", 12).to_raw(),
            PipeName::owned(2, "a1", 13).to_raw(),
            PipeName::unowned(99).to_raw(),
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let mut pipes = enumerate_owned_pipes(dir.path(), 1, "a1").await;
        pipes.sort_by_key(|p| p.peer_pid());
        assert_eq!(pipes, vec![PipeName::owned(1, "a1", 10), PipeName::owned(1, "a1", 11)]);

        let unowned = enumerate_unowned_pipes(dir.path()).await;
        assert_eq!(unowned, vec![PipeName::unowned(99)]);
    }

    #[tokio::test]
    async fn enumeration_monotonic_under_absent_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PipeName::owned(1, "a1", 10).to_raw()), b"").unwrap();

        let first = enumerate_owned_pipes(dir.path(), 1, "a1").await;
        let second = enumerate_owned_pipes(dir.path(), 1, "a1").await;
        assert_eq!(first, second);
    }
}
