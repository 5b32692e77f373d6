//! Pipe naming: construction, parsing, and the registration pipe name.
//!
//! `BASE.<proxyPid>.<agentId>.<peerPid>` for owned pipes, `BASE.<peerPid>`
//! for unowned ones, `BASE.Registration` for the inbound registration pipe.

/// Fixed prefix shared by every pipe name this broker creates or looks for.
pub const BASE: &str = "PowerShell.MCP.Communication";

/// Suffix of the inbound registration pipe: `BASE.Registration`.
pub const REGISTRATION_SUFFIX: &str = "Registration";

/// A parsed pipe name, borrowing nothing — cheap to pass around and compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipeName {
    /// `BASE.<proxy_pid>.<agent_id>.<peer_pid>`
    Owned {
        proxy_pid: u32,
        agent_id: String,
        peer_pid: u32,
    },
    /// `BASE.<peer_pid>`
    Unowned { peer_pid: u32 },
    /// `BASE.Registration`
    Registration,
}

impl PipeName {
    /// Construct the owned name for a given (proxy, agent, peer) triple.
    pub fn owned(proxy_pid: u32, agent_id: impl Into<String>, peer_pid: u32) -> Self {
        PipeName::Owned {
            proxy_pid,
            agent_id: agent_id.into(),
            peer_pid,
        }
    }

    pub fn unowned(peer_pid: u32) -> Self {
        PipeName::Unowned { peer_pid }
    }

    /// The peer's OS PID, common to both owned and unowned pipe names.
    pub fn peer_pid(&self) -> Option<u32> {
        match self {
            PipeName::Owned { peer_pid, .. } | PipeName::Unowned { peer_pid } => Some(*peer_pid),
            PipeName::Registration => None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            PipeName::Owned { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// Parse a raw pipe name (filesystem entry / namespace entry) into a
    /// [`PipeName`], or `None` if it doesn't match `BASE.*` at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(BASE)?.strip_prefix('.')?;

        if rest == REGISTRATION_SUFFIX {
            return Some(PipeName::Registration);
        }

        let parts: Vec<&str> = rest.split('.').collect();
        match parts.as_slice() {
            [peer_pid] => peer_pid.parse().ok().map(|peer_pid| PipeName::Unowned { peer_pid }),
            [proxy_pid, agent_id, peer_pid] => {
                let proxy_pid = proxy_pid.parse().ok()?;
                let peer_pid = peer_pid.parse().ok()?;
                Some(PipeName::Owned {
                    proxy_pid,
                    agent_id: (*agent_id).to_owned(),
                    peer_pid,
                })
            }
            _ => None,
        }
    }

    pub fn to_raw(&self) -> String {
        match self {
            PipeName::Owned {
                proxy_pid,
                agent_id,
                peer_pid,
            } => format!("{BASE}.{proxy_pid}.{agent_id}.{peer_pid}"),
            PipeName::Unowned { peer_pid } => format!("{BASE}.{peer_pid}"),
            PipeName::Registration => format!("{BASE}.{REGISTRATION_SUFFIX}"),
        }
    }
}

impl std::fmt::Display for PipeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_owned() {
        let name = PipeName::owned(123, "a1b2c3d4", 456);
        assert_eq!(name.to_raw(), "PowerShell.MCP.Communication.123.a1b2c3d4.456");
        assert_eq!(PipeName::parse(&name.to_raw()), Some(name));
    }

    #[test]
    fn round_trips_unowned() {
        let name = PipeName::unowned(4242);
        assert_eq!(name.to_raw(), "PowerShell.MCP.Communication.4242");
        assert_eq!(PipeName::parse(&name.to_raw()), Some(name));
    }

    #[test]
    fn parses_registration() {
        assert_eq!(
            PipeName::parse("PowerShell.MCP.Communication.Registration"),
            Some(PipeName::Registration)
        );
    }

    #[test]
    fn rejects_foreign_prefix() {
        assert_eq!(PipeName::parse("SomeOtherThing.123"), None);
    }

    #[test]
    fn peer_pid_accessor() {
        assert_eq!(PipeName::owned(1, "default", 99).peer_pid(), Some(99));
        assert_eq!(PipeName::unowned(99).peer_pid(), Some(99));
        assert_eq!(PipeName::Registration.peer_pid(), None);
    }
}
