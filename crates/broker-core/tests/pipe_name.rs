//! Pipe-name round-trip: every name this broker can construct must parse
//! back to itself, and arbitrary foreign strings must never parse as one.

use broker_core::pipe_name::PipeName;
use proptest::prelude::*;

fn agent_id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,16}"
}

proptest! {
    #[test]
    fn owned_names_round_trip(proxy_pid in any::<u32>(), agent_id in agent_id_strategy(), peer_pid in any::<u32>()) {
        let name = PipeName::owned(proxy_pid, agent_id, peer_pid);
        prop_assert_eq!(PipeName::parse(&name.to_raw()), Some(name));
    }

    #[test]
    fn unowned_names_round_trip(peer_pid in any::<u32>()) {
        let name = PipeName::unowned(peer_pid);
        prop_assert_eq!(PipeName::parse(&name.to_raw()), Some(name));
    }

    #[test]
    fn display_matches_to_raw(proxy_pid in any::<u32>(), agent_id in agent_id_strategy(), peer_pid in any::<u32>()) {
        let name = PipeName::owned(proxy_pid, agent_id, peer_pid);
        prop_assert_eq!(name.to_string(), name.to_raw());
    }

    #[test]
    fn garbage_with_matching_prefix_but_wrong_arity_is_rejected(junk in "[a-zA-Z0-9_.-]{0,40}") {
        let raw = format!("PowerShell.MCP.Communication.{junk}");
        if let Some(parsed) = PipeName::parse(&raw) {
            // If it did parse, round-tripping it must reproduce the same raw string.
            prop_assert_eq!(parsed.to_raw(), raw);
        }
    }
}

#[test]
fn registration_name_is_stable() {
    assert_eq!(PipeName::Registration.to_raw(), "PowerShell.MCP.Communication.Registration");
}
