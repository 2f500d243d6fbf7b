//! Legal deal state transitions.
//!
//! Every status-changing storage call corresponds to exactly one edge
//! here. Anything not listed is not a real transition in this system —
//! the storage layer never needs to represent it.

use wager_types::DealStatus;

/// `true` iff `to` is a legal next state from `from`.
pub fn is_legal_transition(from: DealStatus, to: DealStatus) -> bool {
    use DealStatus::*;
    matches!(
        (from, to),
        (AwaitingMatch, Matched) | (AwaitingMatch, Void) | (Matched, Settled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use DealStatus::*;

    #[test]
    fn awaiting_match_can_pair_or_be_voided() {
        assert!(is_legal_transition(AwaitingMatch, Matched));
        assert!(is_legal_transition(AwaitingMatch, Void));
        assert!(!is_legal_transition(AwaitingMatch, Settled));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edge() {
        for terminal in [Settled, Void] {
            for to in [AwaitingMatch, Matched, Settled, Void] {
                assert!(!is_legal_transition(terminal, to));
            }
        }
    }
}
