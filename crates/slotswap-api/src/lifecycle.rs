//! Transition table for swap requests.
//!
//! Pure: no storage, no permissions, no side effects. The service layer checks
//! who is acting and then asks this table where the request goes next.

use std::fmt;

use thiserror::Error;

use slotswap_types::models::SwapStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapAction {
    Accept,
    Reject,
    Restore,
    Cancel,
    /// Operational progression after confirmation.
    Advance(SwapStatus),
}

impl SwapAction {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Restore => "restore",
            Self::Cancel => "cancel",
            Self::Advance(_) => "advance",
        }
    }
}

impl fmt::Display for SwapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance(target) => write!(f, "advance to '{}'", target),
            other => f.write_str(other.verb()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot {action} a swap in '{from}' state")]
pub struct InvalidTransition {
    pub action: SwapAction,
    pub from: SwapStatus,
}

/// States a request can still be pulled out of by reject or cancel.
fn withdrawable(status: SwapStatus) -> bool {
    matches!(
        status,
        SwapStatus::Pending | SwapStatus::Confirmed | SwapStatus::Sending | SwapStatus::Scheduled
    )
}

pub fn next_status(from: SwapStatus, action: SwapAction) -> Result<SwapStatus, InvalidTransition> {
    use SwapStatus::*;

    let to = match (action, from) {
        (SwapAction::Accept, Pending) => Some(Confirmed),
        (SwapAction::Reject | SwapAction::Cancel, s) if withdrawable(s) => Some(Rejected),
        (SwapAction::Restore, Rejected) => Some(Pending),
        (SwapAction::Advance(target), current) => match (current, target) {
            (Confirmed, Sending)
            | (Sending, Scheduled)
            | (Scheduled, Completed)
            | (Scheduled, Verified)
            | (Completed, Verified) => Some(target),
            _ => None,
        },
        _ => None,
    };

    to.ok_or(InvalidTransition { action, from })
}

#[cfg(test)]
mod tests {
    use super::*;
    use SwapStatus::*;

    #[test]
    fn user_gated_edges() {
        assert_eq!(next_status(Pending, SwapAction::Accept), Ok(Confirmed));
        assert_eq!(next_status(Pending, SwapAction::Reject), Ok(Rejected));
        assert_eq!(next_status(Rejected, SwapAction::Restore), Ok(Pending));
        assert_eq!(next_status(Pending, SwapAction::Cancel), Ok(Rejected));
        assert_eq!(next_status(Confirmed, SwapAction::Cancel), Ok(Rejected));
        assert_eq!(next_status(Scheduled, SwapAction::Reject), Ok(Rejected));
    }

    #[test]
    fn terminal_states_refuse_withdrawal() {
        for from in [Completed, Verified, Rejected] {
            assert!(next_status(from, SwapAction::Cancel).is_err());
            assert!(next_status(from, SwapAction::Reject).is_err());
        }
        let err = next_status(Completed, SwapAction::Cancel).unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel a swap in 'completed' state");
    }

    #[test]
    fn accept_and_restore_only_from_their_source() {
        for from in SwapStatus::ALL {
            assert_eq!(next_status(from, SwapAction::Accept).is_ok(), from == Pending);
            assert_eq!(next_status(from, SwapAction::Restore).is_ok(), from == Rejected);
        }
        assert_eq!(
            next_status(Confirmed, SwapAction::Accept).unwrap_err().to_string(),
            "Cannot accept a swap in 'confirmed' state"
        );
    }

    #[test]
    fn operational_progression() {
        assert_eq!(next_status(Confirmed, SwapAction::Advance(Sending)), Ok(Sending));
        assert_eq!(next_status(Sending, SwapAction::Advance(Scheduled)), Ok(Scheduled));
        assert_eq!(next_status(Scheduled, SwapAction::Advance(Completed)), Ok(Completed));
        assert_eq!(next_status(Scheduled, SwapAction::Advance(Verified)), Ok(Verified));
        assert_eq!(next_status(Completed, SwapAction::Advance(Verified)), Ok(Verified));

        assert!(next_status(Pending, SwapAction::Advance(Sending)).is_err());
        assert!(next_status(Confirmed, SwapAction::Advance(Completed)).is_err());
        assert!(next_status(Verified, SwapAction::Advance(Completed)).is_err());
        assert_eq!(
            next_status(Pending, SwapAction::Advance(Rejected)).unwrap_err().to_string(),
            "Cannot advance to 'rejected' a swap in 'pending' state"
        );
    }
}
