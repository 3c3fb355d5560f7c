use std::str::FromStr;

use anyhow::Result;
use slotswap_db::Database;
use slotswap_types::models::{UnknownVariant, UserId};

/// Canonical key for the conversation between two users. Both participants
/// land in the same group whoever connects first.
pub fn room_key(a: UserId, b: UserId) -> String {
    format!("chat_{}_{}", a.min(b), a.max(b))
}

pub fn user_group(user_id: UserId) -> String {
    format!("user_{}_notifications", user_id)
}

/// Who may open a chat room with whom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatPolicy {
    /// Friends, or users with any non-rejected swap between them.
    #[default]
    PartnersOnly,
    AnyAuthenticated,
}

impl FromStr for ChatPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partners_only" => Ok(Self::PartnersOnly),
            "any_authenticated" => Ok(Self::AnyAuthenticated),
            other => Err(UnknownVariant {
                kind: "chat policy",
                value: other.to_string(),
            }),
        }
    }
}

impl ChatPolicy {
    pub fn allows(self, db: &Database, a: UserId, b: UserId) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        match self {
            Self::AnyAuthenticated => Ok(true),
            Self::PartnersOnly => Ok(db.are_friends(a, b)? || db.has_active_swap_between(a, b)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use slotswap_db::models::{NewSlot, NewSwapRequest, NewUser, StatusPatch};
    use slotswap_types::models::{Placement, SwapStatus};

    #[test]
    fn room_key_is_order_independent() {
        assert_eq!(room_key(12, 3), "chat_3_12");
        assert_eq!(room_key(3, 12), "chat_3_12");
        // numeric, not lexicographic
        assert_eq!(room_key(9, 10), "chat_9_10");
    }

    #[test]
    fn policy_parses() {
        assert_eq!("partners_only".parse::<ChatPolicy>().unwrap(), ChatPolicy::PartnersOnly);
        assert_eq!(
            "any_authenticated".parse::<ChatPolicy>().unwrap(),
            ChatPolicy::AnyAuthenticated
        );
        assert!("everyone".parse::<ChatPolicy>().is_err());
    }

    #[test]
    fn partners_only_requires_friendship_or_live_swap() {
        let db = Database::open_in_memory().unwrap();
        let mk = |name: &str| {
            db.create_user(&NewUser {
                username: name,
                email: None,
                password_hash: "x",
                display_name: name,
            })
            .unwrap()
        };
        let (a, b, c) = (mk("a"), mk("b"), mk("c"));
        let policy = ChatPolicy::PartnersOnly;

        assert!(!policy.allows(&db, a, b).unwrap());
        assert!(ChatPolicy::AnyAuthenticated.allows(&db, a, b).unwrap());
        assert!(!ChatPolicy::AnyAuthenticated.allows(&db, a, a).unwrap());

        db.add_friend(a, c).unwrap();
        assert!(policy.allows(&db, c, a).unwrap());

        let slot_id = db
            .create_slot(&NewSlot {
                owner_id: b,
                send_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                preferred_genre: "thriller",
                audience_size: 0,
                max_partners: 5,
            })
            .unwrap();
        let outcome = db
            .insert_swap_request(&NewSwapRequest {
                slot_id,
                requester_id: a,
                book_id: None,
                offered_slot_id: None,
                requested_book_id: None,
                status: SwapStatus::Pending,
                message: None,
                preferred_placement: Placement::Middle,
                max_partners_acknowledged: 5,
            })
            .unwrap();
        assert!(policy.allows(&db, b, a).unwrap());

        let slotswap_db::models::InsertSwapOutcome::Created(swap) = outcome else {
            panic!("insert failed");
        };
        db.transition_swap_request(swap.id, SwapStatus::Pending, &StatusPatch::to(SwapStatus::Rejected))
            .unwrap();
        assert!(!policy.allows(&db, a, b).unwrap());
    }
}
