//! Write-side shapes and query outcomes. Read-side rows map straight onto the
//! `slotswap-types` entities.

use chrono::{DateTime, NaiveDate, Utc};
use slotswap_types::models::{Placement, SwapRequest, SwapStatus, UserId};

/// Login lookup row; the only place the password hash leaves the database.
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub display_name: &'a str,
}

pub struct NewSlot<'a> {
    pub owner_id: UserId,
    pub send_date: NaiveDate,
    pub preferred_genre: &'a str,
    pub audience_size: i64,
    pub max_partners: i64,
}

pub struct NewBook<'a> {
    pub owner_id: UserId,
    pub title: &'a str,
    pub primary_genre: &'a str,
    pub is_primary_promo: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewSwapRequest {
    pub slot_id: i64,
    pub requester_id: UserId,
    pub book_id: Option<i64>,
    pub offered_slot_id: Option<i64>,
    pub requested_book_id: Option<i64>,
    pub status: SwapStatus,
    pub message: Option<String>,
    pub preferred_placement: Placement,
    pub max_partners_acknowledged: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSwapOutcome {
    /// The committed row.
    Created(SwapRequest),
    /// An active request already exists for the pair; carries its status.
    Duplicate(SwapStatus),
}

/// Column values written by a status transition.
#[derive(Debug, Clone)]
pub struct StatusPatch {
    pub status: SwapStatus,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    /// Only overwrites when `Some`.
    pub scheduled_date: Option<NaiveDate>,
    /// Only overwrites when `Some`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusPatch {
    pub fn to(status: SwapStatus) -> Self {
        Self {
            status,
            rejection_reason: None,
            rejected_at: None,
            scheduled_date: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The row as committed.
    Applied(SwapRequest),
    /// The row moved on since it was read; carries the status found.
    Stale(SwapStatus),
    Missing,
    /// Re-entering an active state would break the one-active-request rule.
    Duplicate,
}
