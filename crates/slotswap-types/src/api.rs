use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::events::NotificationPayload;
use crate::models::{Placement, SwapStatus, UserId};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the socket upgrade handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub username: String,
    pub token: String,
}

// -- Swaps --

/// Create contract. `mode` selects which fields are required.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CreateSwapRequest {
    /// Ask for a slot, promoting one of the requester's books.
    OneWay {
        slot_id: i64,
        book_id: Option<i64>,
        message: Option<String>,
        preferred_placement: Option<Placement>,
        max_partners_acknowledged: Option<i64>,
    },
    /// Two-way arrangement: the requester offers one of their own slots back.
    Reciprocal {
        slot_id: i64,
        book_id: Option<i64>,
        offered_slot_id: i64,
        requested_book_id: Option<i64>,
        message: Option<String>,
        preferred_placement: Option<Placement>,
        max_partners_acknowledged: Option<i64>,
    },
}

impl CreateSwapRequest {
    pub fn slot_id(&self) -> i64 {
        match self {
            Self::OneWay { slot_id, .. } | Self::Reciprocal { slot_id, .. } => *slot_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectSwapRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyView {
    pub user_id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
    pub primary_genre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub id: i64,
    pub title: String,
    pub primary_genre: String,
}

/// Display-only hints. Never consulted by the lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIndicators {
    pub genre_match: bool,
    pub audience_comparable: bool,
    pub reliability_match: bool,
}

/// Swap request with everything a client needs to render it without further lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapView {
    pub id: i64,
    pub status: SwapStatus,
    pub status_label: String,
    pub slot_id: i64,
    pub slot_send_date: NaiveDate,
    pub slot_genre: String,
    pub requester: PartyView,
    pub owner: PartyView,
    pub book: Option<BookView>,
    pub offered_slot_id: Option<i64>,
    pub requested_book_id: Option<i64>,
    pub message: Option<String>,
    pub preferred_placement: Placement,
    pub max_partners_acknowledged: i64,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub compatibility: CompatibilityIndicators,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize)]
pub struct NotificationGroup {
    pub label: String,
    pub notifications: Vec<NotificationPayload>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatMessageRequest {
    pub message: String,
    pub attachment: Option<String>,
}

// -- Profile --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAutoApproveRequest {
    pub auto_approve_friends: Option<bool>,
    pub auto_approve_min_reputation: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AudienceSyncResponse {
    pub audience_size: u64,
}
