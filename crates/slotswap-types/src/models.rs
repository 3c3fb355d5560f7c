use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user id. Chat room keys sort on it, so it must stay an integer.
pub type UserId = i64;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// -- Swap status --

/// Lifecycle state of a swap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Confirmed,
    Sending,
    Scheduled,
    Completed,
    Verified,
    Rejected,
}

impl SwapStatus {
    pub const ALL: [SwapStatus; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::Sending,
        Self::Scheduled,
        Self::Completed,
        Self::Verified,
        Self::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Sending => "sending",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    /// A send has happened; nothing may reject or cancel it anymore.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Verified)
    }

    /// Counts against the one-active-request-per-(slot, requester) rule.
    pub fn is_active(self) -> bool {
        self != Self::Rejected
    }

    /// Human label used on swap cards.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Waiting for partner response",
            Self::Confirmed => "Swap Confirmed",
            Self::Sending => "Sending in progress",
            Self::Scheduled => "Swap Scheduled",
            Self::Completed => "Swap Completed",
            Self::Verified => "Swap Verified",
            Self::Rejected => "Swap Rejected",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "swap status",
                value: s.to_string(),
            })
    }
}

// -- Placement --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Top,
    #[default]
    Middle,
    Bottom,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Middle => "middle",
            Self::Bottom => "bottom",
        }
    }
}

impl FromStr for Placement {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Self::Top),
            "middle" => Ok(Self::Middle),
            "bottom" => Ok(Self::Bottom),
            other => Err(UnknownVariant {
                kind: "placement",
                value: other.to_string(),
            }),
        }
    }
}

// -- Notification badge --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Badge {
    Swap,
    Verified,
    Reminder,
    Deadline,
    New,
}

impl Badge {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Swap => "SWAP",
            Self::Verified => "VERIFIED",
            Self::Reminder => "REMINDER",
            Self::Deadline => "DEADLINE",
            Self::New => "NEW",
        }
    }
}

impl FromStr for Badge {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SWAP" => Ok(Self::Swap),
            "VERIFIED" => Ok(Self::Verified),
            "REMINDER" => Ok(Self::Reminder),
            "DEADLINE" => Ok(Self::Deadline),
            "NEW" => Ok(Self::New),
            other => Err(UnknownVariant {
                kind: "badge",
                value: other.to_string(),
            }),
        }
    }
}

// -- Entities --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One per user, created together with the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub primary_genre: String,
    pub reputation_score: f64,
    pub auto_approve_friends: bool,
    pub auto_approve_min_reputation: f64,
}

impl Profile {
    /// Address used for mailing-list group moves.
    pub fn contact_email<'a>(&'a self, user: &'a User) -> Option<&'a str> {
        self.email.as_deref().or(user.email.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSlot {
    pub id: i64,
    pub owner_id: UserId,
    pub send_date: NaiveDate,
    pub preferred_genre: String,
    pub audience_size: i64,
    pub max_partners: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub owner_id: UserId,
    pub title: String,
    pub primary_genre: String,
    pub is_primary_promo: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: i64,
    pub slot_id: i64,
    pub requester_id: UserId,
    pub book_id: Option<i64>,
    pub offered_slot_id: Option<i64>,
    pub requested_book_id: Option<i64>,
    pub status: SwapStatus,
    pub message: Option<String>,
    pub preferred_placement: Placement,
    pub max_partners_acknowledged: i64,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: UserId,
    pub title: String,
    pub body: String,
    pub badge: Badge,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Day bucket shown in the notification list: `Today`, `Yesterday` or `DD-MM-YYYY`.
    pub fn day_label(&self, today: NaiveDate) -> String {
        let day = self.created_at.date_naive();
        if day == today {
            "Today".to_string()
        } else if Some(day) == today.checked_sub_signed(Duration::days(1)) {
            "Yesterday".to_string()
        } else {
            day.format("%d-%m-%Y").to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    pub attachment: Option<String>,
    pub is_file: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification_at(created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: 1,
            recipient_id: 1,
            title: "t".into(),
            body: "b".into(),
            badge: Badge::New,
            action_url: None,
            is_read: false,
            created_at,
        }
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in SwapStatus::ALL {
            assert_eq!(status.as_str().parse::<SwapStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SwapStatus>().is_err());
    }

    #[test]
    fn only_completed_and_verified_are_terminal() {
        let terminal: Vec<_> = SwapStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![SwapStatus::Completed, SwapStatus::Verified]);
        assert!(!SwapStatus::Rejected.is_active());
        assert!(SwapStatus::Confirmed.is_active());
    }

    #[test]
    fn badge_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Badge::Verified).unwrap(), "\"VERIFIED\"");
        assert_eq!("DEADLINE".parse::<Badge>().unwrap(), Badge::Deadline);
    }

    #[test]
    fn day_labels() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let at = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 9, 30, 0).unwrap();

        assert_eq!(notification_at(at(10)).day_label(today), "Today");
        assert_eq!(notification_at(at(9)).day_label(today), "Yesterday");
        assert_eq!(notification_at(at(2)).day_label(today), "02-03-2026");
    }
}
