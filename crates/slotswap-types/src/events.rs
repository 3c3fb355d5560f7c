use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::SwapView;
use crate::models::{Badge, ChatMessage, Notification, UserId};

/// Notification as pushed over the socket and returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub badge: Badge,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub time_group: String,
}

impl NotificationPayload {
    pub fn from_notification(notification: &Notification, today: NaiveDate) -> Self {
        Self {
            id: notification.id,
            title: notification.title.clone(),
            body: notification.body.clone(),
            badge: notification.badge,
            action_url: notification.action_url.clone(),
            is_read: notification.is_read,
            created_at: notification.created_at,
            time_group: notification.day_label(today),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub id: i64,
    pub room: String,
    pub sender_id: UserId,
    pub sender_name: String,
    pub recipient_id: UserId,
    pub message: String,
    pub attachment: Option<String>,
    pub is_file: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessagePayload {
    pub fn from_message(message: &ChatMessage, room: String, sender_name: String) -> Self {
        Self {
            id: message.id,
            room,
            sender_id: message.sender_id,
            sender_name,
            recipient_id: message.recipient_id,
            message: message.content.clone(),
            attachment: message.attachment.clone(),
            is_file: message.is_file,
            created_at: message.created_at,
        }
    }
}

/// Events sent over the real-time sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Server confirms the connection joined its group
    Ready { user_id: UserId, group: String },

    /// A notification was persisted for this user
    Notification(NotificationPayload),

    /// A chat message was persisted in this room
    ChatMessage(ChatMessagePayload),

    /// The other participant started or stopped typing
    Typing { user_id: UserId, is_typing: bool },
}

/// Frames sent FROM client TO server on a chat socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCommand {
    ChatMessage {
        message: String,
        #[serde(default)]
        attachment: Option<String>,
    },
    Typing {
        #[serde(default = "default_true")]
        is_typing: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Domain events published for outer layers (audit, analytics, UI refresh).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    SwapCreated(SwapView),
    SwapAccepted(SwapView),
    SwapRejected(SwapView),
    SwapRestored(SwapView),
    SwapCancelled(SwapView),
    SwapAdvanced(SwapView),
    NotificationCreated {
        recipient_id: UserId,
        notification: NotificationPayload,
    },
    ChatMessageSent(ChatMessagePayload),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwapCreated(_) => "swap-created",
            Self::SwapAccepted(_) => "swap-accepted",
            Self::SwapRejected(_) => "swap-rejected",
            Self::SwapRestored(_) => "swap-restored",
            Self::SwapCancelled(_) => "swap-cancelled",
            Self::SwapAdvanced(_) => "swap-advanced",
            Self::NotificationCreated { .. } => "notification-created",
            Self::ChatMessageSent(_) => "chat-message-sent",
        }
    }
}
