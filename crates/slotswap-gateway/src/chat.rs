use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use slotswap_db::Database;
use slotswap_types::events::{ChatMessagePayload, DomainEvent, ServerEvent};
use slotswap_types::models::{Badge, ChatMessage, UserId};

use crate::dispatcher::Dispatcher;
use crate::fanout::Notifier;
use crate::rooms::{ChatPolicy, room_key};

pub const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    Empty,
    #[error("Message too long (max {} characters)", MAX_MESSAGE_LEN)]
    TooLong,
    #[error("Cannot chat with yourself")]
    SelfChat,
    #[error("User {0} not found")]
    UnknownUser(UserId),
    #[error("Not allowed to chat with user {0}")]
    NotAllowed(UserId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Persists chat messages and relays them to the pair's room.
#[derive(Clone)]
pub struct ChatRelay {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Notifier,
    policy: ChatPolicy,
}

impl ChatRelay {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: Notifier, policy: ChatPolicy) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
            policy,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Whether `user_id` may open the room shared with `partner_id`.
    pub fn check_eligibility(&self, user_id: UserId, partner_id: UserId) -> Result<(), ChatError> {
        if user_id == partner_id {
            return Err(ChatError::SelfChat);
        }
        if self.db.get_user(partner_id)?.is_none() {
            return Err(ChatError::UnknownUser(partner_id));
        }
        if !self.policy.allows(&self.db, user_id, partner_id)? {
            return Err(ChatError::NotAllowed(partner_id));
        }
        Ok(())
    }

    /// Persist, then broadcast to the room. The room's sequencer is held for
    /// both steps so every member sees messages in id order.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        message: &str,
        attachment: Option<&str>,
    ) -> Result<ChatMessagePayload, ChatError> {
        let message = message.trim();
        if message.is_empty() && attachment.is_none() {
            return Err(ChatError::Empty);
        }
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatError::TooLong);
        }
        self.check_eligibility(sender_id, recipient_id)?;

        let room = room_key(sender_id, recipient_id);
        let sender_name = self.db.display_name(sender_id)?;

        let sequencer = self.dispatcher.room_sequencer(&room).await;
        let sequenced = {
            let _guard = sequencer.lock().await;
            match self.db.insert_chat_message(sender_id, recipient_id, message, attachment) {
                Ok(stored) => {
                    let payload = ChatMessagePayload::from_message(&stored, room.clone(), sender_name.clone());
                    self.dispatcher
                        .publish_to_room(&room, ServerEvent::ChatMessage(payload.clone()), None)
                        .await;
                    Ok(payload)
                }
                Err(e) => Err(e),
            }
        };
        drop(sequencer);
        self.dispatcher.release_sequencer(&room).await;
        let payload = sequenced?;

        info!("Chat message {} in {} from user {}", payload.id, room, sender_id);

        let body = format!("{} sent you a message", sender_name);
        let action_url = format!("/messages/{}", sender_id);
        if let Err(e) = self
            .notifier
            .notify(recipient_id, "New Message", &body, Badge::New, Some(&action_url))
            .await
        {
            warn!("Failed to notify user {} of chat message {}: {}", recipient_id, payload.id, e);
        }

        self.dispatcher.publish(DomainEvent::ChatMessageSent(payload.clone()));
        Ok(payload)
    }

    /// Ephemeral: never stored, never delivered back to the sender.
    pub async fn typing(&self, sender_id: UserId, partner_id: UserId, is_typing: bool) -> usize {
        let room = room_key(sender_id, partner_id);
        self.dispatcher
            .publish_to_room(
                &room,
                ServerEvent::Typing {
                    user_id: sender_id,
                    is_typing,
                },
                Some(sender_id),
            )
            .await
    }

    /// Conversation in creation order. Marks the partner's messages as read.
    pub fn history(
        &self,
        user_id: UserId,
        partner_id: UserId,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.check_eligibility(user_id, partner_id)?;
        let messages = self.db.get_conversation(user_id, partner_id, limit, before)?;
        self.db.mark_conversation_read(user_id, partner_id)?;
        Ok(messages)
    }
}
