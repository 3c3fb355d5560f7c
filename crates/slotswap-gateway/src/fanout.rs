use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use slotswap_db::Database;
use slotswap_types::events::{DomainEvent, NotificationPayload, ServerEvent};
use slotswap_types::models::{Badge, UserId};

use crate::dispatcher::Dispatcher;

/// Persists a notification and pushes it to the recipient's live sockets.
///
/// The stored row is the source of truth: a recipient with no open socket
/// picks it up from the list endpoint later.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Returns the new notification's id.
    pub async fn notify(
        &self,
        recipient_id: UserId,
        title: &str,
        body: &str,
        badge: Badge,
        action_url: Option<&str>,
    ) -> Result<i64> {
        let notification = self
            .db
            .insert_notification(recipient_id, title, body, badge, action_url)?;
        let payload = NotificationPayload::from_notification(&notification, Utc::now().date_naive());

        let delivered = self
            .dispatcher
            .send_to_user(recipient_id, ServerEvent::Notification(payload.clone()))
            .await;
        if delivered == 0 {
            debug!(
                "Notification {} for user {} stored; recipient offline",
                notification.id, recipient_id
            );
        }

        self.dispatcher.publish(DomainEvent::NotificationCreated {
            recipient_id,
            notification: payload,
        });
        Ok(notification.id)
    }
}
