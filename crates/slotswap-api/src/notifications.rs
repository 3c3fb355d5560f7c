use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use slotswap_types::api::{Claims, NotificationGroup, UnreadCountResponse};
use slotswap_types::events::NotificationPayload;
use slotswap_types::models::Notification;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Newest-first notifications, bucketed by day. Buckets keep the order of
/// their first appearance.
pub fn group_by_day(notifications: &[Notification], today: NaiveDate) -> Vec<NotificationGroup> {
    let mut groups: Vec<NotificationGroup> = Vec::new();
    for notification in notifications {
        let payload = NotificationPayload::from_notification(notification, today);
        let same_day = groups.last().is_some_and(|g| g.label == payload.time_group);
        match groups.last_mut() {
            Some(group) if same_day => group.notifications.push(payload),
            _ => groups.push(NotificationGroup {
                label: payload.time_group.clone(),
                notifications: vec![payload],
            }),
        }
    }
    groups
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationGroup>>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let notifications = state.db.list_notifications(claims.sub, limit)?;
    Ok(Json(group_by_day(&notifications, Utc::now().date_naive())))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = state.db.count_unread_notifications(claims.sub)?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.db.mark_notification_read(claims.sub, id)? {
        return Err(ApiError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.db.mark_all_notifications_read(claims.sub)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use slotswap_types::models::Badge;

    fn at(id: i64, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            recipient_id: 1,
            title: format!("n{id}"),
            body: String::new(),
            badge: Badge::Swap,
            action_url: None,
            is_read: false,
            created_at,
        }
    }

    #[test]
    fn groups_follow_day_labels() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let notifications = vec![
            at(4, Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()),
            at(3, Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()),
            at(2, Utc.with_ymd_and_hms(2026, 5, 9, 23, 0, 0).unwrap()),
            at(1, Utc.with_ymd_and_hms(2026, 4, 30, 12, 0, 0).unwrap()),
        ];

        let groups = group_by_day(&notifications, today);
        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Today", "Yesterday", "30-04-2026"]);
        assert_eq!(groups[0].notifications.len(), 2);
        assert_eq!(groups[0].notifications[0].id, 4);
    }

    #[test]
    fn empty_list_has_no_groups() {
        assert!(group_by_day(&[], NaiveDate::from_ymd_opt(2026, 5, 10).unwrap()).is_empty());
    }
}
