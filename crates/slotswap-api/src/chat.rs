use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use slotswap_gateway::rooms::room_key;
use slotswap_types::api::{Claims, SendChatMessageRequest};
use slotswap_types::events::ChatMessagePayload;
use slotswap_types::models::UserId;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Message id cursor: pass the oldest id of the previous page.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(partner_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessagePayload>>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let messages = state.chat.history(claims.sub, partner_id, limit, query.before)?;

    let room = room_key(claims.sub, partner_id);
    let my_name = state.db.display_name(claims.sub)?;
    let partner_name = state.db.display_name(partner_id)?;

    let payloads = messages
        .iter()
        .map(|m| {
            let sender_name = if m.sender_id == claims.sub {
                my_name.clone()
            } else {
                partner_name.clone()
            };
            ChatMessagePayload::from_message(m, room.clone(), sender_name)
        })
        .collect();
    Ok(Json(payloads))
}

/// REST fallback for clients without an open chat socket. Same path as a
/// socket frame: persisted, relayed to the room, recipient notified.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(partner_id): Path<UserId>,
    Json(req): Json<SendChatMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = state
        .chat
        .send_message(claims.sub, partner_id, &req.message, req.attachment.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(payload)))
}
