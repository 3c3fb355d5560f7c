//! WebSocket upgrades. The token and, for chat, the partner are checked by
//! route middleware, so a refused client gets a plain HTTP status instead of
//! an opened-then-closed socket.

use axum::{
    Extension, Router,
    extract::{Path, Query, Request, State, WebSocketUpgrade},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use tracing::warn;

use slotswap_gateway::auth::verify_token;
use slotswap_gateway::chat::ChatError;
use slotswap_gateway::connection::{self, ConnectionKind};
use slotswap_types::models::UserId;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

/// Identity taken from the `token` query parameter.
#[derive(Debug, Clone, Copy)]
pub struct SocketUser(pub UserId);

pub fn ws_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/notifications", get(notifications_upgrade))
        .route(
            "/ws/chat/{partner_id}",
            get(chat_upgrade).route_layer(axum_middleware::from_fn_with_state(
                state.clone(),
                require_chat_partner,
            )),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_socket_token,
        ))
        .with_state(state)
}

async fn require_socket_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = verify_token(&state.jwt_secret, &query.token).map_err(|e| {
        warn!("Socket refused: {}", e);
        StatusCode::UNAUTHORIZED
    })?;
    req.extensions_mut().insert(SocketUser(user_id));
    Ok(next.run(req).await)
}

async fn require_chat_partner(
    State(state): State<AppState>,
    Extension(SocketUser(user_id)): Extension<SocketUser>,
    Path(partner_id): Path<UserId>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Err(e) = state.chat.check_eligibility(user_id, partner_id) {
        warn!("Chat socket {} -> {} refused: {}", user_id, partner_id, e);
        return Err(match e {
            ChatError::NotAllowed(_) => StatusCode::FORBIDDEN,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        });
    }
    Ok(next.run(req).await)
}

async fn notifications_upgrade(
    State(state): State<AppState>,
    Extension(SocketUser(user_id)): Extension<SocketUser>,
    ws: WebSocketUpgrade,
) -> Response {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, user_id, ConnectionKind::Notifications)
    })
}

async fn chat_upgrade(
    State(state): State<AppState>,
    Extension(SocketUser(user_id)): Extension<SocketUser>,
    Path(partner_id): Path<UserId>,
    ws: WebSocketUpgrade,
) -> Response {
    let relay = state.chat.clone();
    let dispatcher = relay.dispatcher().clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            dispatcher,
            user_id,
            ConnectionKind::Chat { relay, partner_id },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, header};
    use tower::ServiceExt;

    use slotswap_gateway::rooms::ChatPolicy;

    use crate::auth::testing::{seed_user, state, state_with};

    fn upgrade(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    }

    async fn status(app: &Router, uri: &str) -> StatusCode {
        app.clone().oneshot(upgrade(uri)).await.unwrap().status()
    }

    fn refused(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN
        )
    }

    #[tokio::test]
    async fn notification_socket_needs_a_valid_token() {
        let state = state();
        let (_ann, token) = seed_user(&state, "ann");
        let app = ws_router(state);

        assert_eq!(status(&app, "/ws/notifications").await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(&app, "/ws/notifications?token=garbage").await,
            StatusCode::UNAUTHORIZED
        );
        assert!(!refused(status(&app, &format!("/ws/notifications?token={token}")).await));
    }

    #[tokio::test]
    async fn chat_socket_is_refused_before_upgrade() {
        let state = state();
        let (ann, token) = seed_user(&state, "ann");
        let (bob, _) = seed_user(&state, "bob");
        let (cat, _) = seed_user(&state, "cat");
        state.db.add_friend(ann, bob).unwrap();
        let app = ws_router(state);

        assert_eq!(status(&app, &format!("/ws/chat/{bob}")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(&app, &format!("/ws/chat/{bob}?token=garbage")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(&app, &format!("/ws/chat/{ann}?token={token}")).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(&app, &format!("/ws/chat/9999?token={token}")).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(&app, &format!("/ws/chat/{cat}?token={token}")).await,
            StatusCode::FORBIDDEN
        );
        assert!(!refused(status(&app, &format!("/ws/chat/{bob}?token={token}")).await));
    }

    #[tokio::test]
    async fn open_chat_policy_admits_strangers() {
        let state = state_with(ChatPolicy::AnyAuthenticated);
        let (_ann, token) = seed_user(&state, "ann");
        let (cat, _) = seed_user(&state, "cat");
        let app = ws_router(state);

        assert!(!refused(status(&app, &format!("/ws/chat/{cat}?token={token}")).await));
    }
}
