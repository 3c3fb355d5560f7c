pub mod auth;
pub mod chat;
pub mod error;
pub mod lifecycle;
pub mod mailing;
pub mod middleware;
pub mod notifications;
pub mod profiles;
pub mod reputation;
pub mod service;
pub mod sockets;
pub mod swaps;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes. Socket upgrades are in [`sockets::ws_router`].
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/swaps", get(swaps::list_swaps).post(swaps::create_swap))
        .route("/swaps/{id}", get(swaps::get_swap))
        .route("/swaps/{id}/accept", post(swaps::accept_swap))
        .route("/swaps/{id}/reject", post(swaps::reject_swap))
        .route("/swaps/{id}/restore", post(swaps::restore_swap))
        .route("/swaps/{id}/cancel", post(swaps::cancel_swap))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route(
            "/chat/{partner_id}/messages",
            get(chat::get_history).post(chat::send_message),
        )
        .route("/profile", get(profiles::get_profile))
        .route("/profile/auto-approve", patch(profiles::update_auto_approve))
        .route("/profile/sync-audience", post(profiles::sync_audience))
        .route("/friends", get(profiles::list_friends))
        .route(
            "/friends/{id}",
            post(profiles::add_friend).delete(profiles::remove_friend),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use slotswap_db::models::{NewBook, NewSlot};

    use crate::auth::testing::{seed_user, state};

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = router(state());
        let response = app
            .clone()
            .oneshot(request("GET", "/swaps", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/swaps", Some("garbage"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["detail"], "Authentication required");
    }

    #[tokio::test]
    async fn swap_flow_over_http() {
        let state = state();
        let (ann, ann_token) = seed_user(&state, "ann");
        let (olive, olive_token) = seed_user(&state, "olive");
        let slot_id = state
            .db
            .create_slot(&NewSlot {
                owner_id: olive,
                send_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                preferred_genre: "romance",
                audience_size: 0,
                max_partners: 5,
            })
            .unwrap();
        state
            .db
            .create_book(&NewBook {
                owner_id: ann,
                title: "Summer Letters",
                primary_genre: "romance",
                is_primary_promo: true,
                is_active: true,
            })
            .unwrap();
        let app = router(state.clone());

        let create = json!({ "mode": "one_way", "slot_id": slot_id });
        let response = app
            .clone()
            .oneshot(request("POST", "/swaps", Some(&ann_token), Some(create.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let swap = json_body(response).await;
        assert_eq!(swap["status"], "pending");
        let id = swap["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(request("POST", "/swaps", Some(&ann_token), Some(create)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(json_body(response).await["detail"].as_str().unwrap().contains("already requested"));

        let response = app
            .clone()
            .oneshot(request("POST", &format!("/swaps/{id}/accept"), Some(&ann_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request("POST", &format!("/swaps/{id}/accept"), Some(&olive_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "confirmed");

        let response = app
            .clone()
            .oneshot(request("GET", "/notifications/unread-count", Some(&ann_token), None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["unread"], 1);

        let response = app
            .clone()
            .oneshot(request("GET", "/notifications", Some(&ann_token), None))
            .await
            .unwrap();
        let groups = json_body(response).await;
        assert_eq!(groups[0]["label"], "Today");
        assert_eq!(groups[0]["notifications"][0]["title"], "Swap Accepted");

        let response = app
            .clone()
            .oneshot(request("POST", "/notifications/read-all", Some(&ann_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.db.count_unread_notifications(ann).unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_create_contract_is_rejected() {
        let state = state();
        let (_ann, token) = seed_user(&state, "ann");
        let app = router(state);

        // reciprocal without offered_slot_id
        let body = json!({ "mode": "reciprocal", "slot_id": 1 });
        let response = app
            .oneshot(request("POST", "/swaps", Some(&token), Some(body)))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
