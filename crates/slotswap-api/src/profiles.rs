use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use slotswap_types::api::{AudienceSyncResponse, Claims, UpdateAutoApproveRequest};
use slotswap_types::models::{Profile, UserId};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .db
        .get_profile(claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

pub async fn update_auto_approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAutoApproveRequest>,
) -> Result<Json<Profile>, ApiError> {
    if let Some(min) = req.auto_approve_min_reputation {
        if !min.is_finite() || min < 0.0 {
            return Err(ApiError::BadRequest(
                "auto_approve_min_reputation must be a non-negative number".into(),
            ));
        }
    }

    let profile = state
        .db
        .update_auto_approve(claims.sub, req.auto_approve_friends, req.auto_approve_min_reputation)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserId>>, ApiError> {
    Ok(Json(state.db.list_friends(claims.sub)?))
}

pub async fn add_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if friend_id == claims.sub {
        return Err(ApiError::BadRequest("Cannot befriend yourself".into()));
    }
    if state.db.get_user(friend_id)?.is_none() {
        return Err(ApiError::NotFound(format!("User {} not found", friend_id)));
    }
    let created = state.db.add_friend(claims.sub, friend_id)?;
    Ok(if created { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if friend_id == claims.sub || !state.db.remove_friend(claims.sub, friend_id)? {
        return Err(ApiError::NotFound("Friendship not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_audience(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<AudienceSyncResponse>, ApiError> {
    let audience_size = state.swaps.sync_audience(claims.sub).await?;
    Ok(Json(AudienceSyncResponse { audience_size }))
}
