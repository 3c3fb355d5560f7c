use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use slotswap_types::api::{Claims, CreateSwapRequest, RejectSwapRequest, SwapView};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::service::SwapListDirection;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Sent,
    Received,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub direction: Direction,
}

pub async fn create_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSwapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.swaps.create(claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_swaps(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SwapView>>, ApiError> {
    let direction = match query.direction {
        Direction::Sent => SwapListDirection::Sent,
        Direction::Received => SwapListDirection::Received,
    };
    Ok(Json(state.swaps.list(claims.sub, direction)?))
}

pub async fn get_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<SwapView>, ApiError> {
    Ok(Json(state.swaps.get(claims.sub, id)?))
}

pub async fn accept_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<SwapView>, ApiError> {
    Ok(Json(state.swaps.accept(claims.sub, id).await?))
}

pub async fn reject_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<RejectSwapRequest>,
) -> Result<Json<SwapView>, ApiError> {
    Ok(Json(state.swaps.reject(claims.sub, id, req.reason).await?))
}

pub async fn restore_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<SwapView>, ApiError> {
    Ok(Json(state.swaps.restore(claims.sub, id).await?))
}

pub async fn cancel_swap(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<SwapView>, ApiError> {
    Ok(Json(state.swaps.cancel(claims.sub, id).await?))
}
