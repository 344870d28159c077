//! Club (map point) route handlers

use crate::error::ApiResult;
use crate::models::{Club, ClubPayload, DeletedClub};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

/// List all clubs
pub async fn list_clubs(State(state): State<SharedState>) -> ApiResult<Json<Vec<Club>>> {
    let data = state.store.read().await?;
    Ok(Json(data.map_points))
}

/// Add a club
pub async fn create_club(
    State(state): State<SharedState>,
    Json(payload): Json<ClubPayload>,
) -> ApiResult<(StatusCode, Json<Club>)> {
    let fields = payload.into_fields()?;
    let club = state.store.update(|data| data.add_club(fields)).await?;
    Ok((StatusCode::CREATED, Json(club)))
}

/// Replace a club's fields
pub async fn update_club(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<ClubPayload>,
) -> ApiResult<Json<Club>> {
    let fields = payload.into_fields()?;
    let club = state
        .store
        .update(|data| data.update_club(id, fields))
        .await?;
    Ok(Json(club))
}

/// Delete a club; linked requests are kept and unlinked
pub async fn delete_club(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<DeletedClub>> {
    let deleted = state.store.update(|data| data.delete_club(id)).await?;
    Ok(Json(deleted))
}
