//! Request route handlers
//!
//! List, add, edit, delete, complete and pick requests.

use crate::error::{not_found_error, validation_error, ApiResult};
use crate::models::{
    CompletedRequest, CreateRequestPayload, DeleteAllResponse, ListRequestsQuery, Request,
    UpdateRequestPayload,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;
use validator::Validate;

/// List requests, optionally filtered by `?search=`
pub async fn list_requests(
    State(state): State<SharedState>,
    Query(params): Query<ListRequestsQuery>,
) -> ApiResult<Json<Vec<Request>>> {
    let data = state.store.read().await?;
    let requests = data.search_requests(params.search.as_deref());
    debug!("Listed {} of {} requests", requests.len(), data.requests.len());
    Ok(Json(requests))
}

/// Add a request
pub async fn create_request(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRequestPayload>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let text = payload.text.unwrap_or_default();

    let request = state
        .store
        .update(|data| data.add_request(&text, payload.club_id))
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Edit a request's text and club link
pub async fn update_request(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateRequestPayload>,
) -> ApiResult<Json<Request>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;
    let text = payload.text.unwrap_or_default();

    let request = state
        .store
        .update(|data| data.update_request(id, &text, payload.club_id))
        .await?;
    Ok(Json(request))
}

/// Delete a request, returning the removed entry
pub async fn delete_request(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Request>> {
    let removed = state.store.update(|data| data.delete_request(id)).await?;
    Ok(Json(removed))
}

/// Delete every request
pub async fn delete_all_requests(
    State(state): State<SharedState>,
) -> ApiResult<Json<DeleteAllResponse>> {
    let deleted = state
        .store
        .update(|data| Ok(data.clear_requests()))
        .await?;
    Ok(Json(DeleteAllResponse { deleted }))
}

/// Mark a request done
pub async fn complete_request(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<CompletedRequest>> {
    let completed = state.store.update(|data| data.complete_request(id)).await?;
    Ok(Json(completed))
}

/// Pick a random pending request
pub async fn random_request(State(state): State<SharedState>) -> ApiResult<Json<Request>> {
    let data = state.store.read().await?;
    let picked = data
        .pick_random(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| not_found_error("All requests are done"))?;
    Ok(Json(picked))
}
