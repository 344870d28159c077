//! Bulk data and import route handlers

use crate::error::{validation_error, ApiResult, AppError};
use crate::import::{self, ImportReport};
use crate::models::{AppData, BulkImportPayload, BulkImportSummary, SpreadsheetQuery, StoredData};
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use tracing::info;

/// Get the whole dataset
pub async fn get_data(State(state): State<SharedState>) -> ApiResult<Json<AppData>> {
    let data = state.store.read().await?;
    Ok(Json(data))
}

/// Replace the whole dataset; legacy layouts are accepted and normalized
pub async fn set_data(
    State(state): State<SharedState>,
    Json(stored): Json<StoredData>,
) -> ApiResult<Json<AppData>> {
    let data = state
        .store
        .update(|data| {
            let incoming = AppData::from_stored(stored, data.next_request_id, data.next_club_id)
                .map_err(|e| validation_error(e.to_string()))?;
            data.replace_with(incoming);
            Ok(data.clone())
        })
        .await?;
    Ok(Json(data))
}

/// Merge requests and clubs from a JSON body
pub async fn bulk_import(
    State(state): State<SharedState>,
    Json(payload): Json<BulkImportPayload>,
) -> ApiResult<Json<BulkImportSummary>> {
    let summary = state.store.update(|data| data.merge_bulk(payload)).await?;
    Ok(Json(summary))
}

/// Import requests from an uploaded Excel workbook (raw bytes, `?filename=`)
pub async fn import_spreadsheet(
    State(state): State<SharedState>,
    query: Result<Query<SpreadsheetQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<ImportReport>> {
    let Query(params) = query.map_err(|e| {
        AppError::BadRequest(format!("Expected a ?filename= query parameter: {}", e.body_text()))
    })?;
    if body.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    let parsed = import::parse_upload(&params.filename, &body)?;
    let added = state
        .store
        .update(|data| data.import_entries(&parsed.entries))
        .await?;

    info!("Imported {} requests from '{}'", added, params.filename);
    Ok(Json(ImportReport {
        added,
        skipped: parsed.skipped + (parsed.entries.len() - added),
        sample_row: parsed.sample_row,
    }))
}
