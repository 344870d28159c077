//! Bulk import DTOs

use super::club::ClubPayload;
use super::request::StoredRequest;
use serde::{Deserialize, Serialize};

/// Request body for `POST /api/import`: entries merged by text (requests) and name (clubs)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkImportPayload {
    pub requests: Vec<StoredRequest>,
    pub clubs: Vec<ClubPayload>,
}

/// Outcome of a bulk merge
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportSummary {
    pub added_requests: usize,
    pub added_clubs: usize,
    pub skipped_requests: usize,
    pub skipped_clubs: usize,
}

/// Query string of the spreadsheet upload route
#[derive(Debug, Deserialize)]
pub struct SpreadsheetQuery {
    pub filename: String,
}
