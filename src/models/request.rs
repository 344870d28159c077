//! Request models and DTOs

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Maximum stored length of a request text, in characters
pub const MAX_TEXT_LEN: usize = 100;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>"'`]"#).expect("static regex is valid"));

/// Strip markup-like characters, trim, and cap the length at [`MAX_TEXT_LEN`] characters
pub fn sanitize_text(input: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(input, "");
    stripped.trim().chars().take(MAX_TEXT_LEN).collect()
}

/// A tracked unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: u64,
    pub text: String,
    pub club_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A request entry as it may appear on disk or in bulk input.
///
/// Older files hold plain strings; newer ones hold objects whose fields may be partial.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredRequest {
    Text(String),
    Record(RequestRecord),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub text: String,
    #[serde(default)]
    pub club_id: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredRequest {
    pub fn into_record(self) -> RequestRecord {
        match self {
            StoredRequest::Text(text) => RequestRecord {
                id: None,
                text,
                club_id: None,
                created_at: None,
                updated_at: None,
            },
            StoredRequest::Record(record) => record,
        }
    }
}

/// Request body for creating a request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestPayload {
    #[validate(required(message = "Request text is required"))]
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub club_id: Option<u64>,
}

/// Request body for editing a request.
///
/// `clubId` distinguishes "absent" (keep the link) from `null` (unlink).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestPayload {
    #[validate(required(message = "Request text is required"))]
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default, deserialize_with = "present_or_null")]
    pub club_id: Option<Option<u64>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

/// Query string for listing requests
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    #[serde(default)]
    pub search: Option<String>,
}

/// Result of completing a request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRequest {
    pub request: Request,
    pub completed_count: u64,
    pub remaining: usize,
}

/// Result of clearing the whole list
#[derive(Debug, Serialize)]
pub struct DeleteAllResponse {
    pub deleted: usize,
}
