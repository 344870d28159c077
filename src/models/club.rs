//! Club (map point) models and DTOs

use crate::error::{validation_error, AppError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A named location requests can be linked to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: u64,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Club entry as read from disk or a bulk data upload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredClub {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Coordinate accepted either as a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoordinateInput {
    Number(f64),
    Text(String),
}

impl CoordinateInput {
    fn parse(&self, field: &str) -> Result<f64, AppError> {
        let value = match self {
            CoordinateInput::Number(n) => *n,
            CoordinateInput::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| validation_error(format!("{} must be a number, got '{}'", field, s)))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(validation_error(format!("{} must be a finite number", field)))
        }
    }
}

/// Request body for creating or replacing a club
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClubPayload {
    #[validate(
        required(message = "Club name is required"),
        length(min = 1, max = 100, message = "Club name must be between 1 and 100 characters")
    )]
    #[serde(default)]
    pub name: Option<String>,

    #[validate(length(max = 200, message = "Address must be at most 200 characters"))]
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub lat: Option<CoordinateInput>,

    #[serde(default)]
    pub lng: Option<CoordinateInput>,
}

/// Validated club fields, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct ClubFields {
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

impl ClubPayload {
    /// Validate the payload and resolve its coordinates
    pub fn into_fields(self) -> Result<ClubFields, AppError> {
        self.validate().map_err(|e| validation_error(e.to_string()))?;

        let name = self.name.as_deref().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(validation_error("Club name must not be empty"));
        }

        let (lat, lng) = match (&self.lat, &self.lng) {
            (Some(lat), Some(lng)) => (lat.parse("lat")?, lng.parse("lng")?),
            _ => return Err(validation_error("Both lat and lng are required")),
        };
        if !(-90.0..=90.0).contains(&lat) {
            return Err(validation_error(format!("lat must be between -90 and 90, got {}", lat)));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(validation_error(format!("lng must be between -180 and 180, got {}", lng)));
        }

        Ok(ClubFields {
            name,
            address: self.address.unwrap_or_default().trim().to_string(),
            lat,
            lng,
        })
    }
}

/// Result of deleting a club
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedClub {
    pub club: Club,
    pub unlinked_requests: usize,
}
