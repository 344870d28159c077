//! The persisted aggregate and its load-time normalization

use super::club::{Club, StoredClub};
use super::request::{sanitize_text, Request, StoredRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Largest id ever handed out, so ids stay exact as JavaScript numbers
pub const MAX_ID: u64 = (1 << 53) - 1;

/// Everything the tracker stores, persisted as a single JSON document.
///
/// Deserialization goes through [`StoredData`], so legacy layouts (a bare array,
/// plain-string requests, missing ids or counters) come out canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredData")]
pub struct AppData {
    pub requests: Vec<Request>,
    pub map_points: Vec<Club>,
    pub completed_count: u64,
    pub next_request_id: u64,
    pub next_club_id: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            map_points: Vec::new(),
            completed_count: 0,
            next_request_id: 1,
            next_club_id: 1,
            last_updated: None,
        }
    }
}

/// Any on-disk layout the store has ever written
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoredData {
    Legacy(Vec<StoredRequest>),
    Current(StoredAppData),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredAppData {
    pub requests: Vec<StoredRequest>,
    #[serde(alias = "clubs")]
    pub map_points: Vec<StoredClub>,
    pub completed_count: u64,
    pub next_request_id: Option<u64>,
    pub next_club_id: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("{kind} id {id} is larger than the maximum id {}", MAX_ID)]
    OutOfRange { kind: &'static str, id: u64 },

    #[error("No {0} ids left to assign")]
    Exhausted(&'static str),
}

/// Hand out `*next` and advance it, or `None` once the id space is used up
pub(crate) fn take_id(next: &mut u64) -> Option<u64> {
    let id = (*next).max(1);
    if id > MAX_ID {
        return None;
    }
    *next = id + 1;
    Some(id)
}

/// Issues ids from a monotonic counter, keeping the counter above every id seen
struct IdAllocator {
    kind: &'static str,
    next: u64,
    seen: HashSet<u64>,
}

impl IdAllocator {
    /// `floor` is the first id a fresh entry may get; ids below it may already
    /// have been issued to entries that no longer exist
    fn new<I: IntoIterator<Item = u64>>(
        kind: &'static str,
        stored_next: Option<u64>,
        floor: u64,
        ids: I,
    ) -> Result<Self, IdError> {
        let ids: Vec<u64> = ids.into_iter().collect();
        if let Some(&id) = ids.iter().find(|&&id| id > MAX_ID) {
            return Err(IdError::OutOfRange { kind, id });
        }
        let max_plus_one = ids.iter().max().map_or(1, |max| max + 1);
        Ok(Self {
            kind,
            next: stored_next.unwrap_or(1).max(max_plus_one).max(floor).max(1),
            seen: HashSet::with_capacity(ids.len()),
        })
    }

    /// Keep `wanted` unless absent or already taken, otherwise hand out a fresh id
    fn claim(&mut self, wanted: Option<u64>) -> Result<u64, IdError> {
        if let Some(id) = wanted {
            if self.seen.insert(id) {
                return Ok(id);
            }
        }
        let id = take_id(&mut self.next).ok_or(IdError::Exhausted(self.kind))?;
        self.seen.insert(id);
        Ok(id)
    }
}

impl AppData {
    /// Normalize a stored document into canonical data.
    ///
    /// Entries without a usable id get fresh ids starting at the given floors,
    /// so a replacement never hands out an id the current dataset already issued.
    pub fn from_stored(stored: StoredData, request_floor: u64, club_floor: u64) -> Result<Self, IdError> {
        let stored = match stored {
            StoredData::Legacy(requests) => StoredAppData {
                requests,
                ..StoredAppData::default()
            },
            StoredData::Current(data) => data,
        };
        let now = Utc::now();

        let mut club_ids = IdAllocator::new(
            "club",
            stored.next_club_id,
            club_floor,
            stored.map_points.iter().filter_map(|c| c.id),
        )?;
        let map_points = stored
            .map_points
            .into_iter()
            .map(|club| -> Result<Club, IdError> {
                Ok(Club {
                    id: club_ids.claim(club.id)?,
                    name: club.name,
                    address: club.address,
                    lat: club.lat,
                    lng: club.lng,
                    created_at: club.created_at.unwrap_or(now),
                    updated_at: club.updated_at,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let known_clubs: HashSet<u64> = map_points.iter().map(|c| c.id).collect();

        let records: Vec<_> = stored
            .requests
            .into_iter()
            .map(StoredRequest::into_record)
            .collect();
        let mut request_ids = IdAllocator::new(
            "request",
            stored.next_request_id,
            request_floor,
            records.iter().filter_map(|r| r.id),
        )?;
        let mut requests = Vec::with_capacity(records.len());
        for record in records {
            let text = sanitize_text(&record.text);
            if text.is_empty() {
                continue;
            }
            requests.push(Request {
                id: request_ids.claim(record.id)?,
                text,
                club_id: record.club_id.filter(|id| known_clubs.contains(id)),
                created_at: record.created_at.unwrap_or(now),
                updated_at: record.updated_at,
            });
        }

        Ok(Self {
            requests,
            map_points,
            completed_count: stored.completed_count,
            next_request_id: request_ids.next,
            next_club_id: club_ids.next,
            last_updated: stored.last_updated,
        })
    }
}

impl TryFrom<StoredData> for AppData {
    type Error = IdError;

    fn try_from(stored: StoredData) -> Result<Self, Self::Error> {
        Self::from_stored(stored, 1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legacy_string_array_is_normalized() {
        let data: AppData = serde_json::from_str(r#"["Call Ivanov", "Send documents"]"#).unwrap();

        assert_eq!(data.requests.len(), 2);
        assert_eq!(data.requests[0].id, 1);
        assert_eq!(data.requests[0].text, "Call Ivanov");
        assert_eq!(data.requests[1].id, 2);
        assert_eq!(data.next_request_id, 3);
        assert!(data.map_points.is_empty());
    }

    #[test]
    fn test_mixed_legacy_entries_keep_existing_ids() {
        let data: AppData = serde_json::from_str(
            r#"[{"id": 1700000000000, "text": "Old object"}, "Old string"]"#,
        )
        .unwrap();

        assert_eq!(data.requests[0].id, 1_700_000_000_000);
        assert_eq!(data.requests[1].id, 1_700_000_000_001);
        assert_eq!(data.next_request_id, 1_700_000_000_002);
    }

    #[test]
    fn test_counters_never_fall_below_stored_value() {
        let data: AppData = serde_json::from_str(
            r#"{"requests": [{"id": 2, "text": "a"}], "nextRequestId": 10, "nextClubId": 4}"#,
        )
        .unwrap();

        assert_eq!(data.next_request_id, 10);
        assert_eq!(data.next_club_id, 4);
    }

    #[test]
    fn test_duplicate_ids_are_reassigned() {
        let data: AppData = serde_json::from_str(
            r#"{"requests": [{"id": 5, "text": "a"}, {"id": 5, "text": "b"}]}"#,
        )
        .unwrap();

        assert_eq!(data.requests[0].id, 5);
        assert_eq!(data.requests[1].id, 6);
        assert_eq!(data.next_request_id, 7);
    }

    #[test]
    fn test_dangling_club_reference_is_cleared() {
        let data: AppData = serde_json::from_str(
            r#"{
                "requests": [{"id": 1, "text": "a", "clubId": 9}, {"id": 2, "text": "b", "clubId": 1}],
                "mapPoints": [{"id": 1, "name": "Club", "lat": 1.0, "lng": 2.0}]
            }"#,
        )
        .unwrap();

        assert_eq!(data.requests[0].club_id, None);
        assert_eq!(data.requests[1].club_id, Some(1));
    }

    #[test]
    fn test_fresh_ids_start_at_floor() {
        let stored: StoredData =
            serde_json::from_str(r#"[{"id": 2, "text": "Kept id"}, "New entry"]"#).unwrap();
        let data = AppData::from_stored(stored, 10, 4).unwrap();

        assert_eq!(data.requests[0].id, 2);
        assert_eq!(data.requests[1].id, 10);
        assert_eq!(data.next_request_id, 11);
        assert_eq!(data.next_club_id, 4);
    }

    #[test]
    fn test_id_above_maximum_is_rejected() {
        let result = serde_json::from_str::<AppData>(
            r#"{"requests": [{"id": 18446744073709551615, "text": "a"}, "b"]}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("larger than the maximum id"), "{err}");
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let stored: StoredData = serde_json::from_str(&format!(
            r#"{{"requests": [{{"id": {MAX_ID}, "text": "last"}}, "one too many"]}}"#
        ))
        .unwrap();

        assert_eq!(
            AppData::from_stored(stored, 1, 1).unwrap_err(),
            IdError::Exhausted("request")
        );
    }

    #[test]
    fn test_take_id_stops_at_maximum() {
        let mut next = MAX_ID;
        assert_eq!(take_id(&mut next), Some(MAX_ID));
        assert_eq!(take_id(&mut next), None);
        assert_eq!(next, MAX_ID + 1);

        let mut next = u64::MAX;
        assert_eq!(take_id(&mut next), None);
    }

    #[test]
    fn test_canonical_document_survives_serialization() {
        let mut data = AppData::default();
        data.requests.push(Request {
            id: 1,
            text: "Call client".to_string(),
            club_id: None,
            created_at: Utc::now(),
            updated_at: None,
        });
        data.next_request_id = 2;
        data.completed_count = 3;

        let json = serde_json::to_string(&data).unwrap();
        let back: AppData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
