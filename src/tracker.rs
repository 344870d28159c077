//! Request tracker operations
//!
//! Everything the tracker can do to its data: adding, editing, completing and
//! picking requests, managing clubs, and merging bulk input. Handlers wrap these
//! in [`DataStore::update`](crate::store::DataStore::update) so each call is one
//! read-modify-write cycle.

use crate::error::{not_found_error, validation_error, AppError};
use crate::models::app_data::take_id;
use crate::models::{
    sanitize_text, AppData, BulkImportPayload, BulkImportSummary, Club, ClubFields,
    CompletedRequest, DeletedClub, Request, StoredRequest,
};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use tracing::info;

/// One spreadsheet row reduced to the two fields the tracker keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub number: String,
    pub contact: String,
}

impl ImportEntry {
    /// Text of the request created for this entry.
    ///
    /// Each field is sanitized on its own, so the combined text may exceed the
    /// length limit of hand-typed requests.
    pub fn request_text(&self) -> String {
        format!(
            "Request: {} — {}",
            sanitize_text(&self.number),
            sanitize_text(&self.contact)
        )
    }
}

fn clean_text(raw: &str) -> Result<String, AppError> {
    let text = sanitize_text(raw);
    if text.is_empty() {
        return Err(validation_error("Request text must not be empty"));
    }
    Ok(text)
}

impl AppData {
    fn issue_request_id(&mut self) -> Result<u64, AppError> {
        take_id(&mut self.next_request_id)
            .ok_or_else(|| validation_error("No request ids left to assign"))
    }

    fn issue_club_id(&mut self) -> Result<u64, AppError> {
        take_id(&mut self.next_club_id).ok_or_else(|| validation_error("No club ids left to assign"))
    }

    fn ensure_club(&self, club_id: Option<u64>) -> Result<(), AppError> {
        match club_id {
            Some(id) if !self.map_points.iter().any(|c| c.id == id) => {
                Err(validation_error(format!("Club {} does not exist", id)))
            }
            _ => Ok(()),
        }
    }

    fn request_index(&self, id: u64) -> Result<usize, AppError> {
        self.requests
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| not_found_error(format!("Request {} not found", id)))
    }

    fn club_index(&self, id: u64) -> Result<usize, AppError> {
        self.map_points
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| not_found_error(format!("Club {} not found", id)))
    }

    /// Requests whose text contains `search`, ignoring case; all of them without a search term
    pub fn search_requests(&self, search: Option<&str>) -> Vec<Request> {
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        match needle {
            Some(needle) => self
                .requests
                .iter()
                .filter(|r| r.text.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
            None => self.requests.clone(),
        }
    }

    /// Add a request with a freshly issued id
    pub fn add_request(&mut self, raw_text: &str, club_id: Option<u64>) -> Result<Request, AppError> {
        let text = clean_text(raw_text)?;
        self.ensure_club(club_id)?;

        let request = Request {
            id: self.issue_request_id()?,
            text,
            club_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.requests.push(request.clone());
        info!("Added request {}", request.id);
        Ok(request)
    }

    /// Edit a request's text and, when `club_id` is given, its club link
    pub fn update_request(
        &mut self,
        id: u64,
        raw_text: &str,
        club_id: Option<Option<u64>>,
    ) -> Result<Request, AppError> {
        let idx = self.request_index(id)?;
        let text = clean_text(raw_text)?;
        if let Some(club_id) = club_id {
            self.ensure_club(club_id)?;
        }

        let request = &mut self.requests[idx];
        request.text = text;
        if let Some(club_id) = club_id {
            request.club_id = club_id;
        }
        request.updated_at = Some(Utc::now());
        info!("Updated request {}", id);
        Ok(request.clone())
    }

    pub fn delete_request(&mut self, id: u64) -> Result<Request, AppError> {
        let idx = self.request_index(id)?;
        let removed = self.requests.remove(idx);
        info!("Deleted request {}", id);
        Ok(removed)
    }

    /// Mark a request done: it leaves the list and the completed counter goes up
    pub fn complete_request(&mut self, id: u64) -> Result<CompletedRequest, AppError> {
        let idx = self.request_index(id)?;
        let request = self.requests.remove(idx);
        self.completed_count += 1;
        info!("Completed request {} ({} done so far)", id, self.completed_count);
        Ok(CompletedRequest {
            request,
            completed_count: self.completed_count,
            remaining: self.requests.len(),
        })
    }

    /// Remove every request; counters are untouched
    pub fn clear_requests(&mut self) -> usize {
        let deleted = self.requests.len();
        self.requests.clear();
        info!("Deleted all {} requests", deleted);
        deleted
    }

    /// Pick a uniformly random pending request
    pub fn pick_random<R: Rng>(&self, rng: &mut R) -> Option<&Request> {
        if self.requests.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.requests.len());
        self.requests.get(idx)
    }

    pub fn add_club(&mut self, fields: ClubFields) -> Result<Club, AppError> {
        let club = Club {
            id: self.issue_club_id()?,
            name: fields.name,
            address: fields.address,
            lat: fields.lat,
            lng: fields.lng,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.map_points.push(club.clone());
        info!("Added club {} ({})", club.id, club.name);
        Ok(club)
    }

    pub fn update_club(&mut self, id: u64, fields: ClubFields) -> Result<Club, AppError> {
        let idx = self.club_index(id)?;
        let club = &mut self.map_points[idx];
        club.name = fields.name;
        club.address = fields.address;
        club.lat = fields.lat;
        club.lng = fields.lng;
        club.updated_at = Some(Utc::now());
        info!("Updated club {}", id);
        Ok(club.clone())
    }

    /// Delete a club; requests linked to it stay and lose their link
    pub fn delete_club(&mut self, id: u64) -> Result<DeletedClub, AppError> {
        let idx = self.club_index(id)?;
        let club = self.map_points.remove(idx);

        let mut unlinked_requests = 0;
        for request in self.requests.iter_mut().filter(|r| r.club_id == Some(id)) {
            request.club_id = None;
            unlinked_requests += 1;
        }
        info!("Deleted club {}, unlinked {} requests", id, unlinked_requests);
        Ok(DeletedClub {
            club,
            unlinked_requests,
        })
    }

    /// Append spreadsheet entries whose text is not already present; returns how many were added
    pub fn import_entries(&mut self, entries: &[ImportEntry]) -> Result<usize, AppError> {
        let mut known: HashSet<String> = self.requests.iter().map(|r| r.text.clone()).collect();
        let now = Utc::now();
        let mut added = 0;

        for entry in entries {
            let text = entry.request_text();
            if text.is_empty() || !known.insert(text.clone()) {
                continue;
            }
            let id = self.issue_request_id()?;
            self.requests.push(Request {
                id,
                text,
                club_id: None,
                created_at: now,
                updated_at: None,
            });
            added += 1;
        }
        info!("Imported {} of {} spreadsheet entries", added, entries.len());
        Ok(added)
    }

    /// Merge bulk input: requests by exact text, clubs by case-insensitive name
    pub fn merge_bulk(&mut self, payload: BulkImportPayload) -> Result<BulkImportSummary, AppError> {
        let mut summary = BulkImportSummary::default();

        let mut club_names: HashSet<String> = self
            .map_points
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect();
        let clubs = payload
            .clubs
            .into_iter()
            .map(|c| c.into_fields())
            .collect::<Result<Vec<_>, _>>()?;
        for fields in clubs {
            if club_names.insert(fields.name.to_lowercase()) {
                self.add_club(fields)?;
                summary.added_clubs += 1;
            } else {
                summary.skipped_clubs += 1;
            }
        }

        let mut texts: HashSet<String> = self.requests.iter().map(|r| r.text.clone()).collect();
        for entry in payload.requests {
            let record = StoredRequest::into_record(entry);
            let text = sanitize_text(&record.text);
            let club_id = record
                .club_id
                .filter(|id| self.map_points.iter().any(|c| c.id == *id));
            if text.is_empty() || !texts.insert(text.clone()) {
                summary.skipped_requests += 1;
                continue;
            }
            let id = self.issue_request_id()?;
            self.requests.push(Request {
                id,
                text,
                club_id,
                created_at: Utc::now(),
                updated_at: None,
            });
            summary.added_requests += 1;
        }

        info!(
            "Bulk import: {} requests and {} clubs added",
            summary.added_requests, summary.added_clubs
        );
        Ok(summary)
    }

    /// Replace the whole dataset, keeping counters monotonic across the swap.
    ///
    /// `incoming` should come from [`AppData::from_stored`] with this dataset's
    /// counters as floors, so none of its fresh ids were issued here before.
    pub fn replace_with(&mut self, incoming: AppData) {
        let next_request_id = self.next_request_id.max(incoming.next_request_id);
        let next_club_id = self.next_club_id.max(incoming.next_club_id);
        *self = AppData {
            next_request_id,
            next_club_id,
            ..incoming
        };
        info!(
            "Replaced dataset: {} requests, {} clubs",
            self.requests.len(),
            self.map_points.len()
        );
    }
}
