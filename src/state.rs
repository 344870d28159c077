//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::store::DataStore;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// JSON file store (has internal locking)
    pub store: DataStore,
}

impl AppState {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
