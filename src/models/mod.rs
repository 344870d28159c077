//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the persisted records and the request/response structures used by the API.

pub mod app_data;
pub mod club;
pub mod import;
pub mod request;

// Re-export commonly used types
pub use app_data::*;
pub use club::*;
pub use import::*;
pub use request::*;
