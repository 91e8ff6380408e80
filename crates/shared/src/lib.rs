//! Shared types for the CareNet dashboard and its real-time event feed.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
