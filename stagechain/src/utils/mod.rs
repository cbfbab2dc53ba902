//! Utility functions for ids and timestamps.

pub mod timestamps;

pub use timestamps::{iso_timestamp, now, parse_timestamp, Timestamp, TimestampError};

use uuid::Uuid;

/// Generates a random (v4) UUID.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}
