//! Input validation constants and utilities for SQLite storage.
//!
//! Events and summaries originate outside the service, so their sizes are
//! bounded before they reach the disk.

pub use matchlink_store_traits::events::{
    MAX_EVENT_PAYLOAD_SIZE, MAX_EVENT_TYPE_LENGTH, MAX_EVENTS_PER_SESSION,
};

use crate::error::Error;

/// Maximum size for a serialized session summary (1 MB)
pub const MAX_SUMMARY_SIZE: usize = 1024 * 1024;

/// Maximum size for a serialized match configuration (4 KB)
pub const MAX_CONFIG_SIZE: usize = 4 * 1024;

/// Validate that a byte slice does not exceed the specified maximum size.
#[inline]
pub fn validate_size(data: &[u8], max_size: usize, field_name: &str) -> Result<(), Error> {
    if data.len() > max_size {
        return Err(Error::Validation {
            field_name: field_name.to_string(),
            max_size,
            actual_size: data.len(),
        });
    }
    Ok(())
}

/// Validate that a string does not exceed the specified maximum length in bytes.
///
/// Note: This validates UTF-8 byte length, not Unicode character count.
#[inline]
pub fn validate_string_length(s: &str, max_length: usize, field_name: &str) -> Result<(), Error> {
    validate_size(s.as_bytes(), max_length, field_name)
}
