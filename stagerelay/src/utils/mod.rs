//! Utility functions for identifiers and timestamp handling.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{
    display_stamp, file_stamp, format_iso8601, iso_timestamp, now_utc, parse_timestamp,
    Timestamp, TimestampError,
};
pub use uuid_utils::{generate_uuid, generate_uuid_v7, next_sequence, run_tag, short_id};
