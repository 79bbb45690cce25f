//! Epoch arithmetic for `Date` values.
//!
//! On the wire a date is an `f64` count of milliseconds since
//! 1970-01-01T00:00:00Z, which is the native engine's own time value. The
//! bridge converts `chrono` instants with [`to_wire`] and [`from_wire`].
//!
//! [`ticks_to_wire`] and [`wire_to_ticks`] are helpers for hosts that keep
//! their own 100ns tick counts from 0001-01-01 and want to build or read a
//! raw wire date; the bridge itself never calls them. Both directions share
//! the same two constants.

use chrono::{DateTime, Utc};

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Added on encode, subtracted on decode.
///
/// Zero once both sides number months from the same base and the wire stays
/// in UTC. A nonzero value of 31 days minus one hour is the signature of a
/// zero-based month compared against a one-based month across a DST change.
pub const COMPENSATION_TICKS: i64 = 0;

pub fn ticks_to_wire(ticks: i64) -> f64 {
    let since_epoch = i128::from(ticks) - i128::from(UNIX_EPOCH_TICKS) + i128::from(COMPENSATION_TICKS);
    since_epoch as f64 / TICKS_PER_MILLISECOND as f64
}

/// `None` for NaN, infinities and values outside the `i64` tick range.
pub fn wire_to_ticks(millis: f64) -> Option<i64> {
    if !millis.is_finite() {
        return None;
    }
    let since_epoch = (millis * TICKS_PER_MILLISECOND as f64).round();
    if since_epoch.abs() >= i64::MAX as f64 {
        return None;
    }
    (since_epoch as i64)
        .checked_add(UNIX_EPOCH_TICKS)?
        .checked_sub(COMPENSATION_TICKS)
}

/// Keeps microsecond resolution; the engine itself truncates to milliseconds.
pub fn to_wire(at: &DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000.0
}

/// Rounds to the nearest microsecond. `None` if the value is not a
/// representable instant.
pub fn from_wire(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    // Saturating cast; out-of-range instants are rejected by chrono.
    DateTime::from_timestamp_micros((millis * 1_000.0).round() as i64)
}
