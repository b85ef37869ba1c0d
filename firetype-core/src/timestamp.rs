//! Nanosecond-precision point in time, as reported by the backend for reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DatabaseError, DatabaseResult};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Seconds and nanoseconds since the Unix epoch.
///
/// Ordering is chronological: seconds first, then nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since Unix epoch
    pub seconds: i64,

    /// Nanoseconds component (0-999,999,999)
    pub nanoseconds: i32,
}

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp { seconds: 0, nanoseconds: 0 };

    /// Creates a timestamp, rejecting a nanoseconds component outside `[0, 999999999]`.
    pub fn new(seconds: i64, nanoseconds: i32) -> DatabaseResult<Self> {
        if !(0..NANOS_PER_SECOND as i32).contains(&nanoseconds) {
            return Err(DatabaseError::InvalidArgument(format!(
                "nanoseconds must be in range [0, 999999999], got {}",
                nanoseconds
            )));
        }

        Ok(Self { seconds, nanoseconds })
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanoseconds: dt.timestamp_subsec_nanos() as i32,
        }
    }

    /// Converts to a chrono `DateTime`, saturating to the epoch when out of chrono's range.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds as u32).unwrap_or_default()
    }

    /// Creates a timestamp from nanoseconds since the epoch.
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            seconds: nanos.div_euclid(NANOS_PER_SECOND),
            nanoseconds: nanos.rem_euclid(NANOS_PER_SECOND) as i32,
        }
    }

    /// Nanoseconds since the epoch, saturating at the bounds of `i64`.
    pub fn as_nanos(&self) -> i64 {
        self.seconds
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(self.nanoseconds as i64)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl From<Timestamp> for bson::Bson {
    /// Stores the timestamp as a BSON datetime (millisecond precision).
    fn from(ts: Timestamp) -> Self {
        bson::Bson::DateTime(bson::DateTime::from_chrono(ts.to_datetime()))
    }
}
