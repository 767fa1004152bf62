//! Temporal normalization layer
//!
//! Timestamps are stored zone-naive. On write, instants are rounded to
//! millisecond precision so sub-millisecond noise from upstream producers
//! cannot cause spurious inequality on round-trip. On read, the backend
//! may report wall-clock fields that were written in the local zone but
//! come back labeled UTC; [`TimestampPolicy`] decides once per process
//! whether those fields must be reinterpreted as local.
//!
//! The wire format accepted from agents is a numeric UNIX timestamp with
//! fractional seconds, e.g. `1619335137.3324468`.

use chrono::{DateTime, Duration, DurationRound, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::backend::Dialect;
use crate::error::{StorageError, StorageResult};

/// Read-side timestamp handling, resolved once at connection setup and
/// threaded explicitly through decoding code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPolicy {
    /// When true, a naive timestamp read from storage carries wall-clock
    /// fields that were originally local; reinterpret them as local
    /// instead of converting from UTC.
    pub reinterpret_utc_as_local: bool,
}

impl TimestampPolicy {
    /// Policy for the given backend dialect.
    ///
    /// The Postgres driver returns `timestamp` columns labeled UTC even
    /// though the wall-clock fields were written in the application's
    /// local zone. This depends on driver behavior and should be
    /// re-validated when the driver is upgraded.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            reinterpret_utc_as_local: dialect == Dialect::Postgres,
        }
    }

    /// Policy for backends that preserve zone-aware instants correctly
    pub fn passthrough() -> Self {
        Self {
            reinterpret_utc_as_local: false,
        }
    }
}

/// A point in time carried through the storage layer
///
/// Wraps a local-zone instant; comparisons and round-trips are defined
/// to millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemporalValue(DateTime<Local>);

fn round_millis(t: DateTime<Local>) -> DateTime<Local> {
    t.duration_round(Duration::milliseconds(1)).unwrap_or(t)
}

impl TemporalValue {
    /// Wrap an instant, rounding to millisecond precision
    pub fn new(t: DateTime<Local>) -> Self {
        Self(round_millis(t))
    }

    /// The current instant
    pub fn now() -> Self {
        Self::new(Local::now())
    }

    /// Build from epoch seconds and nanoseconds
    pub fn from_timestamp(secs: i64, nanos: u32) -> StorageResult<Self> {
        let utc = DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(|| {
            StorageError::TemporalParse(format!("epoch seconds {} out of range", secs))
        })?;
        Ok(Self::new(utc.with_timezone(&Local)))
    }

    /// Parse the numeric wire format `<integer-seconds>.<fractional-seconds>`.
    ///
    /// The fraction is interpreted digit-exact to nanosecond precision;
    /// no float round-trip is involved. Surrounding quotes are tolerated
    /// because agents send the value as a JSON string or number
    /// interchangeably. Negative values are rejected outright: pre-epoch
    /// instants never occur in legitimate input and a sign-unaware
    /// seconds/fraction split would mis-combine them.
    pub fn parse_wire(raw: &str) -> StorageResult<Self> {
        let trimmed = raw.trim().trim_matches('"');
        if trimmed.is_empty() {
            return Err(StorageError::TemporalParse("empty timestamp".to_string()));
        }
        if trimmed.starts_with('-') {
            return Err(StorageError::TemporalParse(trimmed.to_string()));
        }
        let (secs_part, frac_part) = match trimmed.split_once('.') {
            Some((s, f)) => (s, f),
            None => (trimmed, ""),
        };
        let secs: i64 = secs_part
            .parse()
            .map_err(|_| StorageError::TemporalParse(trimmed.to_string()))?;
        let nanos = parse_fraction_nanos(frac_part)
            .ok_or_else(|| StorageError::TemporalParse(trimmed.to_string()))?;
        Self::from_timestamp(secs, nanos)
    }

    /// The value to persist: naive local wall-clock, millisecond precision
    pub fn to_storage(&self) -> NaiveDateTime {
        self.0.naive_local()
    }

    /// Rebuild from a stored naive timestamp under the given policy.
    ///
    /// With `reinterpret_utc_as_local` the wall-clock fields are tagged
    /// with the local zone directly (no numeric shift); otherwise the
    /// value is interpreted as UTC and converted.
    pub fn from_storage(raw: NaiveDateTime, policy: &TimestampPolicy) -> Self {
        let local = if policy.reinterpret_utc_as_local {
            match Local.from_local_datetime(&raw).earliest() {
                Some(t) => t,
                // nonexistent local time (DST gap); fall back to UTC reading
                None => Utc.from_utc_datetime(&raw).with_timezone(&Local),
            }
        } else {
            Utc.from_utc_datetime(&raw).with_timezone(&Local)
        };
        Self::new(local)
    }

    /// The wrapped local-zone instant
    pub fn datetime(&self) -> DateTime<Local> {
        self.0
    }

    /// Epoch seconds
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }

    /// An instant is valid only if its epoch-seconds value is
    /// non-negative; negative values indicate corrupt or underflowed
    /// input
    pub fn is_valid(&self) -> bool {
        self.0.timestamp() >= 0
    }
}

impl From<DateTime<Local>> for TemporalValue {
    fn from(t: DateTime<Local>) -> Self {
        Self::new(t)
    }
}

impl From<TemporalValue> for crate::backend::SqlValue {
    fn from(t: TemporalValue) -> Self {
        crate::backend::SqlValue::Timestamp(t.to_storage())
    }
}

impl fmt::Display for TemporalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interpret a fractional-seconds suffix as nanoseconds, digit-exact.
/// Digits beyond nanosecond precision are truncated.
fn parse_fraction_nanos(frac: &str) -> Option<u32> {
    if frac.is_empty() {
        return Some(0);
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut nanos: u32 = 0;
    for (i, b) in frac.bytes().take(9).enumerate() {
        nanos += u32::from(b - b'0') * 10u32.pow(8 - i as u32);
    }
    Some(nanos)
}

impl Serialize for TemporalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

struct TemporalVisitor;

impl<'de> Visitor<'de> for TemporalVisitor {
    type Value = TemporalValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a UNIX timestamp as number or numeric string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        TemporalValue::parse_wire(v).map_err(de::Error::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(de::Error::custom("non-finite timestamp"));
        }
        let secs = v.trunc() as i64;
        let nanos = (v.fract().abs() * 1e9).round() as u32;
        TemporalValue::from_timestamp(secs, nanos.min(999_999_999)).map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        TemporalValue::from_timestamp(v, 0).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let secs = i64::try_from(v).map_err(|_| de::Error::custom("timestamp out of range"))?;
        TemporalValue::from_timestamp(secs, 0).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for TemporalValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TemporalVisitor)
    }
}
