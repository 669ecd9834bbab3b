//! Serde helpers that store a `Duration` as fractional seconds.
//!
//! Negative, NaN or infinite inputs decode as zero rather than failing, so a
//! hand-edited file never prevents the rest of a record from loading. Finite
//! values too large for a `Duration` saturate to `Duration::MAX`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn from_f64(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    f64::deserialize(deserializer).map(from_f64)
}

/// Same encoding for `Option<Duration>`, with `null` for `None`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer).map(|v| v.map(from_f64))
    }
}
