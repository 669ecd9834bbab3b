//! Declarative recurring auto start/stop window.

use std::collections::BTreeSet;
use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::time::{LocalTime, Weekday};

/// A daily auto start/stop window.
///
/// The schedule is date-free: it stores times of day, the active weekdays and
/// how to interpret them in a zone. A window whose start equals its stop is
/// undefined and never produces events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    #[serde(default = "default_start")]
    pub start_time: LocalTime,
    #[serde(default = "default_stop")]
    pub stop_time: LocalTime,
    #[serde(default)]
    pub weekdays: BTreeSet<Weekday>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub time_zone: TimeZoneMode,
    #[serde(default)]
    pub dst_policy: DstPolicy,
}

impl RecurringSchedule {
    /// True when the window runs past midnight, e.g. 22:00 → 06:00.
    pub fn crosses_midnight(&self) -> bool {
        self.start_time > self.stop_time
    }

    /// Enabled with at least one weekday selected.
    pub fn is_actionable(&self) -> bool {
        self.enabled && !self.weekdays.is_empty()
    }

    pub fn is_zero_length(&self) -> bool {
        self.start_time == self.stop_time
    }
}

impl Default for RecurringSchedule {
    fn default() -> Self {
        Self {
            start_time: default_start(),
            stop_time: default_stop(),
            weekdays: BTreeSet::new(),
            enabled: false,
            time_zone: TimeZoneMode::System,
            dst_policy: DstPolicy::default(),
        }
    }
}

const DEFAULT_START: LocalTime = LocalTime::from_hm(9, 0);
const DEFAULT_STOP: LocalTime = LocalTime::from_hm(18, 0);

fn default_start() -> LocalTime {
    DEFAULT_START
}

fn default_stop() -> LocalTime {
    DEFAULT_STOP
}

// ── Time zone ────────────────────────────────────────────────────────

/// How the schedule's local times are anchored to real instants.
///
/// Serialized as the string `"system"` or an IANA identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimeZoneMode {
    /// The host's current zone, read at every calculation.
    #[default]
    System,
    /// A named IANA zone such as `Europe/Kyiv`.
    Fixed(String),
}

/// A zone resolved for one calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedZone {
    System,
    Named(Tz),
}

impl TimeZoneMode {
    /// Resolve to a usable zone. Unknown identifiers fall back to the host zone.
    pub fn resolve(&self) -> ResolvedZone {
        match self {
            TimeZoneMode::System => ResolvedZone::System,
            TimeZoneMode::Fixed(id) => match id.parse::<Tz>() {
                Ok(tz) => ResolvedZone::Named(tz),
                Err(_) => {
                    tracing::warn!(zone = %id, "unknown time zone identifier, using system zone");
                    ResolvedZone::System
                }
            },
        }
    }
}

impl From<String> for TimeZoneMode {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("system") {
            TimeZoneMode::System
        } else {
            TimeZoneMode::Fixed(trimmed.to_string())
        }
    }
}

impl From<TimeZoneMode> for String {
    fn from(value: TimeZoneMode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeZoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneMode::System => f.write_str("system"),
            TimeZoneMode::Fixed(id) => f.write_str(id),
        }
    }
}

// ── DST policy ───────────────────────────────────────────────────────

/// What to do with a local time that does not exist (spring forward).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTimePolicy {
    /// Skip the occurrence entirely.
    Strict,
    /// Use the first instant after the gap.
    #[default]
    NextTime,
}

/// Which instant to use for a local time that occurs twice (fall back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatedTimePolicy {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DstPolicy {
    #[serde(default)]
    pub missing_time: MissingTimePolicy,
    #[serde(default)]
    pub repeated_time: RepeatedTimePolicy,
}

impl DstPolicy {
    pub fn new(missing_time: MissingTimePolicy, repeated_time: RepeatedTimePolicy) -> Self {
        Self {
            missing_time,
            repeated_time,
        }
    }
}
