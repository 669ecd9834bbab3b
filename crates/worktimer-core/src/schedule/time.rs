//! Date-free time values: a wall-clock time of day and an ISO weekday.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A wall-clock hour and minute with no date or zone attached.
///
/// Ordered by minutes since midnight. Serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalTime {
    // Field order matters for the derived ordering.
    hour: u32,
    minute: u32,
}

impl LocalTime {
    /// Create a local time, rejecting hours outside `0..=23` and minutes outside `0..=59`.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidLocalTime { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    /// Const constructor for literals; out-of-range input fails const evaluation.
    pub const fn from_hm(hour: u32, minute: u32) -> Self {
        assert!(hour < 24 && minute < 60, "local time out of range");
        Self { hour, minute }
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    pub fn minute(self) -> u32 {
        self.minute
    }

    /// Minutes elapsed since 00:00.
    pub fn minutes_since_midnight(self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// The same time as a `NaiveTime` at second zero.
    pub fn to_naive(self) -> NaiveTime {
        // Both fields are range-checked at construction.
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for LocalTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedLocalTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(malformed)?;
        let hour = h.parse::<u32>().map_err(|_| malformed())?;
        let minute = m.parse::<u32>().map_err(|_| malformed())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for LocalTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalTime> for String {
    fn from(value: LocalTime) -> Self {
        value.to_string()
    }
}

/// A day of the week, numbered the ISO way: Monday = 1 … Sunday = 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    #[serde(alias = "mon")]
    Monday,
    #[serde(alias = "tue")]
    Tuesday,
    #[serde(alias = "wed")]
    Wednesday,
    #[serde(alias = "thu")]
    Thursday,
    #[serde(alias = "fri")]
    Friday,
    #[serde(alias = "sat")]
    Saturday,
    #[serde(alias = "sun")]
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// ISO number, Monday = 1 … Sunday = 7.
    pub fn iso_number(self) -> u32 {
        match self {
            Weekday::Monday => 1,
            Weekday::Tuesday => 2,
            Weekday::Wednesday => 3,
            Weekday::Thursday => 4,
            Weekday::Friday => 5,
            Weekday::Saturday => 6,
            Weekday::Sunday => 7,
        }
    }

    pub fn from_iso_number(n: u32) -> Result<Self, ValidationError> {
        match n {
            1..=7 => Ok(Self::ALL[(n - 1) as usize]),
            _ => Err(ValidationError::InvalidWeekday(n)),
        }
    }

    /// Calendar number as used by Gregorian calendar APIs, Sunday = 1 … Saturday = 7.
    pub fn calendar_number(self) -> u32 {
        self.iso_number() % 7 + 1
    }

    pub fn from_calendar_number(n: u32) -> Result<Self, ValidationError> {
        match n {
            1 => Ok(Weekday::Sunday),
            2..=7 => Self::from_iso_number(n - 1),
            _ => Err(ValidationError::InvalidWeekday(n)),
        }
    }

    /// The following day, wrapping Sunday to Monday.
    pub fn next(self) -> Self {
        Self::ALL[(self.iso_number() % 7) as usize]
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }

    fn full_name(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Weekday::Monday => "mon",
            Weekday::Tuesday => "tue",
            Weekday::Wednesday => "wed",
            Weekday::Thursday => "thu",
            Weekday::Friday => "fri",
            Weekday::Saturday => "sat",
            Weekday::Sunday => "sun",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        Self::ALL[value.num_days_from_monday() as usize]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Accepts full names, three-letter abbreviations and ISO numbers.
impl FromStr for Weekday {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if let Ok(n) = lowered.parse::<u32>() {
            return Self::from_iso_number(n);
        }
        Self::ALL
            .into_iter()
            .find(|d| d.short_name() == lowered || (lowered.len() >= 3 && d.full_name().starts_with(&lowered)))
            .ok_or_else(|| ValidationError::UnknownWeekday(s.to_string()))
    }
}
