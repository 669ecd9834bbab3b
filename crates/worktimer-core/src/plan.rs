//! Multi-segment day plans.
//!
//! A plan is an ordered list of segments (work, break, lunch...). Running the
//! timer against a plan uses the plan's total duration as the target, and the
//! segment that is active is derived from elapsed or remaining time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::storage::data_dir;

pub const DAY_PLAN_FILE: &str = "day_plan.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Work,
    #[serde(alias = "breakTime")]
    Break,
    Lunch,
    Custom,
}

impl SegmentKind {
    pub fn default_title(self) -> &'static str {
        match self {
            SegmentKind::Work => "Work",
            SegmentKind::Break => "Break",
            SegmentKind::Lunch => "Lunch",
            SegmentKind::Custom => "Custom",
        }
    }
}

impl std::str::FromStr for SegmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(SegmentKind::Work),
            "break" => Ok(SegmentKind::Break),
            "lunch" => Ok(SegmentKind::Lunch),
            "custom" => Ok(SegmentKind::Custom),
            other => Err(format!("unknown segment kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSegment {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: SegmentKind,
    #[serde(default)]
    pub title: String,
    #[serde(with = "crate::secs")]
    pub duration: Duration,
}

impl PlanSegment {
    pub fn new(kind: SegmentKind, title: &str, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.trim().to_string(),
            duration,
        }
    }

    /// The title, or the kind's default when blank.
    pub fn resolved_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            self.kind.default_title()
        } else {
            trimmed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub segments: Vec<PlanSegment>,
}

impl Default for DayPlan {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Where in a plan a given elapsed time falls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPosition {
    pub index: usize,
    pub segment: PlanSegment,
    pub elapsed_in_segment: Duration,
    pub remaining_in_segment: Duration,
}

/// The active segment as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSegment {
    pub index: usize,
    pub kind: SegmentKind,
    pub title: String,
    #[serde(with = "crate::secs")]
    pub remaining: Duration,
    #[serde(with = "crate::secs")]
    pub duration: Duration,
}

impl DayPlan {
    pub fn new(segments: Vec<PlanSegment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            segments,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.segments
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
    }

    /// Segment containing `elapsed`, or `None` once past the end.
    ///
    /// A zero-length segment matches only when `elapsed` sits exactly on its start.
    pub fn position(&self, elapsed: Duration) -> Option<SegmentPosition> {
        let mut cursor = Duration::ZERO;
        for (index, segment) in self.segments.iter().enumerate() {
            let start = cursor;
            let end = cursor.saturating_add(segment.duration);
            if elapsed < end || (segment.duration.is_zero() && elapsed == start) {
                let elapsed_in_segment = elapsed.saturating_sub(start);
                return Some(SegmentPosition {
                    index,
                    segment: segment.clone(),
                    elapsed_in_segment,
                    remaining_in_segment: segment.duration.saturating_sub(elapsed_in_segment),
                });
            }
            cursor = end;
        }
        None
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        let total = self.total_duration();
        !total.is_zero() && elapsed >= total
    }

    /// Active segment given the time left on the whole plan.
    pub fn active_segment(&self, total_remaining: Duration) -> Option<ActiveSegment> {
        let total = self.total_duration();
        if total.is_zero() {
            return None;
        }
        let elapsed = total - total_remaining.min(total);

        let mut cursor = Duration::ZERO;
        for (index, segment) in self.segments.iter().enumerate() {
            let next = cursor.saturating_add(segment.duration);
            if elapsed < next {
                return Some(ActiveSegment {
                    index,
                    kind: segment.kind,
                    title: segment.resolved_title().to_string(),
                    remaining: segment.duration.saturating_sub(elapsed.saturating_sub(cursor)),
                    duration: segment.duration,
                });
            }
            cursor = next;
        }
        None
    }
}

/// Countdown target: the plan's total when it has one, else `minutes`.
pub fn resolve_target(plan: Option<&DayPlan>, minutes: u32) -> Duration {
    match plan.map(DayPlan::total_duration) {
        Some(total) if !total.is_zero() => total,
        _ => minutes_to_duration(minutes),
    }
}

/// `max(1, minutes)` whole minutes.
pub fn minutes_to_duration(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes.max(1)) * 60)
}

// ── Repository ───────────────────────────────────────────────────────

/// JSON file holding the current day plan.
#[derive(Debug, Clone)]
pub struct DayPlanRepository {
    path: PathBuf,
}

impl DayPlanRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository at `<data_dir>/day_plan.json`.
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::new(data_dir()?.join(DAY_PLAN_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored plan, or an empty plan if missing or unreadable.
    pub fn load(&self) -> DayPlan {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DayPlan::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read day plan");
                return DayPlan::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupted day plan, using empty plan");
                DayPlan::default()
            }
        }
    }

    pub fn save(&self, plan: &DayPlan) {
        let result = serde_json::to_vec_pretty(plan)
            .map_err(std::io::Error::from)
            .and_then(|bytes| crate::storage::write_atomic(&self.path, &bytes));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to save day plan");
        }
    }
}
