//! Semantic timer events derived from consecutive snapshots.
//!
//! The core never delivers notifications; it only tells an observer what
//! happened (started, stopped, finished, a new plan segment began) and leaves
//! presentation to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::plan::{ActiveSegment, DayPlan, SegmentKind};
use crate::timer::{TimerSnapshot, TimerStatus};

/// Which events the user wants. Everything is gated on `enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub on_start: bool,
    #[serde(default = "default_true")]
    pub on_stop: bool,
    #[serde(default = "default_true")]
    pub on_finish: bool,
    #[serde(default = "default_true")]
    pub on_segment_change: bool,
    #[serde(default = "default_true")]
    pub on_break: bool,
    #[serde(default = "default_true")]
    pub on_lunch: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            on_start: true,
            on_stop: true,
            on_finish: true,
            on_segment_change: true,
            on_break: true,
            on_lunch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationEvent {
    TimerStarted {
        #[serde(with = "crate::secs")]
        total: Duration,
    },
    TimerStopped,
    TimerFinished,
    SegmentChanged {
        from: Option<ActiveSegment>,
        to: ActiveSegment,
    },
    BreakStarted {
        to: ActiveSegment,
    },
    LunchStarted {
        to: ActiveSegment,
    },
}

/// Events implied by one status/segment transition. Usually empty or one item.
pub fn detect(
    previous_status: TimerStatus,
    current_status: TimerStatus,
    previous_segment: Option<&ActiveSegment>,
    current_segment: Option<&ActiveSegment>,
    total: Duration,
    settings: &NotificationSettings,
) -> Vec<NotificationEvent> {
    if !settings.enabled {
        return Vec::new();
    }

    let mut events = Vec::new();

    if settings.on_start && previous_status == TimerStatus::Idle && current_status == TimerStatus::Running {
        events.push(NotificationEvent::TimerStarted { total });
    }

    if settings.on_stop
        && matches!(previous_status, TimerStatus::Running | TimerStatus::Paused)
        && current_status == TimerStatus::Idle
    {
        events.push(NotificationEvent::TimerStopped);
    }

    if settings.on_finish && previous_status != TimerStatus::Finished && current_status == TimerStatus::Finished {
        events.push(NotificationEvent::TimerFinished);
    }

    if let Some(to) = current_segment {
        if settings.on_segment_change && previous_segment.map(|p| p.index) != Some(to.index) {
            events.push(NotificationEvent::SegmentChanged {
                from: previous_segment.cloned(),
                to: to.clone(),
            });
            if settings.on_break && to.kind == SegmentKind::Break {
                events.push(NotificationEvent::BreakStarted { to: to.clone() });
            }
            if settings.on_lunch && to.kind == SegmentKind::Lunch {
                events.push(NotificationEvent::LunchStarted { to: to.clone() });
            }
        }
    }

    events
}

/// Remembers the previous snapshot's status and segment so a stream of
/// snapshots can be turned into events.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiffer {
    previous_status: TimerStatus,
    previous_segment: Option<ActiveSegment>,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(
        &mut self,
        snapshot: &TimerSnapshot,
        plan: &DayPlan,
        settings: &NotificationSettings,
    ) -> Vec<NotificationEvent> {
        let total = Self::total_duration(snapshot, plan);
        let segment = Self::active_segment(snapshot, plan);

        let events = detect(
            self.previous_status,
            snapshot.status,
            self.previous_segment.as_ref(),
            segment.as_ref(),
            total,
            settings,
        );

        self.previous_status = snapshot.status;
        self.previous_segment = segment;
        events
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn total_duration(snapshot: &TimerSnapshot, plan: &DayPlan) -> Duration {
        let plan_total = plan.total_duration();
        if !plan_total.is_zero() {
            return plan_total;
        }
        snapshot.target.unwrap_or(Duration::ZERO)
    }

    fn active_segment(snapshot: &TimerSnapshot, plan: &DayPlan) -> Option<ActiveSegment> {
        match snapshot.status {
            TimerStatus::Running | TimerStatus::Paused => plan.active_segment(snapshot.remaining()?),
            TimerStatus::Idle | TimerStatus::Finished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanSegment;

    fn enabled() -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            ..Default::default()
        }
    }

    fn segment(index: usize, kind: SegmentKind) -> ActiveSegment {
        ActiveSegment {
            index,
            kind,
            title: kind.default_title().to_string(),
            remaining: Duration::from_secs(60),
            duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn disabled_settings_emit_nothing() {
        let events = detect(
            TimerStatus::Idle,
            TimerStatus::Running,
            None,
            None,
            Duration::from_secs(60),
            &NotificationSettings::default(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn status_transitions() {
        let s = enabled();
        let total = Duration::from_secs(90);
        assert_eq!(
            detect(TimerStatus::Idle, TimerStatus::Running, None, None, total, &s),
            vec![NotificationEvent::TimerStarted { total }]
        );
        assert_eq!(
            detect(TimerStatus::Paused, TimerStatus::Idle, None, None, total, &s),
            vec![NotificationEvent::TimerStopped]
        );
        assert_eq!(
            detect(TimerStatus::Running, TimerStatus::Finished, None, None, total, &s),
            vec![NotificationEvent::TimerFinished]
        );
        assert!(detect(TimerStatus::Finished, TimerStatus::Idle, None, None, total, &s).is_empty());
        assert!(detect(TimerStatus::Paused, TimerStatus::Running, None, None, total, &s).is_empty());
    }

    #[test]
    fn segment_change_with_break_and_lunch_variants() {
        let s = enabled();
        let work = segment(0, SegmentKind::Work);
        let brk = segment(1, SegmentKind::Break);
        let lunch = segment(2, SegmentKind::Lunch);
        let t = Duration::ZERO;

        let events = detect(TimerStatus::Running, TimerStatus::Running, Some(&work), Some(&brk), t, &s);
        assert_eq!(
            events,
            vec![
                NotificationEvent::SegmentChanged {
                    from: Some(work.clone()),
                    to: brk.clone()
                },
                NotificationEvent::BreakStarted { to: brk.clone() },
            ]
        );

        let events = detect(TimerStatus::Running, TimerStatus::Running, Some(&brk), Some(&lunch), t, &s);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], NotificationEvent::LunchStarted { .. }));

        assert!(detect(TimerStatus::Running, TimerStatus::Running, Some(&brk), Some(&brk), t, &s).is_empty());

        let quiet = NotificationSettings {
            on_break: false,
            ..enabled()
        };
        let events = detect(TimerStatus::Running, TimerStatus::Running, Some(&work), Some(&brk), t, &quiet);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn differ_tracks_plan_segments() {
        let plan = DayPlan::new(vec![
            PlanSegment::new(SegmentKind::Work, "", Duration::from_secs(600)),
            PlanSegment::new(SegmentKind::Break, "", Duration::from_secs(300)),
        ]);
        let total = plan.total_duration();
        let s = enabled();
        let mut differ = SnapshotDiffer::new();

        assert!(differ.process(&TimerSnapshot::idle(), &plan, &s).is_empty());

        let started = TimerSnapshot {
            status: TimerStatus::Running,
            elapsed: Duration::ZERO,
            target: Some(total),
        };
        let events = differ.process(&started, &plan, &s);
        assert_eq!(events[0], NotificationEvent::TimerStarted { total });
        assert!(matches!(events[1], NotificationEvent::SegmentChanged { from: None, .. }));

        let in_break = TimerSnapshot {
            elapsed: Duration::from_secs(650),
            ..started
        };
        let events = differ.process(&in_break, &plan, &s);
        assert!(matches!(events[0], NotificationEvent::SegmentChanged { .. }));
        assert!(matches!(events[1], NotificationEvent::BreakStarted { .. }));

        let finished = TimerSnapshot {
            status: TimerStatus::Finished,
            elapsed: total,
            target: Some(total),
        };
        assert_eq!(differ.process(&finished, &plan, &s), vec![NotificationEvent::TimerFinished]);
    }

    #[test]
    fn event_json_is_tagged() {
        let json = serde_json::to_value(NotificationEvent::TimerStarted {
            total: Duration::from_secs(60),
        })
        .unwrap();
        assert_eq!(json["type"], "TimerStarted");
        assert_eq!(json["total"], 60.0);
    }
}
