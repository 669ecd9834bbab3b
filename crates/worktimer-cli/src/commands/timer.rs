use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;
use worktimer_core::plan::{minutes_to_duration, resolve_target, ActiveSegment};
use worktimer_core::{
    DayPlanRepository, FileSettingsStore, SettingsStore, SystemClock, TimerEngine, TimerSnapshot, TimerStatus,
};

use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a countdown
    Start {
        /// Countdown length in minutes (defaults to the configured target)
        #[arg(long, conflicts_with = "plan")]
        minutes: Option<u32>,
        /// Run the saved day plan instead of a single countdown
        #[arg(long)]
        plan: bool,
    },
    /// Pause the running countdown
    Pause,
    /// Resume a paused countdown
    Resume,
    /// Stop and reset to idle
    Stop,
    /// Print current timer state as JSON
    Status,
}

/// Snapshot plus derived fields, as printed by every timer command.
#[derive(Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub snapshot: TimerSnapshot,
    #[serde(with = "worktimer_core::secs::option")]
    pub remaining: Option<Duration>,
    pub segment: Option<ActiveSegment>,
}

pub async fn run(action: TimerAction) -> CommandResult {
    let store = Arc::new(FileSettingsStore::open_default()?);
    let plans = DayPlanRepository::open_default()?;
    let engine = TimerEngine::new(store.clone(), Arc::new(SystemClock::new()));
    engine.recover().await;

    let snapshot = match action {
        TimerAction::Start { minutes, plan } => {
            let target = if plan {
                let day_plan = plans.load();
                if day_plan.segments.is_empty() {
                    engine.shutdown().await;
                    return Err("day plan is empty; add segments with `plan set-segment`".into());
                }
                store.set_selected_plan_id(Some(day_plan.id));
                resolve_target(Some(&day_plan), store.target_minutes())
            } else {
                store.set_selected_plan_id(None);
                minutes_to_duration(minutes.unwrap_or_else(|| store.target_minutes()))
            };
            engine.start(Some(target)).await
        }
        TimerAction::Pause => engine.pause().await,
        TimerAction::Resume => engine.resume().await,
        TimerAction::Stop => engine.stop().await,
        TimerAction::Status => engine.snapshot().await,
    };
    engine.shutdown().await;

    print_json(&status_view(snapshot, store.as_ref(), &plans))
}

pub fn status_view(snapshot: TimerSnapshot, store: &dyn SettingsStore, plans: &DayPlanRepository) -> StatusView {
    let segment = match (snapshot.status, store.selected_plan_id()) {
        (TimerStatus::Running | TimerStatus::Paused, Some(id)) => {
            let plan = plans.load();
            if plan.id == id {
                snapshot.remaining().and_then(|left| plan.active_segment(left))
            } else {
                None
            }
        }
        _ => None,
    };
    StatusView {
        snapshot,
        remaining: snapshot.remaining(),
        segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worktimer_core::plan::{DayPlan, PlanSegment, SegmentKind};
    use worktimer_core::MemorySettingsStore;

    #[test]
    fn status_view_reports_active_segment_for_selected_plan() {
        let dir = tempfile::tempdir().unwrap();
        let plans = DayPlanRepository::new(dir.path().join("day_plan.json"));
        let plan = DayPlan::new(vec![
            PlanSegment::new(SegmentKind::Work, "Focus", Duration::from_secs(600)),
            PlanSegment::new(SegmentKind::Break, "", Duration::from_secs(300)),
        ]);
        plans.save(&plan);

        let store = MemorySettingsStore::default();
        store.set_selected_plan_id(Some(plan.id));
        let snapshot = TimerSnapshot {
            status: TimerStatus::Running,
            elapsed: Duration::from_secs(700),
            target: Some(Duration::from_secs(900)),
        };

        let view = status_view(snapshot, &store, &plans);
        assert_eq!(view.remaining, Some(Duration::from_secs(200)));
        let segment = view.segment.unwrap();
        assert_eq!(segment.kind, SegmentKind::Break);

        let json = serde_json::to_value(status_view(snapshot, &store, &plans)).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["remaining"], 200.0);
        assert_eq!(json["segment"]["title"], "Break");
    }

    #[test]
    fn status_view_omits_segment_without_selection() {
        let dir = tempfile::tempdir().unwrap();
        let plans = DayPlanRepository::new(dir.path().join("day_plan.json"));
        let store = MemorySettingsStore::default();
        let view = status_view(TimerSnapshot::idle(), &store, &plans);
        assert!(view.segment.is_none());
        assert_eq!(view.remaining, None);
    }
}
