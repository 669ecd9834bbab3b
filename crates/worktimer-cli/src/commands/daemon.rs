//! Foreground process that follows the schedule and recovers after sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worktimer_core::plan::DayPlan;
use worktimer_core::{
    AutoScheduleCoordinator, Clock, DayPlanRepository, FileSettingsStore, RecoveryCheckpoint, RecoveryCoordinator,
    SettingsStore, SnapshotDiffer, SystemClock, TimerEngine, TimerSnapshot, TimerStatus, TokioSleeper, WakeDetector,
};

use super::CommandResult;

/// How often settings and the checkpoint are re-read for changes made by
/// other commands.
const SETTINGS_POLL: Duration = Duration::from_secs(30);

/// Slack when comparing durations that went through the JSON encoding.
const DURATION_SLACK: Duration = Duration::from_millis(1);

pub async fn run() -> CommandResult {
    let store = Arc::new(FileSettingsStore::open_default()?);
    let plans = DayPlanRepository::open_default()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let engine = TimerEngine::new(store.clone(), clock.clone());
    info!(dir = %store.dir().display(), "worktimer running");

    let mut recovery = RecoveryCoordinator::new(engine.clone());
    recovery.start();

    let wake_cancel = CancellationToken::new();
    let wake_task = recovery
        .sender()
        .map(|tx| WakeDetector::new(clock.clone()).spawn(tx, wake_cancel.clone()));

    let schedule = AutoScheduleCoordinator::new(
        Arc::new(engine.clone()),
        store.clone(),
        clock.clone(),
        Arc::new(TokioSleeper::new(clock.clone())),
    );
    schedule.start();

    let mut stream = engine.subscribe().await;
    let mut differ = SnapshotDiffer::new();
    let mut notifications = store.notification_settings();
    let mut plan = selected_plan(store.as_ref(), &plans);
    let mut last_schedule = store.recurring_schedule();
    let mut last_checkpoint = store.recovery_checkpoint();
    let mut poll = tokio::time::interval(SETTINGS_POLL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received, shutting down");
                break;
            }
            snapshot = stream.recv() => {
                let Some(snapshot) = snapshot else { break };
                for event in differ.process(&snapshot, &plan, &notifications) {
                    info!(?event, "timer event");
                }
            }
            _ = poll.tick() => {
                notifications = store.notification_settings();
                plan = selected_plan(store.as_ref(), &plans);
                let current = store.recurring_schedule();
                if current != last_schedule {
                    info!("schedule changed on disk, rescheduling");
                    last_schedule = current;
                    schedule.reschedule();
                }

                let checkpoint = store.recovery_checkpoint();
                if checkpoint != last_checkpoint {
                    sync_with_checkpoint(&engine, &checkpoint).await;
                    last_checkpoint = store.recovery_checkpoint();
                }
            }
        }
    }

    schedule.stop();
    wake_cancel.cancel();
    if let Some(task) = wake_task {
        if let Err(e) = task.await {
            warn!(error = %e, "wake detector task failed");
        }
    }
    recovery.stop().await;
    engine.unsubscribe(stream.id()).await;
    engine.shutdown().await;
    Ok(())
}

/// Bring the engine in line with a checkpoint another process wrote.
///
/// Open-ended timers write no checkpoint, so they are left alone.
async fn sync_with_checkpoint(engine: &TimerEngine, checkpoint: &RecoveryCheckpoint) {
    let snapshot = engine.snapshot().await;
    if snapshot.status != TimerStatus::Idle && snapshot.target.is_none() {
        return;
    }
    if !checkpoint_diverged(&snapshot, checkpoint) {
        debug!(status = ?snapshot.status, "checkpoint matches timer");
        // A restart with the same target still moves the anchors.
        if snapshot.status == TimerStatus::Running {
            engine.recover().await;
        }
        return;
    }

    info!(from = ?snapshot.status, to = ?checkpoint.status, "checkpoint changed on disk, resyncing timer");
    if checkpoint.status == TimerStatus::Idle {
        engine.stop().await;
    } else {
        engine.recover().await;
    }
}

/// Whether `checkpoint` describes a different timer than `snapshot`.
///
/// Running elapsed time is not compared since the engine advances it between
/// writes.
fn checkpoint_diverged(snapshot: &TimerSnapshot, checkpoint: &RecoveryCheckpoint) -> bool {
    if snapshot.status != checkpoint.status {
        return true;
    }
    if snapshot.status == TimerStatus::Idle {
        return false;
    }
    let target = snapshot.target.unwrap_or(Duration::ZERO);
    if !close(target, checkpoint.target_duration) {
        return true;
    }
    snapshot.status != TimerStatus::Running && !close(snapshot.elapsed, checkpoint.accumulated_elapsed)
}

fn close(a: Duration, b: Duration) -> bool {
    a.max(b) - a.min(b) <= DURATION_SLACK
}

/// The saved plan when it is the one the current timer was started from.
fn selected_plan(store: &dyn SettingsStore, plans: &DayPlanRepository) -> DayPlan {
    match store.selected_plan_id() {
        Some(id) => {
            let plan = plans.load();
            if plan.id == id {
                plan
            } else {
                DayPlan::default()
            }
        }
        None => DayPlan::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use worktimer_core::{ManualClock, MemorySettingsStore};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn wall() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn snapshot(status: TimerStatus, elapsed: u64, target: Option<u64>) -> TimerSnapshot {
        TimerSnapshot {
            status,
            elapsed: secs(elapsed),
            target: target.map(secs),
        }
    }

    #[test]
    fn matching_checkpoint_is_not_divergent() {
        let running = RecoveryCheckpoint::started(secs(1_500), wall(), secs(10));
        assert!(!checkpoint_diverged(&snapshot(TimerStatus::Running, 300, Some(1_500)), &running));
        assert!(!checkpoint_diverged(&TimerSnapshot::idle(), &RecoveryCheckpoint::default()));

        let paused = running.frozen(TimerStatus::Paused, secs(60), wall(), secs(70));
        assert!(!checkpoint_diverged(&snapshot(TimerStatus::Paused, 60, Some(1_500)), &paused));
    }

    #[test]
    fn status_target_or_frozen_elapsed_changes_diverge() {
        let running = RecoveryCheckpoint::started(secs(1_500), wall(), secs(10));
        assert!(checkpoint_diverged(&snapshot(TimerStatus::Running, 0, Some(1_500)), &RecoveryCheckpoint::default()));
        assert!(checkpoint_diverged(&snapshot(TimerStatus::Running, 0, Some(600)), &running));
        assert!(checkpoint_diverged(&TimerSnapshot::idle(), &running));

        let paused = running.frozen(TimerStatus::Paused, secs(60), wall(), secs(70));
        assert!(checkpoint_diverged(&snapshot(TimerStatus::Paused, 90, Some(1_500)), &paused));
        assert!(checkpoint_diverged(&snapshot(TimerStatus::Running, 60, Some(1_500)), &paused));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_follows_checkpoint_written_elsewhere() {
        let store = Arc::new(MemorySettingsStore::default());
        let clock = Arc::new(ManualClock::new(wall(), secs(100)));
        let engine = TimerEngine::new(store.clone(), clock.clone());

        // Another process starts a timer.
        store.set_recovery_checkpoint(RecoveryCheckpoint::started(secs(900), wall(), secs(100)));
        sync_with_checkpoint(&engine, &store.recovery_checkpoint()).await;
        let now = engine.snapshot().await;
        assert_eq!(now.status, TimerStatus::Running);
        assert_eq!(now.target, Some(secs(900)));

        // Then pauses it a minute later.
        clock.advance(secs(60));
        let paused = store
            .recovery_checkpoint()
            .frozen(TimerStatus::Paused, secs(60), clock.wall_now(), clock.monotonic_now());
        store.set_recovery_checkpoint(paused);
        sync_with_checkpoint(&engine, &store.recovery_checkpoint()).await;
        let now = engine.snapshot().await;
        assert_eq!(now.status, TimerStatus::Paused);
        assert_eq!(now.elapsed, secs(60));

        // Then stops it.
        store.set_recovery_checkpoint(RecoveryCheckpoint::default());
        sync_with_checkpoint(&engine, &store.recovery_checkpoint()).await;
        assert_eq!(engine.snapshot().await.status, TimerStatus::Idle);
        assert_eq!(store.recovery_checkpoint(), RecoveryCheckpoint::default());

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn open_ended_timer_is_left_alone() {
        let store = Arc::new(MemorySettingsStore::default());
        let clock = Arc::new(ManualClock::new(wall(), secs(100)));
        let engine = TimerEngine::new(store.clone(), clock);

        engine.start(None).await;
        sync_with_checkpoint(&engine, &RecoveryCheckpoint::default()).await;
        assert_eq!(engine.snapshot().await.status, TimerStatus::Running);
        engine.shutdown().await;
    }
}
