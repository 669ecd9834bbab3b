//! Turns the recurring schedule into real timer starts and stops.
//!
//! The coordinator keeps at most one outstanding wait. Each wait owns a
//! `CancellationToken`; rescheduling or stopping cancels it. When a wait
//! completes, the coordinator checks under its lock that it is still running
//! and that the wait is still the current one before dispatching.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::plan::minutes_to_duration;
use crate::schedule::{next_event, ScheduleEvent, ScheduleEventKind};
use crate::storage::SettingsStore;
use crate::timer::TimerControl;

/// Slack around a fire instant. Also the minimum distance between two
/// dispatches of the same event.
pub const FIRE_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Fired,
    Cancelled,
}

/// Suspends until a wall-clock instant.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep_until(
        &self,
        fire_at: DateTime<Utc>,
        tolerance: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome;
}

// ── Tokio sleeper ────────────────────────────────────────────────────

/// Sleeps on the Tokio timer in bounded chunks, re-reading the wall clock
/// after each one. Tokio timers do not advance while the host is suspended,
/// so a single long sleep would fire late after a wake.
pub struct TokioSleeper {
    clock: Arc<dyn Clock>,
    max_chunk: Duration,
}

impl TokioSleeper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_chunk: Duration::from_secs(15),
        }
    }

    pub fn with_max_chunk(mut self, max_chunk: Duration) -> Self {
        self.max_chunk = max_chunk;
        self
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep_until(
        &self,
        fire_at: DateTime<Utc>,
        tolerance: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        loop {
            let now = self.clock.wall_now();
            let remaining = match (fire_at - now).to_std() {
                Ok(d) if !d.is_zero() => d,
                // Already due.
                _ => {
                    let late = (now - fire_at).to_std().unwrap_or(Duration::ZERO);
                    if late > tolerance {
                        info!(late_secs = late.as_secs_f64(), %fire_at, "schedule wait fired late");
                    }
                    return WaitOutcome::Fired;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                _ = tokio::time::sleep(remaining.min(self.max_chunk)) => {}
            }
        }
    }
}

// ── Manual sleeper ───────────────────────────────────────────────────

/// Sleeper driven by hand: records each requested instant and completes the
/// pending wait only when [`ManualSleeper::fire`] is called.
#[derive(Default)]
pub struct ManualSleeper {
    state: Mutex<ManualSleeperState>,
    changed: Notify,
}

#[derive(Default)]
struct ManualSleeperState {
    requests: Vec<DateTime<Utc>>,
    cancellations: usize,
    pending: Option<oneshot::Sender<()>>,
}

impl ManualSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fire instant requested so far, oldest first.
    pub fn requests(&self) -> Vec<DateTime<Utc>> {
        lock(&self.state).requests.clone()
    }

    pub fn last_request(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).requests.last().copied()
    }

    pub fn cancellations(&self) -> usize {
        lock(&self.state).cancellations
    }

    /// Complete the most recent wait. Returns false if nobody was waiting.
    pub fn fire(&self) -> bool {
        let pending = lock(&self.state).pending.take();
        pending.is_some_and(|tx| tx.send(()).is_ok())
    }

    pub async fn wait_for_requests(&self, n: usize) {
        self.wait_until(|s| s.requests.len() >= n).await;
    }

    pub async fn wait_for_cancellations(&self, n: usize) {
        self.wait_until(|s| s.cancellations >= n).await;
    }

    async fn wait_until(&self, pred: impl Fn(&ManualSleeperState) -> bool) {
        loop {
            let notified = self.changed.notified();
            if pred(&lock(&self.state)) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Sleeper for ManualSleeper {
    async fn sleep_until(
        &self,
        fire_at: DateTime<Utc>,
        _tolerance: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            state.requests.push(fire_at);
            state.pending = Some(tx);
        }
        self.changed.notify_waiters();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            fired = rx => match fired {
                Ok(()) => WaitOutcome::Fired,
                Err(_) => WaitOutcome::Cancelled,
            },
        };
        if outcome == WaitOutcome::Cancelled {
            lock(&self.state).cancellations += 1;
            self.changed.notify_waiters();
        }
        outcome
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Cloneable handle that keeps the timer in step with the recurring schedule.
///
/// `start`, `stop` and `reschedule` spawn onto the current Tokio runtime and
/// must be called from within one.
#[derive(Clone)]
pub struct AutoScheduleCoordinator {
    engine: Arc<dyn TimerControl>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    state: Arc<Mutex<CoordinatorState>>,
    tolerance: Duration,
}

#[derive(Default)]
struct CoordinatorState {
    running: bool,
    pending: Option<PendingWait>,
    last_fired: Option<DateTime<Utc>>,
    next_wait_id: u64,
}

struct PendingWait {
    id: u64,
    event: ScheduleEvent,
    token: CancellationToken,
}

impl AutoScheduleCoordinator {
    pub fn new(
        engine: Arc<dyn TimerControl>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            engine,
            settings,
            clock,
            sleeper,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            tolerance: FIRE_TOLERANCE,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// The event currently being waited for.
    pub fn pending_event(&self) -> Option<ScheduleEvent> {
        lock(&self.state).pending.as_ref().map(|p| p.event)
    }

    /// Begin scheduling. Calling it again while running does nothing.
    pub fn start(&self) {
        {
            let mut state = lock(&self.state);
            if state.running {
                return;
            }
            state.running = true;
        }
        info!("auto schedule started");
        self.reschedule();
    }

    /// Stop scheduling and cancel the pending wait.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        state.running = false;
        if let Some(pending) = state.pending.take() {
            pending.token.cancel();
        }
        info!("auto schedule stopped");
    }

    /// Replace the pending wait with one for the next event of the current schedule.
    pub fn reschedule(&self) {
        let mut state = lock(&self.state);
        if !state.running {
            return;
        }
        if let Some(pending) = state.pending.take() {
            debug!(wait = pending.id, "cancelling pending schedule wait");
            pending.token.cancel();
        }

        let schedule = self.settings.recurring_schedule();
        let now = self.clock.wall_now();
        // Never compute from before the last dispatched instant, or a wait that
        // completed inside the tolerance window would find the same event again.
        let from = match state.last_fired {
            Some(fired) => now.max(fired + self.tolerance),
            None => now,
        };

        let Some(event) = next_event(from, &schedule) else {
            debug!("no upcoming schedule event");
            return;
        };

        state.next_wait_id += 1;
        let id = state.next_wait_id;
        let token = CancellationToken::new();
        state.pending = Some(PendingWait {
            id,
            event,
            token: token.clone(),
        });
        info!(kind = ?event.kind, fire_at = %event.fire_at, "next schedule event");

        let this = self.clone();
        tokio::spawn(async move { this.wait_and_dispatch(id, event, token).await });
    }

    async fn wait_and_dispatch(self, id: u64, event: ScheduleEvent, token: CancellationToken) {
        let outcome = self
            .sleeper
            .sleep_until(event.fire_at, self.tolerance, &token)
            .await;
        if outcome == WaitOutcome::Cancelled {
            debug!(wait = id, "schedule wait cancelled");
            return;
        }

        {
            let mut state = lock(&self.state);
            let current = state.pending.as_ref().map(|p| p.id) == Some(id);
            if !state.running || !current || token.is_cancelled() {
                debug!(wait = id, "stale schedule wait, not dispatching");
                return;
            }
            state.pending = None;
            state.last_fired = Some(event.fire_at);
        }

        self.dispatch(event).await;
        self.reschedule();
    }

    async fn dispatch(&self, event: ScheduleEvent) {
        match event.kind {
            ScheduleEventKind::Start => {
                let target = minutes_to_duration(self.settings.target_minutes());
                info!(target_secs = target.as_secs(), "scheduled start");
                self.engine.start(Some(target)).await;
            }
            ScheduleEventKind::Stop => {
                info!("scheduled stop");
                self.engine.stop().await;
            }
        }
    }
}
