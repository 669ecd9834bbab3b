//! Async timer engine.
//!
//! The engine owns the live [`TimerSnapshot`] and is the only writer of the
//! recovery checkpoint. Every mutation (manual actions, the periodic tick and
//! recovery) goes through one `tokio::sync::Mutex`, and within that lock the
//! checkpoint is written before the new snapshot is published.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = TimerEngine::new(settings, Arc::new(SystemClock::new()));
//! let mut stream = engine.subscribe().await;
//! engine.recover().await;
//! engine.start(Some(Duration::from_secs(25 * 60))).await;
//! while let Some(snapshot) = stream.recv().await { /* render */ }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::reducer::{reduce, TimerAction, TimerSnapshot, TimerStatus};
use super::TimerControl;
use crate::clock::Clock;
use crate::recovery::{self, RecoveryCheckpoint, RecoveryPolicy};
use crate::storage::SettingsStore;

/// Default period of the tick loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Cloneable handle to a running timer.
#[derive(Clone)]
pub struct TimerEngine {
    inner: Arc<Mutex<EngineState>>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    policy: RecoveryPolicy,
    tick_interval: Duration,
}

struct EngineState {
    snapshot: TimerSnapshot,
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<TimerSnapshot>>,
    ticker: Option<CancellationToken>,
    /// Monotonic reading at the previous tick.
    last_monotonic: Option<Duration>,
}

impl EngineState {
    fn publish(&mut self) {
        let snapshot = self.snapshot;
        self.subscribers.retain(|_, tx| tx.send(snapshot).is_ok());
    }
}

/// Receiving end of [`TimerEngine::subscribe`].
///
/// Yields the snapshot current at subscription time, then every change in order.
#[derive(Debug)]
pub struct SnapshotStream {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<TimerSnapshot>,
}

impl SnapshotStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<TimerSnapshot> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TimerSnapshot> {
        self.rx.try_recv().ok()
    }
}

impl TimerEngine {
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineState {
                snapshot: TimerSnapshot::idle(),
                subscribers: HashMap::new(),
                ticker: None,
                last_monotonic: None,
            })),
            settings,
            clock,
            policy: RecoveryPolicy::default(),
            tick_interval: TICK_INTERVAL,
        }
    }

    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.inner.lock().await.snapshot
    }

    pub async fn is_ticking(&self) -> bool {
        self.inner.lock().await.ticker.is_some()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub async fn subscribe(&self) -> SnapshotStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut state = self.inner.lock().await;
        // Cannot fail: the receiver is still in scope.
        let _ = tx.send(state.snapshot);
        state.subscribers.insert(id, tx);
        debug!(subscriber = %id, "snapshot subscriber attached");
        SnapshotStream { id, rx }
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        if self.inner.lock().await.subscribers.remove(&id).is_some() {
            debug!(subscriber = %id, "snapshot subscriber detached");
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub async fn start(&self, target: Option<Duration>) -> TimerSnapshot {
        self.apply(TimerAction::Start(target)).await
    }

    pub async fn pause(&self) -> TimerSnapshot {
        self.apply(TimerAction::Pause).await
    }

    pub async fn resume(&self) -> TimerSnapshot {
        self.apply(TimerAction::Resume).await
    }

    pub async fn stop(&self) -> TimerSnapshot {
        self.apply(TimerAction::Stop).await
    }

    /// Rebuild the snapshot from the persisted checkpoint.
    ///
    /// Does nothing when the checkpoint is idle or has no positive target.
    pub async fn recover(&self) -> TimerSnapshot {
        let mut state = self.inner.lock().await;
        let checkpoint = self.settings.recovery_checkpoint();
        if checkpoint.status == TimerStatus::Idle || checkpoint.target_duration.is_zero() {
            debug!(status = ?checkpoint.status, "nothing to recover");
            return state.snapshot;
        }

        let now_wall = self.clock.wall_now();
        let now_monotonic = self.clock.monotonic_now();
        let out = recovery::recover(&checkpoint, now_wall, now_monotonic, &self.policy);

        let target = out.checkpoint.target_duration;
        let snapshot = TimerSnapshot {
            status: out.checkpoint.status,
            elapsed: out.elapsed,
            target: (!target.is_zero()).then_some(target),
        };

        self.settings.set_recovery_checkpoint(out.checkpoint);
        state.snapshot = snapshot;
        state.publish();
        info!(
            status = ?snapshot.status,
            elapsed_secs = snapshot.elapsed.as_secs_f64(),
            "timer recovered"
        );

        if state.ticker.is_some() {
            state.last_monotonic = Some(now_monotonic);
        }
        self.align_ticker(&mut state);
        snapshot
    }

    /// Stop the tick loop without touching timer state.
    pub async fn shutdown(&self) {
        let mut state = self.inner.lock().await;
        if let Some(token) = state.ticker.take() {
            token.cancel();
        }
        state.last_monotonic = None;
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn apply(&self, action: TimerAction) -> TimerSnapshot {
        let mut state = self.inner.lock().await;
        self.apply_locked(&mut state, action);
        state.snapshot
    }

    fn apply_locked(&self, state: &mut EngineState, action: TimerAction) {
        let previous = state.snapshot;
        let current = reduce(previous, action);

        self.persist(action, &previous, &current);
        if current != previous {
            state.snapshot = current;
            state.publish();
        }

        if current.status != previous.status {
            info!(from = ?previous.status, to = ?current.status, "timer transition");
        }

        if matches!(action, TimerAction::Start(_) | TimerAction::Resume) {
            state.last_monotonic = Some(self.clock.monotonic_now());
        }
        self.align_ticker(state);
    }

    /// Write the checkpoint that corresponds to `action`.
    fn persist(&self, action: TimerAction, previous: &TimerSnapshot, current: &TimerSnapshot) {
        let wall = self.clock.wall_now();
        let monotonic = self.clock.monotonic_now();

        let next = match action {
            TimerAction::Start(target) => match target.filter(|t| !t.is_zero()) {
                Some(target) => RecoveryCheckpoint::started(target, wall, monotonic),
                None => RecoveryCheckpoint::default(),
            },
            TimerAction::Pause => {
                if previous.status != TimerStatus::Running {
                    return;
                }
                self.settings
                    .recovery_checkpoint()
                    .frozen(TimerStatus::Paused, current.elapsed, wall, monotonic)
            }
            TimerAction::Resume => {
                if previous.status != TimerStatus::Paused {
                    return;
                }
                let checkpoint = self.settings.recovery_checkpoint();
                if checkpoint.target_duration.is_zero() {
                    return;
                }
                checkpoint.resumed(current.elapsed, wall, monotonic)
            }
            TimerAction::Stop => RecoveryCheckpoint::default(),
            TimerAction::Tick(_) => {
                if current.status != TimerStatus::Finished {
                    return;
                }
                self.settings
                    .recovery_checkpoint()
                    .frozen(TimerStatus::Finished, current.elapsed, wall, monotonic)
            }
        };
        self.settings.set_recovery_checkpoint(next);
    }

    /// Run the tick loop exactly while the snapshot is running.
    fn align_ticker(&self, state: &mut EngineState) {
        if state.snapshot.is_running() {
            if state.ticker.is_none() {
                if state.last_monotonic.is_none() {
                    state.last_monotonic = Some(self.clock.monotonic_now());
                }
                state.ticker = Some(self.spawn_ticker());
            }
        } else if let Some(token) = state.ticker.take() {
            token.cancel();
            state.last_monotonic = None;
        }
    }

    fn spawn_ticker(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let engine = self.clone();
        let interval = self.tick_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if !engine.tick_once(&cancel).await {
                    break;
                }
            }
            debug!("tick loop stopped");
        });
        token
    }

    /// One tick. Returns false once the loop should exit.
    async fn tick_once(&self, token: &CancellationToken) -> bool {
        let mut state = self.inner.lock().await;
        // A pause or stop may have won the lock after the sleep completed.
        if token.is_cancelled() {
            return false;
        }

        let now = self.clock.monotonic_now();
        let delta = state
            .last_monotonic
            .map(|prev| now.saturating_sub(prev))
            .unwrap_or(Duration::ZERO);
        state.last_monotonic = Some(now);

        self.apply_locked(&mut state, TimerAction::Tick(delta));
        state.snapshot.is_running()
    }
}

#[async_trait]
impl TimerControl for TimerEngine {
    async fn start(&self, target: Option<Duration>) {
        TimerEngine::start(self, target).await;
    }

    async fn stop(&self) {
        TimerEngine::stop(self).await;
    }
}
