//! Process lifecycle hooks that trigger timer recovery.
//!
//! The engine never recovers on its own. The host tells the
//! [`RecoveryCoordinator`] when the process launched, woke from sleep or came
//! back to the foreground, and the coordinator calls
//! [`TimerEngine::recover`]. On hosts without a wake notification,
//! [`WakeDetector`] infers one from the two clocks drifting apart.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::timer::TimerEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleTrigger {
    Launch,
    Wake,
    Activate,
}

/// Runs recovery once on start and again for every trigger received.
pub struct RecoveryCoordinator {
    engine: TimerEngine,
    running: Option<Running>,
}

struct Running {
    tx: mpsc::UnboundedSender<LifecycleTrigger>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RecoveryCoordinator {
    pub fn new(engine: TimerEngine) -> Self {
        Self {
            engine,
            running: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Start listening and recover immediately. Safe to call twice.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let engine = self.engine.clone();

        let handle = tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    _ = cancel.cancelled() => break,
                    trigger = rx.recv() => match trigger {
                        Some(trigger) => trigger,
                        None => break,
                    },
                };
                let snapshot = engine.recover().await;
                info!(?trigger, status = ?snapshot.status, "recovery triggered");
            }
            debug!("recovery coordinator stopped");
        });

        let _ = tx.send(LifecycleTrigger::Launch);
        self.running = Some(Running { tx, token, handle });
    }

    /// Queue a recovery. Ignored until [`RecoveryCoordinator::start`].
    pub fn notify(&self, trigger: LifecycleTrigger) {
        if let Some(running) = &self.running {
            let _ = running.tx.send(trigger);
        }
    }

    /// A sender other components can use to deliver triggers.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<LifecycleTrigger>> {
        self.running.as_ref().map(|r| r.tx.clone())
    }

    /// Stop listening and wait for the loop to exit.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            let _ = running.handle.await;
        }
    }
}

/// Detects host suspend by comparing wall-clock and monotonic progress.
///
/// While the host sleeps the wall clock keeps moving but the monotonic clock
/// does not, so after a wake the wall clock is ahead by roughly the sleep time.
pub struct WakeDetector {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    threshold: Duration,
    last: Option<(DateTime<Utc>, Duration)>,
}

impl WakeDetector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            poll_interval: Duration::from_secs(5),
            threshold: Duration::from_secs(10),
            last: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Take a reading. Returns the suspend gap if the wall clock moved more
    /// than `threshold` further than the monotonic clock since the last one.
    pub fn check(&mut self) -> Option<Duration> {
        let wall = self.clock.wall_now();
        let monotonic = self.clock.monotonic_now();
        let previous = self.last.replace((wall, monotonic));

        let (last_wall, last_monotonic) = previous?;
        let wall_delta = (wall - last_wall).to_std().unwrap_or(Duration::ZERO);
        let monotonic_delta = monotonic.saturating_sub(last_monotonic);
        let gap = wall_delta.saturating_sub(monotonic_delta);
        (gap > self.threshold).then_some(gap)
    }

    /// Poll until cancelled, sending [`LifecycleTrigger::Wake`] on each detected gap.
    pub fn spawn(
        mut self,
        triggers: mpsc::UnboundedSender<LifecycleTrigger>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.check();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                if let Some(gap) = self.check() {
                    info!(gap_secs = gap.as_secs(), "host wake detected");
                    if triggers.send(LifecycleTrigger::Wake).is_err() {
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::recovery::RecoveryCheckpoint;
    use crate::storage::{MemorySettingsStore, SettingsStore};
    use crate::timer::TimerStatus;

    fn s(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn manual_clock() -> Arc<ManualClock> {
        let wall = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Arc::new(ManualClock::new(wall, s(1_000)))
    }

    #[test]
    fn wake_detector_flags_wall_clock_gap() {
        let clock = manual_clock();
        let mut detector = WakeDetector::new(clock.clone());
        assert_eq!(detector.check(), None);

        clock.advance(s(5));
        assert_eq!(detector.check(), None);

        clock.advance_wall(s(600));
        clock.advance_monotonic(s(5));
        assert_eq!(detector.check(), Some(s(600)));

        // Small drift stays under the threshold.
        clock.advance_wall(s(8));
        assert_eq!(detector.check(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_detector_task_sends_wake() {
        let clock = manual_clock();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = WakeDetector::new(clock.clone()).spawn(tx, cancel.clone());

        clock.advance_wall(s(3_600));
        assert_eq!(rx.recv().await, Some(LifecycleTrigger::Wake));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_recovers_on_start_and_triggers() {
        let clock = manual_clock();
        let settings = Arc::new(MemorySettingsStore::default());
        settings.set_recovery_checkpoint(RecoveryCheckpoint::started(s(600), clock.wall_now(), s(1_000)));
        let engine = TimerEngine::new(settings.clone(), clock.clone());
        let mut stream = engine.subscribe().await;
        assert_eq!(stream.recv().await.unwrap().status, TimerStatus::Idle);

        clock.advance(s(60));
        let mut coordinator = RecoveryCoordinator::new(engine.clone());
        coordinator.start();
        coordinator.start();
        let snap = stream.recv().await.unwrap();
        assert_eq!(snap.status, TimerStatus::Running);
        assert_eq!(snap.elapsed, s(60));

        // Suspended past the target.
        engine.shutdown().await;
        clock.advance_wall(s(3_600));
        coordinator.notify(LifecycleTrigger::Wake);
        let snap = loop {
            let snap = stream.recv().await.unwrap();
            if snap.status == TimerStatus::Finished {
                break snap;
            }
        };
        assert_eq!(snap.elapsed, s(600));

        coordinator.stop().await;
        assert!(!coordinator.is_started());
    }

    #[tokio::test]
    async fn notify_before_start_is_ignored() {
        let clock = manual_clock();
        let settings = Arc::new(MemorySettingsStore::default());
        let engine = TimerEngine::new(settings, clock);
        let coordinator = RecoveryCoordinator::new(engine);
        coordinator.notify(LifecycleTrigger::Activate);
        assert!(coordinator.sender().is_none());
    }
}
