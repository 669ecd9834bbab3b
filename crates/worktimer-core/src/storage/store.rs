//! Settings collaborator used by the engine and the schedule coordinator.
//!
//! Reads never fail: a missing value yields its default and an unreadable one
//! yields the last value successfully read. Writes never fail either; I/O
//! errors are logged and the in-memory value stays authoritative until a
//! later write reaches the disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::config::{Settings, SETTINGS_FILE};
use super::data_dir;
use crate::error::ConfigError;
use crate::notify::NotificationSettings;
use crate::recovery::RecoveryCheckpoint;
use crate::schedule::RecurringSchedule;

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Synchronous key-value access to everything the core persists.
pub trait SettingsStore: Send + Sync {
    fn recurring_schedule(&self) -> RecurringSchedule;
    fn set_recurring_schedule(&self, schedule: RecurringSchedule);

    /// Countdown target in minutes, always at least 1.
    fn target_minutes(&self) -> u32;
    /// Values below 1 are stored as 1.
    fn set_target_minutes(&self, minutes: u32);

    fn recovery_checkpoint(&self) -> RecoveryCheckpoint;
    fn set_recovery_checkpoint(&self, checkpoint: RecoveryCheckpoint);

    fn selected_plan_id(&self) -> Option<Uuid>;
    fn set_selected_plan_id(&self, id: Option<Uuid>);

    fn notification_settings(&self) -> NotificationSettings;
    fn set_notification_settings(&self, settings: NotificationSettings);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── In-memory store ──────────────────────────────────────────────────

/// Volatile store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<(Settings, RecoveryCheckpoint)>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new((settings, RecoveryCheckpoint::default())),
        }
    }

    pub fn settings(&self) -> Settings {
        lock(&self.inner).0.clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn recurring_schedule(&self) -> RecurringSchedule {
        lock(&self.inner).0.schedule.clone()
    }

    fn set_recurring_schedule(&self, schedule: RecurringSchedule) {
        lock(&self.inner).0.schedule = schedule;
    }

    fn target_minutes(&self) -> u32 {
        lock(&self.inner).0.target_minutes.max(1)
    }

    fn set_target_minutes(&self, minutes: u32) {
        lock(&self.inner).0.target_minutes = minutes.max(1);
    }

    fn recovery_checkpoint(&self) -> RecoveryCheckpoint {
        lock(&self.inner).1
    }

    fn set_recovery_checkpoint(&self, checkpoint: RecoveryCheckpoint) {
        lock(&self.inner).1 = checkpoint;
    }

    fn selected_plan_id(&self) -> Option<Uuid> {
        lock(&self.inner).0.selected_plan_id
    }

    fn set_selected_plan_id(&self, id: Option<Uuid>) {
        lock(&self.inner).0.selected_plan_id = id;
    }

    fn notification_settings(&self) -> NotificationSettings {
        lock(&self.inner).0.notifications.clone()
    }

    fn set_notification_settings(&self, settings: NotificationSettings) {
        lock(&self.inner).0.notifications = settings;
    }
}

// ── File store ───────────────────────────────────────────────────────

/// Store backed by `settings.toml` and `checkpoint.json` in one directory.
///
/// Every read goes to disk so changes made by another process (the CLI
/// editing the schedule under a running daemon) are picked up. After a failed
/// write the file on disk is stale, so reads answer from memory until a write
/// succeeds again.
#[derive(Debug)]
pub struct FileSettingsStore {
    dir: PathBuf,
    cache: Mutex<Cache>,
}

#[derive(Debug, Default)]
struct Cache {
    settings: Settings,
    checkpoint: RecoveryCheckpoint,
    /// Set while the last settings write failed.
    settings_dirty: bool,
    checkpoint_dirty: bool,
}

impl FileSettingsStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            dir: dir.into(),
            cache: Mutex::new(Cache::default()),
        };
        store.read_settings();
        store.read_checkpoint();
        store
    }

    /// Open the store in [`data_dir`].
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::open(data_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Current settings, re-read from disk.
    pub fn settings(&self) -> Settings {
        self.read_settings()
    }

    /// Read-modify-write the settings file.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self.read_settings();
        f(&mut settings);
        settings.target_minutes = settings.target_minutes.max(1);
        self.write_settings(settings);
    }

    /// Replace the settings file wholesale.
    pub fn replace(&self, settings: Settings) {
        self.write_settings(settings);
    }

    fn read_settings(&self) -> Settings {
        let path = self.settings_path();
        let mut cache = lock(&self.cache);
        if cache.settings_dirty {
            return cache.settings.clone();
        }
        match Settings::load_from(&path) {
            Ok(settings) => {
                cache.settings = settings.clone();
                settings
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable settings, using last known good");
                cache.settings.clone()
            }
        }
    }

    fn write_settings(&self, settings: Settings) {
        let path = self.settings_path();
        let mut cache = lock(&self.cache);
        let result = settings.save_to(&path);
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "failed to write settings");
        }
        cache.settings_dirty = result.is_err();
        cache.settings = settings;
    }

    fn read_checkpoint(&self) -> RecoveryCheckpoint {
        let path = self.checkpoint_path();
        let mut cache = lock(&self.cache);
        if cache.checkpoint_dirty {
            return cache.checkpoint;
        }
        let parsed = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<RecoveryCheckpoint>(&text).map_err(|e| e.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecoveryCheckpoint::default()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(checkpoint) => {
                cache.checkpoint = checkpoint;
                checkpoint
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "unreadable checkpoint, using last known good");
                cache.checkpoint
            }
        }
    }

    fn write_checkpoint(&self, checkpoint: RecoveryCheckpoint) {
        let path = self.checkpoint_path();
        let mut cache = lock(&self.cache);
        let result = serde_json::to_vec_pretty(&checkpoint)
            .map_err(std::io::Error::from)
            .and_then(|bytes| super::write_atomic(&path, &bytes));
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "failed to write checkpoint");
        }
        cache.checkpoint_dirty = result.is_err();
        cache.checkpoint = checkpoint;
    }
}

impl SettingsStore for FileSettingsStore {
    fn recurring_schedule(&self) -> RecurringSchedule {
        self.read_settings().schedule
    }

    fn set_recurring_schedule(&self, schedule: RecurringSchedule) {
        self.update(|s| s.schedule = schedule);
    }

    fn target_minutes(&self) -> u32 {
        self.read_settings().target_minutes.max(1)
    }

    fn set_target_minutes(&self, minutes: u32) {
        self.update(|s| s.target_minutes = minutes.max(1));
    }

    fn recovery_checkpoint(&self) -> RecoveryCheckpoint {
        self.read_checkpoint()
    }

    fn set_recovery_checkpoint(&self, checkpoint: RecoveryCheckpoint) {
        self.write_checkpoint(checkpoint);
    }

    fn selected_plan_id(&self) -> Option<Uuid> {
        self.read_settings().selected_plan_id
    }

    fn set_selected_plan_id(&self, id: Option<Uuid>) {
        self.update(|s| s.selected_plan_id = id);
    }

    fn notification_settings(&self) -> NotificationSettings {
        self.read_settings().notifications
    }

    fn set_notification_settings(&self, settings: NotificationSettings) {
        self.update(|s| s.notifications = settings);
    }
}
