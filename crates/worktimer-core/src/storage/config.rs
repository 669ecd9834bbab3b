//! TOML-based user settings.
//!
//! Stores:
//! - The countdown target in minutes
//! - The recurring auto start/stop schedule
//! - The selected day plan
//! - Notification preferences
//!
//! Settings are stored at `<data_dir>/settings.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::data_dir;
use crate::error::{ConfigError, CoreError};
use crate::notify::NotificationSettings;
use crate::schedule::RecurringSchedule;

pub const SETTINGS_FILE: &str = "settings.toml";

pub const DEFAULT_TARGET_MINUTES: u32 = 60;

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_target_minutes")]
    pub target_minutes: u32,
    #[serde(default)]
    pub schedule: RecurringSchedule,
    #[serde(default)]
    pub selected_plan_id: Option<Uuid>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

fn default_target_minutes() -> u32 {
    DEFAULT_TARGET_MINUTES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_minutes: DEFAULT_TARGET_MINUTES,
            schedule: RecurringSchedule::default(),
            selected_plan_id: None,
            notifications: NotificationSettings::default(),
        }
    }
}

impl Settings {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Array(_) => {
                        if value.trim_start().starts_with('[') {
                            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                        } else {
                            serde_json::Value::Array(
                                value
                                    .split(',')
                                    .map(str::trim)
                                    .filter(|s| !s.is_empty())
                                    .map(|s| serde_json::Value::String(s.to_ascii_lowercase()))
                                    .collect(),
                            )
                        }
                    }
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null | serde_json::Value::String(_) => {
                        let trimmed = value.trim();
                        if trimmed.is_empty() || trimmed == "none" || trimmed == "null" {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::String(trimmed.into())
                        }
                    }
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join(SETTINGS_FILE))
    }

    /// Read settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Write settings to `path` through a temporary sibling file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        let content = toml::to_string_pretty(self)?;
        super::write_atomic(path, content.as_bytes()).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from the data directory.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_from(&Self::path()?)
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), CoreError> {
        self.save_to(&Self::path()?)
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            Self::default()
        })
    }

    /// Get a setting as a string by dot-separated key, e.g. `schedule.start_time`.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a setting by dot-separated key. The value is parsed according to
    /// the type of the current value and validated by deserializing the result.
    ///
    /// Does not persist; call [`Settings::save`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let mut updated: Settings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.target_minutes = updated.target_minutes.max(1);
        *self = updated;
        Ok(())
    }

    /// Every leaf setting as `(dot.path, value)` pairs, in serialization order.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{LocalTime, TimeZoneMode, Weekday};

    #[test]
    fn default_settings_roundtrip() {
        let cfg = Settings::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let parsed: Settings = toml::from_str("").unwrap();
        assert_eq!(parsed.target_minutes, 60);
        assert!(!parsed.schedule.enabled);
        assert!(!parsed.notifications.enabled);
        assert!(parsed.notifications.on_finish);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Settings::default();
        assert_eq!(cfg.get("target_minutes").as_deref(), Some("60"));
        assert_eq!(cfg.get("schedule.start_time").as_deref(), Some("09:00"));
        assert_eq!(cfg.get("schedule.enabled").as_deref(), Some("false"));
        assert_eq!(cfg.get("schedule.dst_policy.missing_time").as_deref(), Some("next_time"));
        assert!(cfg.get("schedule.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Settings::default();
        cfg.set("schedule.enabled", "true").unwrap();
        cfg.set("schedule.start_time", "08:30").unwrap();
        cfg.set("schedule.weekdays", "monday, Friday").unwrap();
        cfg.set("schedule.time_zone", "Europe/Kyiv").unwrap();
        cfg.set("notifications.on_break", "false").unwrap();

        assert!(cfg.schedule.enabled);
        assert_eq!(cfg.schedule.start_time, LocalTime::new(8, 30).unwrap());
        assert_eq!(
            cfg.schedule.weekdays.iter().copied().collect::<Vec<_>>(),
            vec![Weekday::Monday, Weekday::Friday]
        );
        assert_eq!(cfg.schedule.time_zone, TimeZoneMode::Fixed("Europe/Kyiv".into()));
        assert!(!cfg.notifications.on_break);
    }

    #[test]
    fn set_clamps_target_minutes() {
        let mut cfg = Settings::default();
        cfg.set("target_minutes", "0").unwrap();
        assert_eq!(cfg.target_minutes, 1);
        cfg.set("target_minutes", "45").unwrap();
        assert_eq!(cfg.target_minutes, 45);
    }

    #[test]
    fn set_plan_id_accepts_uuid_and_none() {
        let mut cfg = Settings::default();
        let id = Uuid::new_v4();
        cfg.set("selected_plan_id", &id.to_string()).unwrap();
        assert_eq!(cfg.selected_plan_id, Some(id));
        cfg.set("selected_plan_id", "none").unwrap();
        assert_eq!(cfg.selected_plan_id, None);
        assert!(cfg.set("selected_plan_id", "not-a-uuid").is_err());
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Settings::default();
        let err = cfg.set("schedule.nonexistent_key", "value").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
        assert!(cfg.set("", "value").is_err());
    }

    #[test]
    fn set_rejects_invalid_values() {
        let mut cfg = Settings::default();
        assert!(cfg.set("schedule.enabled", "not_a_bool").is_err());
        assert!(cfg.set("schedule.start_time", "25:00").is_err());
        assert!(cfg.set("target_minutes", "-3").is_err());
        assert!(cfg.set("schedule.weekdays", "funday").is_err());
        assert_eq!(cfg, Settings::default());
    }

    #[test]
    fn entries_flatten_every_leaf() {
        let cfg = Settings::default();
        let entries = cfg.entries();
        assert!(entries.contains(&("target_minutes".into(), "60".into())));
        assert!(entries.contains(&("schedule.stop_time".into(), "18:00".into())));
        assert!(entries.contains(&("notifications.enabled".into(), "false".into())));
    }

    #[test]
    fn load_and_save_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());

        let mut cfg = Settings::default();
        cfg.target_minutes = 25;
        cfg.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap().target_minutes, 25);

        std::fs::write(&path, "target_minutes = \"oops\"").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
