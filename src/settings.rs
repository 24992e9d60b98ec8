use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};
use tokio::time::Duration;

/// Replaces [`TrackerSettings::endpoint`] when set.
pub const ENDPOINT_ENV_VAR: &str = "NPTI_BEACON_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub endpoint: String,
    pub sample_period_ms: u64,
    pub flush_interval_ms: u64,
    /// Element whose box is the reading target.
    pub target_element_id: String,
    /// How long recent input keeps an unfocused page counted as active.
    pub activity_grace_ms: u64,
    pub beacon_queue_capacity: usize,
    pub beacon_max_bytes: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/log/behavior".into(),
            sample_period_ms: 100,
            flush_interval_ms: 10_000,
            target_element_id: "viewBody".into(),
            activity_grace_ms: 1_000,
            beacon_queue_capacity: 32,
            beacon_max_bytes: 64 * 1024,
        }
    }
}

impl TrackerSettings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn activity_grace(&self) -> Duration {
        Duration::from_millis(self.activity_grace_ms)
    }

    pub fn with_sample_period_ms(mut self, period_ms: u64) -> Self {
        self.sample_period_ms = period_ms;
        self
    }

    /// Apply `NPTI_BEACON_ENDPOINT` if present.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
            }
        }
        self
    }

    pub fn validated(self) -> Result<Self> {
        if self.sample_period_ms == 0 {
            bail!("samplePeriodMs must be greater than zero");
        }
        if self.flush_interval_ms == 0 {
            bail!("flushIntervalMs must be greater than zero");
        }
        if self.endpoint.trim().is_empty() {
            bail!("endpoint must not be empty");
        }
        if self.target_element_id.is_empty() {
            bail!("targetElementId must not be empty");
        }
        Ok(self)
    }
}

/// Tracker settings backed by a JSON file.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    /// Load from `path`; a missing file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current settings with environment overrides applied, validated.
    pub fn tracker(&self) -> Result<TrackerSettings> {
        self.current().with_env_overrides().validated()
    }

    pub fn current(&self) -> TrackerSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: TrackerSettings) -> Result<()> {
        let settings = settings.validated()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: TrackerSettings = serde_json::from_str(&contents)?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("tracker.json")).unwrap();
        assert_eq!(store.current(), TrackerSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, r#"{ "samplePeriodMs": 250, "targetElementId": "articleBody" }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().current();
        assert_eq!(settings.sample_period_ms, 250);
        assert_eq!(settings.target_element_id, "articleBody");
        assert_eq!(settings.flush_interval_ms, 10_000);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let updated = TrackerSettings {
            flush_interval_ms: 5_000,
            ..TrackerSettings::default()
        };
        store.update(updated.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.current(), updated);
        reopened.reload().unwrap();
        assert_eq!(reopened.current(), updated);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(SettingsStore::new(path).is_err());
    }

    #[test]
    fn zero_periods_are_rejected() {
        assert!(TrackerSettings::default().with_sample_period_ms(0).validated().is_err());

        let no_flush = TrackerSettings {
            flush_interval_ms: 0,
            ..TrackerSettings::default()
        };
        assert!(no_flush.validated().is_err());
        assert!(TrackerSettings::default().validated().is_ok());
    }
}
