//! Settings persistence.
//!
//! The persisted record holds the user-facing choices: mode, volume,
//! exposure profile and the governor toggles. It is loaded at startup and
//! saved on configuration apply and on shutdown.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use earguard_exposure::{clamp_percent, ExposureProfile};
use earguard_governor::{DynamicStrategy, DynamicTuning, GovernorPolicy, GoverningMode};

use crate::error::{MonitorError, MonitorResult};

/// Settings file name under the platform config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// The persisted settings record. Missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSettings {
    pub mode: GoverningMode,
    pub volume: f64,
    pub profile: ExposureProfile,
    pub hard_lock_enabled: bool,
    pub lock_on_autoadjust: bool,
    pub dynamic_strategy: DynamicStrategy,
    pub dynamic_softlock_enabled: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        let profile = ExposureProfile::default();
        let policy = GovernorPolicy::default();
        Self {
            mode: GoverningMode::Fixed,
            volume: profile.default_volume,
            profile,
            hard_lock_enabled: policy.hard_lock_enabled,
            lock_on_autoadjust: policy.lock_on_autoadjust,
            dynamic_strategy: policy.strategy,
            dynamic_softlock_enabled: policy.softlock_enabled,
        }
    }
}

impl PersistedSettings {
    /// Governor policy for these toggles with the given tuning.
    pub fn policy(&self, tuning: DynamicTuning) -> GovernorPolicy {
        GovernorPolicy {
            hard_lock_enabled: self.hard_lock_enabled,
            lock_on_autoadjust: self.lock_on_autoadjust,
            softlock_enabled: self.dynamic_softlock_enabled,
            strategy: self.dynamic_strategy,
            tuning,
        }
    }

    /// Replace an invalid profile with the default one and clamp the volume.
    pub fn sanitized(mut self) -> Self {
        if let Err(e) = self.profile.validate() {
            warn!(error = %e, "Persisted profile is invalid, using defaults");
            self.profile = ExposureProfile::default();
        }
        self.volume = if self.volume.is_finite() {
            clamp_percent(self.volume)
        } else {
            self.profile.default_volume
        };
        self
    }
}

/// Storage for [`PersistedSettings`].
pub trait SettingsStore: Send + Sync {
    /// Load settings. Returns defaults when nothing was saved yet.
    fn load(&self) -> MonitorResult<PersistedSettings>;

    /// Save settings.
    fn save(&self, settings: &PersistedSettings) -> MonitorResult<()>;
}

/// JSON file settings store. Writes go to `.tmp` first and are renamed
/// into place.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/earguard/settings.json`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("earguard").join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> MonitorResult<PersistedSettings> {
        if !self.path.exists() {
            return Ok(PersistedSettings::default());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|e| MonitorError::Persistence(format!("deserialization failed: {e}")))
    }

    fn save(&self, settings: &PersistedSettings) -> MonitorResult<()> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| MonitorError::Persistence(format!("serialization failed: {e}")))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

/// In-memory settings store (for testing and ephemeral runs).
#[derive(Debug, Default)]
pub struct InMemorySettings {
    data: Mutex<Option<PersistedSettings>>,
    saves: AtomicUsize,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the store.
    pub fn with(settings: PersistedSettings) -> Self {
        Self {
            data: Mutex::new(Some(settings)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// The last saved (or seeded) record.
    pub fn stored(&self) -> Option<PersistedSettings> {
        self.data.lock().ok().and_then(|d| d.clone())
    }
}

impl SettingsStore for InMemorySettings {
    fn load(&self) -> MonitorResult<PersistedSettings> {
        let data = self
            .data
            .lock()
            .map_err(|_| MonitorError::Persistence("settings lock poisoned".into()))?;
        Ok(data.clone().unwrap_or_default())
    }

    fn save(&self, settings: &PersistedSettings) -> MonitorResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| MonitorError::Persistence("settings lock poisoned".into()))?;
        *data = Some(settings.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Load through `store`, falling back to defaults on failure.
pub fn load_or_default(store: &dyn SettingsStore) -> PersistedSettings {
    match store.load() {
        Ok(settings) => settings.sanitized(),
        Err(e) => {
            warn!(error = %e, "Failed to load settings, using defaults");
            PersistedSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::new(dir.path().join("nested").join(SETTINGS_FILE));

        let settings = PersistedSettings {
            mode: GoverningMode::Dynamic,
            volume: 42.0,
            profile: ExposureProfile::who(),
            dynamic_strategy: DynamicStrategy::SafeZone,
            lock_on_autoadjust: false,
            ..Default::default()
        };
        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), settings);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn json_load_nonexistent_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::new(dir.path().join(SETTINGS_FILE));
        assert_eq!(store.load().unwrap(), PersistedSettings::default());
    }

    #[test]
    fn partial_record_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"mode":"dynamic","profile":{"ref_db":80.0}}"#).unwrap();

        let loaded = JsonFileSettings::new(&path).load().unwrap();
        assert_eq!(loaded.mode, GoverningMode::Dynamic);
        assert_eq!(loaded.profile.ref_db, 80.0);
        assert_eq!(loaded.profile.max_db, 95.0);
        assert_eq!(loaded.volume, 30.0);
        assert!(loaded.hard_lock_enabled);
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileSettings::new(&path);
        assert!(matches!(store.load(), Err(MonitorError::Persistence(_))));
        assert_eq!(load_or_default(&store), PersistedSettings::default());
    }

    #[test]
    fn invalid_profile_is_replaced() {
        let mut settings = PersistedSettings::default();
        settings.profile.exchange_rate_db = 0.0;
        settings.volume = 140.0;
        let clean = settings.sanitized();
        assert_eq!(clean.profile, ExposureProfile::default());
        assert_eq!(clean.volume, 100.0);
    }

    #[test]
    fn in_memory_store_counts_saves() {
        let store = InMemorySettings::new();
        assert_eq!(store.load().unwrap(), PersistedSettings::default());
        store.save(&PersistedSettings::default()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.stored().is_some());
    }
}
