//! Browser configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use surf_vault::BackendChoice;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of everything the browser writes
    pub data_dir: PathBuf,
    /// Session store
    pub database_path: PathBuf,
    /// Local credential store
    pub credentials_path: PathBuf,
    /// Snapshot artifacts
    pub snapshot_dir: PathBuf,
    /// Idle time after which a background tab is unloaded
    pub unload_timeout_secs: u64,
    /// Loaded tabs allowed per session before the oldest are unloaded
    pub max_loaded_tabs: usize,
    /// How often the eviction check runs
    pub unload_check_interval_secs: u64,
    /// Capture a preview before unloading a tab
    pub snapshots_enabled: bool,
    /// 0 disables autosave
    pub autosave_interval_secs: u64,
    pub credential_backend: BackendChoice,
    pub autofill_enabled: bool,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("sessions.db"),
            credentials_path: data_dir.join("passwords.db"),
            snapshot_dir: data_dir.join("snapshots"),
            data_dir,
            unload_timeout_secs: 120,
            max_loaded_tabs: 3,
            unload_check_interval_secs: 60,
            snapshots_enabled: false,
            autosave_interval_secs: 30,
            credential_backend: BackendChoice::Auto,
            autofill_enabled: true,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("surf"))
            .unwrap_or_else(|| PathBuf::from(".surf"))
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn unload_timeout(&self) -> Duration {
        Duration::from_secs(self.unload_timeout_secs)
    }

    pub fn unload_check_interval(&self) -> Duration {
        Duration::from_secs(self.unload_check_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_loaded_tabs == 0 {
            return Err(CoreError::Config(
                "max_loaded_tabs must be at least 1".to_string(),
            ));
        }
        if self.unload_check_interval_secs == 0 {
            return Err(CoreError::Config(
                "unload_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `SURF_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = lookup("SURF_UNLOAD_TIMEOUT").and_then(|v| positive(&v)) {
            self.unload_timeout_secs = secs;
        }

        if let Some(max) = lookup("SURF_MAX_LOADED_TABS").and_then(|v| positive(&v)) {
            self.max_loaded_tabs = max as usize;
        }

        if let Some(value) = lookup("SURF_ENABLE_SNAPSHOTS") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.snapshots_enabled = true,
                "0" | "false" | "no" | "off" => self.snapshots_enabled = false,
                other => tracing::warn!(value = other, "Ignoring SURF_ENABLE_SNAPSHOTS"),
            }
        }

        if let Some(value) = lookup("SURF_CREDENTIAL_BACKEND") {
            match value.parse::<BackendChoice>() {
                Ok(choice) => self.credential_backend = choice,
                Err(e) => tracing::warn!(error = %e, "Ignoring SURF_CREDENTIAL_BACKEND"),
            }
        }

        if let Some(path) = lookup("SURF_CREDENTIALS_PATH").filter(|p| !p.trim().is_empty()) {
            self.credentials_path = PathBuf::from(path);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

fn positive(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::new(PathBuf::from("/data/surf"));
        config.apply_overrides(|key| env.get(key).cloned());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/data/surf"));
        assert_eq!(config.database_path, PathBuf::from("/data/surf/sessions.db"));
        assert_eq!(config.credentials_path, PathBuf::from("/data/surf/passwords.db"));
        assert_eq!(config.unload_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_loaded_tabs, 3);
        assert!(!config.snapshots_enabled);
        assert_eq!(config.credential_backend, BackendChoice::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = apply(&[
            ("SURF_UNLOAD_TIMEOUT", "300"),
            ("SURF_MAX_LOADED_TABS", "5"),
            ("SURF_ENABLE_SNAPSHOTS", "true"),
            ("SURF_CREDENTIAL_BACKEND", "local"),
            ("SURF_CREDENTIALS_PATH", "/secure/passwords.db"),
        ]);
        assert_eq!(config.unload_timeout_secs, 300);
        assert_eq!(config.max_loaded_tabs, 5);
        assert!(config.snapshots_enabled);
        assert_eq!(config.credential_backend, BackendChoice::Local);
        assert_eq!(config.credentials_path, PathBuf::from("/secure/passwords.db"));
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let config = apply(&[
            ("SURF_UNLOAD_TIMEOUT", "0"),
            ("SURF_MAX_LOADED_TABS", "many"),
            ("SURF_ENABLE_SNAPSHOTS", "maybe"),
            ("SURF_CREDENTIAL_BACKEND", "cloud"),
            ("SURF_CREDENTIALS_PATH", " "),
        ]);
        assert_eq!(config.unload_timeout_secs, 120);
        assert_eq!(config.max_loaded_tabs, 3);
        assert!(!config.snapshots_enabled);
        assert_eq!(config.credential_backend, BackendChoice::Auto);
        assert_eq!(config.credentials_path, PathBuf::from("/data/surf/passwords.db"));
    }

    #[test]
    fn test_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_loaded_tabs": 6, "credential_backend": "platform" }"#)
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_loaded_tabs, 6);
        assert_eq!(config.credential_backend, BackendChoice::Platform);
        assert_eq!(config.unload_timeout_secs, 120);
    }
}
