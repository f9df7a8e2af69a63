use anyhow::{Context, Result, anyhow, bail};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::model::{ChatId, CheckTime};

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

const MAX_OFFSET_MINUTES: i32 = 24 * 60;

/// Credentials for the forecast provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// operator_chat = 12345
/// utc_offset_minutes = 60
/// check_times = [{ hour = 8, minute = 0 }, { hour = 18, minute = 0 }]
///
/// [openweather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat allowed to list every chat's alerts.
    pub operator_chat: Option<ChatId>,

    /// Fixed offset from UTC the check times are expressed in.
    pub utc_offset_minutes: i32,

    /// Location of the alert document; defaults to the platform data dir.
    pub store_path: Option<PathBuf>,

    /// Daily check times, one alert job per time and location.
    pub check_times: Vec<CheckTime>,

    pub openweather: Option<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            operator_chat: None,
            utc_offset_minutes: 0,
            store_path: None,
            check_times: vec![CheckTime::new(8, 0)],
            openweather: None,
        }
    }
}

impl Config {
    /// Load config from disk, or return the default if it doesn't exist yet.
    ///
    /// `OPENWEATHER_API_KEY` takes precedence over the stored key.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                cfg.set_openweather_api_key(key.trim().to_string());
            }
        }

        Ok(cfg)
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "snowalert", "snowalert")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path of the alert document, configured or platform default.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("contents.json")),
        }
    }

    /// Check ranges and sort check times ascending.
    ///
    /// Two check times in the same hour are rejected because alert names only
    /// carry the hour and would collide.
    pub fn validate(&mut self) -> Result<()> {
        if self.check_times.is_empty() {
            bail!("At least one check time is required");
        }

        let mut hours = HashSet::new();
        for time in &self.check_times {
            if time.to_naive_time().is_none() {
                bail!(
                    "Invalid check time {:02}:{:02}:{:02}",
                    time.hour,
                    time.minute,
                    time.second
                );
            }
            if !hours.insert(time.hour) {
                bail!("Check times must fall in distinct hours, {} repeats hour {}", time, time.hour);
            }
        }

        if self.utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            bail!("UTC offset of {} minutes is out of range", self.utc_offset_minutes);
        }

        self.check_times.sort();
        Ok(())
    }

    /// Offset the check times are interpreted in.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC offset of {} minutes is out of range", self.utc_offset_minutes))
    }

    pub fn set_openweather_api_key(&mut self, api_key: String) {
        self.openweather = Some(ProviderConfig { api_key });
    }

    /// Returns the OpenWeatherMap API key, if present.
    pub fn openweather_api_key(&self) -> Option<&str> {
        self.openweather.as_ref().map(|cfg| cfg.api_key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_morning_check() {
        let cfg = Config::default();

        assert_eq!(cfg.check_times, vec![CheckTime::new(8, 0)]);
        assert!(cfg.openweather_api_key().is_none());
        assert_eq!(cfg.operator_chat, None);
    }

    #[test]
    fn validate_sorts_check_times() {
        let mut cfg = Config {
            check_times: vec![CheckTime::new(18, 0), CheckTime::new(7, 30)],
            ..Config::default()
        };

        cfg.validate().expect("valid config");

        assert_eq!(cfg.check_times, vec![CheckTime::new(7, 30), CheckTime::new(18, 0)]);
    }

    #[test]
    fn validate_rejects_shared_hour() {
        let mut cfg = Config {
            check_times: vec![CheckTime::new(8, 0), CheckTime::new(8, 30)],
            ..Config::default()
        };

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("distinct hours"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut empty = Config { check_times: Vec::new(), ..Config::default() };
        assert!(empty.validate().is_err());

        let mut bad_time = Config {
            check_times: vec![CheckTime { hour: 25, minute: 0, second: 0 }],
            ..Config::default()
        };
        assert!(bad_time.validate().is_err());

        let mut bad_offset = Config { utc_offset_minutes: 24 * 60, ..Config::default() };
        assert!(bad_offset.validate().is_err());
    }

    #[test]
    fn toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config {
            operator_chat: Some(ChatId(42)),
            utc_offset_minutes: 60,
            check_times: vec![CheckTime::new(6, 0), CheckTime::new(20, 15)],
            ..Config::default()
        };
        cfg.set_openweather_api_key("OPEN_KEY".into());
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.operator_chat, Some(ChatId(42)));
        assert_eq!(loaded.openweather_api_key(), Some("OPEN_KEY"));
        assert_eq!(loaded.check_times, cfg.check_times);
        assert_eq!(loaded.utc_offset().unwrap().local_minus_utc(), 3600);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("operator_chat = 7\n").unwrap();

        assert_eq!(cfg.operator_chat, Some(ChatId(7)));
        assert_eq!(cfg.check_times, vec![CheckTime::new(8, 0)]);
        assert_eq!(cfg.utc_offset_minutes, 0);
    }

    #[test]
    fn missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.store_path.is_none());
    }
}
