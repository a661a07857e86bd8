//! Configuration for form sessions
//!
//! Defaults match the behaviour expected by most forms. Values can be
//! overridden from a JSON document or from `FORMFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::domain::step_controller::ControllerOptions;
use crate::CoreError;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    /// Refuse forward navigation past an invalid required step
    #[serde(default = "default_true")]
    pub validate_on_step_change: bool,

    /// Validate a field every time it changes
    #[serde(default)]
    pub validate_on_change: bool,

    /// Validate a field when it loses focus
    #[serde(default = "default_true")]
    pub validate_on_blur: bool,

    /// Key of the durable snapshot; no key means nothing is persisted
    #[serde(default)]
    pub storage_key: Option<String>,

    /// Snapshots older than this are discarded on restore; none means no expiry
    #[serde(default)]
    pub snapshot_max_age_secs: Option<u64>,

    /// Autosave scheduling
    #[serde(default)]
    pub auto_save: AutoSaveConfig,
}

/// Autosave scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Run the debounce and periodic timers
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after the last mutation before a save
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Interval of the periodic save
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// How long `Saved` stays visible
    #[serde(default = "default_saved_display_ms")]
    pub saved_display_ms: u64,

    /// How long `Error` stays visible
    #[serde(default = "default_error_display_ms")]
    pub error_display_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_saved_display_ms() -> u64 {
    3000
}

fn default_error_display_ms() -> u64 {
    5000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: default_delay_ms(),
            interval_ms: default_interval_ms(),
            saved_display_ms: default_saved_display_ms(),
            error_display_ms: default_error_display_ms(),
        }
    }
}

impl AutoSaveConfig {
    /// Debounce delay
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Periodic interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Display time of `Saved`
    pub fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }

    /// Display time of `Error`
    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on_step_change: true,
            validate_on_change: false,
            validate_on_blur: true,
            storage_key: None,
            snapshot_max_age_secs: None,
            auto_save: AutoSaveConfig::default(),
        }
    }
}

impl FormConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        read_flag("FORMFLOW_VALIDATE_ON_STEP_CHANGE", &mut config.validate_on_step_change);
        read_flag("FORMFLOW_VALIDATE_ON_CHANGE", &mut config.validate_on_change);
        read_flag("FORMFLOW_VALIDATE_ON_BLUR", &mut config.validate_on_blur);

        if let Ok(key) = env::var("FORMFLOW_STORAGE_KEY") {
            config.storage_key = Some(key);
        }

        if let Ok(max_age) = env::var("FORMFLOW_SNAPSHOT_MAX_AGE_SECS") {
            if let Ok(secs) = max_age.parse::<u64>() {
                config.snapshot_max_age_secs = Some(secs);
            } else {
                warn!("Invalid FORMFLOW_SNAPSHOT_MAX_AGE_SECS value: {}", max_age);
            }
        }

        read_flag("FORMFLOW_AUTOSAVE_ENABLED", &mut config.auto_save.enabled);
        read_millis("FORMFLOW_AUTOSAVE_DELAY_MS", &mut config.auto_save.delay_ms);
        read_millis("FORMFLOW_AUTOSAVE_INTERVAL_MS", &mut config.auto_save.interval_ms);
        read_millis("FORMFLOW_SAVED_DISPLAY_MS", &mut config.auto_save.saved_display_ms);
        read_millis("FORMFLOW_ERROR_DISPLAY_MS", &mut config.auto_save.error_display_ms);

        config
    }

    /// Parse a JSON configuration document; missing keys take their defaults
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid form config: {}", e)))
    }

    /// Set the storage key
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(key) = &self.storage_key {
            if key.trim().is_empty() {
                return Err(CoreError::ConfigurationError(
                    "storage_key must not be empty".to_string(),
                ));
            }
        }
        if self.snapshot_max_age_secs == Some(0) {
            return Err(CoreError::ConfigurationError(
                "snapshot_max_age_secs must be positive".to_string(),
            ));
        }

        let auto_save = &self.auto_save;
        for (name, value) in [
            ("delay_ms", auto_save.delay_ms),
            ("interval_ms", auto_save.interval_ms),
            ("saved_display_ms", auto_save.saved_display_ms),
            ("error_display_ms", auto_save.error_display_ms),
        ] {
            if value == 0 {
                return Err(CoreError::ConfigurationError(format!(
                    "auto_save.{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Snapshot validity window
    pub fn snapshot_max_age(&self) -> Option<chrono::Duration> {
        self.snapshot_max_age_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }

    /// Step controller switches
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            validate_on_step_change: self.validate_on_step_change,
            validate_on_change: self.validate_on_change,
            validate_on_blur: self.validate_on_blur,
        }
    }
}

fn read_flag(name: &str, target: &mut bool) {
    if let Ok(raw) = env::var(name) {
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => *target = true,
            "false" | "0" | "no" => *target = false,
            _ => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

fn read_millis(name: &str, target: &mut u64) {
    if let Ok(raw) = env::var(name) {
        if let Ok(value) = raw.parse::<u64>() {
            *target = value;
        } else {
            warn!("Invalid {} value: {}", name, raw);
        }
    }
}
