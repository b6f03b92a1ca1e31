// System-wide settings
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// History is sized as if one sample were taken every five minutes,
/// whatever the actual refresh rate is.
pub const RECORDS_PER_DAY: usize = 24 * 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Simulation tick period in seconds.
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u64,
    #[serde(default = "default_alarm_notification")]
    pub alarm_notification: bool,
    #[serde(default = "default_retention_days")]
    pub data_retention_days: u32,
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsValidationError {
    #[error("refresh_rate must be at least 1 second")]
    RefreshRate,
    #[error("data_retention_days must be at least 1")]
    RetentionDays,
}

fn default_refresh_rate() -> u64 {
    5
}

fn default_alarm_notification() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            refresh_rate: default_refresh_rate(),
            alarm_notification: default_alarm_notification(),
            data_retention_days: default_retention_days(),
            theme: Theme::default(),
        }
    }
}

impl SystemSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.refresh_rate)
    }

    /// Per-point history capacity implied by the retention window.
    pub fn max_history_records(&self) -> usize {
        (self.data_retention_days as usize).saturating_mul(RECORDS_PER_DAY)
    }

    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.refresh_rate == 0 {
            return Err(SettingsValidationError::RefreshRate);
        }
        if self.data_retention_days == 0 {
            return Err(SettingsValidationError::RetentionDays);
        }
        Ok(())
    }
}
