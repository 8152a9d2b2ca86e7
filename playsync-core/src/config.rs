//! Synchronization settings
//!
//! A single settings value is held by the engine and may be changed at any
//! time. Every field has a serde default so partial TOML/JSON documents load.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// How the reference endpoint of a group is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderPolicy {
    /// First qualifying endpoint in registration order
    #[default]
    #[serde(alias = "first")]
    FirstPlaying,
    /// The pinned endpoint, when it qualifies
    Manual,
    /// Greatest reported position
    LongestPlaying,
    /// Oldest (or no) seek/recovery event
    #[serde(alias = "least-buffered")]
    LeastRecentlyBuffered,
}

impl FromStr for LeaderPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" | "first-playing" => Ok(LeaderPolicy::FirstPlaying),
            "manual" => Ok(LeaderPolicy::Manual),
            "longest-playing" => Ok(LeaderPolicy::LongestPlaying),
            "least-buffered" | "least-recently-buffered" => Ok(LeaderPolicy::LeastRecentlyBuffered),
            other => Err(Error::InvalidConfig(format!("unknown leader policy: {}", other))),
        }
    }
}

/// Corrective behaviour for buffering, stalled and ad-interstitial endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackMode {
    /// Mute and keep playing
    #[default]
    #[serde(alias = "mute-continue")]
    MuteAndContinue,
    /// Pause and let a later tick resume
    #[serde(alias = "pause-catchup")]
    PauseAndWait,
    /// Leave the endpoint alone
    None,
}

impl FromStr for FallbackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mute-continue" | "mute-and-continue" => Ok(FallbackMode::MuteAndContinue),
            "pause-catchup" | "pause-and-wait" => Ok(FallbackMode::PauseAndWait),
            "none" => Ok(FallbackMode::None),
            other => Err(Error::InvalidConfig(format!("unknown fallback mode: {}", other))),
        }
    }
}

/// Which usable endpoints may act as the group reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderEligibility {
    /// Playing with a known position
    #[default]
    Strict,
    /// Strict first; otherwise the first usable endpoint with a known position
    AllowPausedFallback,
}

/// Shared synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Allowed drift before a seek is issued
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,

    /// Reconciliation ticks per second
    #[serde(default = "default_sync_frequency_hz")]
    pub sync_frequency_hz: f64,

    /// Age after which a tracked record counts as stalled
    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,

    /// Extra tolerance applied on the rejoin pass
    #[serde(default = "default_rejoin_buffer_ms")]
    pub rejoin_buffer_ms: u64,

    #[serde(default)]
    pub leader_policy: LeaderPolicy,

    /// Used only by [`LeaderPolicy::Manual`]
    #[serde(default)]
    pub pinned_leader: Option<String>,

    /// Run the recovery strategy for suspended endpoints
    #[serde(default = "default_true")]
    pub auto_recovery: bool,

    #[serde(default)]
    pub fallback_mode: FallbackMode,

    #[serde(default)]
    pub leader_eligibility: LeaderEligibility,
}

fn default_tolerance_ms() -> u64 {
    300
}

fn default_sync_frequency_hz() -> f64 {
    2.0
}

fn default_stall_threshold_ms() -> u64 {
    2500
}

fn default_rejoin_buffer_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tolerance_ms: default_tolerance_ms(),
            sync_frequency_hz: default_sync_frequency_hz(),
            stall_threshold_ms: default_stall_threshold_ms(),
            rejoin_buffer_ms: default_rejoin_buffer_ms(),
            leader_policy: LeaderPolicy::default(),
            pinned_leader: None,
            auto_recovery: true,
            fallback_mode: FallbackMode::default(),
            leader_eligibility: LeaderEligibility::default(),
        }
    }
}

impl SyncSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if !self.sync_frequency_hz.is_finite() || self.sync_frequency_hz <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sync_frequency_hz must be a positive number, got {}",
                self.sync_frequency_hz
            )));
        }
        if self.sync_frequency_hz > 1000.0 {
            return Err(Error::InvalidConfig(format!(
                "sync_frequency_hz must be at most 1000, got {}",
                self.sync_frequency_hz
            )));
        }
        Ok(())
    }

    /// Tick interval, `1000 / sync_frequency_hz` milliseconds
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sync_frequency_hz)
    }

    pub fn tolerance_secs(&self) -> f64 {
        self.tolerance_ms as f64 / 1000.0
    }

    /// Tolerance used on the rejoin pass, never below [`Self::tolerance_secs`]
    pub fn rejoin_tolerance_secs(&self) -> f64 {
        self.tolerance_ms.saturating_add(self.rejoin_buffer_ms) as f64 / 1000.0
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    /// Apply a partial update, returning whether the tick interval changed
    ///
    /// The update is validated as a whole; on error `self` is left untouched.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Result<bool> {
        let mut next = self.clone();
        if let Some(tolerance_ms) = patch.tolerance_ms {
            next.tolerance_ms = tolerance_ms;
        }
        if let Some(hz) = patch.sync_frequency_hz {
            next.sync_frequency_hz = hz;
        }
        if let Some(stall) = patch.stall_threshold_ms {
            next.stall_threshold_ms = stall;
        }
        if let Some(buffer) = patch.rejoin_buffer_ms {
            next.rejoin_buffer_ms = buffer;
        }
        if let Some(policy) = patch.leader_policy {
            next.leader_policy = policy;
        }
        if let Some(pinned) = &patch.pinned_leader {
            // Empty string clears the pin
            next.pinned_leader = if pinned.is_empty() {
                None
            } else {
                Some(pinned.clone())
            };
        }
        if let Some(auto_recovery) = patch.auto_recovery {
            next.auto_recovery = auto_recovery;
        }
        if let Some(mode) = patch.fallback_mode {
            next.fallback_mode = mode;
        }
        if let Some(eligibility) = patch.leader_eligibility {
            next.leader_eligibility = eligibility;
        }
        next.validate()?;

        let interval_changed = next.sync_frequency_hz != self.sync_frequency_hz;
        *self = next;
        Ok(interval_changed)
    }
}

/// Partial settings update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub tolerance_ms: Option<u64>,
    #[serde(default)]
    pub sync_frequency_hz: Option<f64>,
    #[serde(default)]
    pub stall_threshold_ms: Option<u64>,
    #[serde(default)]
    pub rejoin_buffer_ms: Option<u64>,
    #[serde(default)]
    pub leader_policy: Option<LeaderPolicy>,
    /// Empty string clears the pinned leader
    #[serde(default)]
    pub pinned_leader: Option<String>,
    #[serde(default)]
    pub auto_recovery: Option<bool>,
    #[serde(default)]
    pub fallback_mode: Option<FallbackMode>,
    #[serde(default)]
    pub leader_eligibility: Option<LeaderEligibility>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.tolerance_ms, 300);
        assert_eq!(settings.stall_threshold_ms, 2500);
        assert_eq!(settings.rejoin_buffer_ms, 500);
        assert_eq!(settings.leader_policy, LeaderPolicy::FirstPlaying);
        assert_eq!(settings.fallback_mode, FallbackMode::MuteAndContinue);
        assert!(settings.auto_recovery);
        assert_eq!(settings.tick_interval(), Duration::from_millis(500));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejoin_tolerance_widens() {
        let settings = SyncSettings::default();
        assert!((settings.tolerance_secs() - 0.3).abs() < 1e-9);
        assert!((settings.rejoin_tolerance_secs() - 0.8).abs() < 1e-9);
        assert!(settings.rejoin_tolerance_secs() >= settings.tolerance_secs());
    }

    #[test]
    fn test_invalid_frequency() {
        let mut settings = SyncSettings::default();
        settings.sync_frequency_hz = 0.0;
        assert!(settings.validate().is_err());
        settings.sync_frequency_hz = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_apply_patch() {
        let mut settings = SyncSettings::default();
        let patch = SettingsPatch {
            sync_frequency_hz: Some(4.0),
            pinned_leader: Some("a".to_string()),
            leader_policy: Some(LeaderPolicy::Manual),
            ..Default::default()
        };
        assert!(settings.apply(&patch).unwrap());
        assert_eq!(settings.tick_interval(), Duration::from_millis(250));
        assert_eq!(settings.pinned_leader.as_deref(), Some("a"));

        let clear = SettingsPatch {
            pinned_leader: Some(String::new()),
            ..Default::default()
        };
        assert!(!settings.apply(&clear).unwrap());
        assert_eq!(settings.pinned_leader, None);
    }

    #[test]
    fn test_rejected_patch_leaves_settings() {
        let mut settings = SyncSettings::default();
        let patch = SettingsPatch {
            tolerance_ms: Some(50),
            sync_frequency_hz: Some(-1.0),
            ..Default::default()
        };
        assert!(settings.apply(&patch).is_err());
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_deserialize_aliases() {
        let json = r#"{"leader_policy":"least-buffered","fallback_mode":"pause-catchup"}"#;
        let settings: SyncSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.leader_policy, LeaderPolicy::LeastRecentlyBuffered);
        assert_eq!(settings.fallback_mode, FallbackMode::PauseAndWait);
        assert_eq!(settings.tolerance_ms, 300);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "longest-playing".parse::<LeaderPolicy>().unwrap(),
            LeaderPolicy::LongestPlaying
        );
        assert_eq!("none".parse::<FallbackMode>().unwrap(), FallbackMode::None);
        assert!("sometimes".parse::<FallbackMode>().is_err());
    }
}
