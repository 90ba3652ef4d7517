//! Configuration loading for MargaNav

use crate::announce::AnnounceConfig;
use crate::error::{NavError, Result};
use crate::navigation::{RerouteConfig, TrackerConfig};
use crate::position::WatchOptions;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MargaConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub reroute: RerouteConfig,
    #[serde(default)]
    pub announce: AnnounceConfig,
    #[serde(default)]
    pub position: WatchOptions,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Trace replay and navigation loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct ReplayConfig {
    /// Playback speed multiplier (0 = as fast as possible)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Navigation loop tick (milliseconds)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Cancel the session after this long without events (seconds)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: f32,

    /// Accept "better route" proposals without asking
    #[serde(default)]
    pub accept_better_routes: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            tick_interval_ms: default_tick_interval(),
            idle_timeout_secs: default_idle_timeout(),
            accept_better_routes: false,
        }
    }
}

fn default_speed() -> f32 {
    1.0
}
fn default_tick_interval() -> u64 {
    50
}
fn default_idle_timeout() -> f32 {
    5.0
}

impl MargaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MargaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the navigation core cannot run with
    pub fn validate(&self) -> Result<()> {
        let t = &self.tracker;
        if !(t.advance_threshold_m > 0.0) || !(t.arrival_threshold_m > 0.0) {
            return Err(NavError::Config(
                "tracker thresholds must be positive".to_string(),
            ));
        }
        if t.announce_thresholds_m.iter().any(|d| !(*d > 0.0)) {
            return Err(NavError::Config(
                "announce thresholds must be positive".to_string(),
            ));
        }
        let r = &self.reroute;
        if !(r.check_interval_secs > 0.0) {
            return Err(NavError::Config(
                "reroute check interval must be positive".to_string(),
            ));
        }
        if r.deviation_samples == 0 || r.deviation_samples > r.history_len {
            return Err(NavError::Config(format!(
                "deviation_samples must be in 1..={}",
                r.history_len
            )));
        }
        if self.replay.tick_interval_ms == 0 {
            return Err(NavError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = MargaConfig::from_toml_str("").unwrap();
        assert_eq!(config.tracker.advance_threshold_m, 20.0);
        assert_eq!(config.tracker.arrival_threshold_m, 50.0);
        assert_eq!(config.tracker.announce_thresholds_m, vec![100.0, 50.0]);
        assert_eq!(config.reroute.check_interval_secs, 30.0);
        assert_eq!(config.reroute.savings_threshold_secs, 120.0);
        assert_eq!(config.position.min_interval_ms, 1000);
        assert!(!config.announce.muted);
    }

    #[test]
    fn test_partial_sections() {
        let config = MargaConfig::from_toml_str(
            r#"
            [tracker]
            arrival_threshold_m = 30.0

            [reroute]
            savings_threshold_secs = 60.0
            auto_reroute_on_deviation = false

            [replay]
            speed = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.tracker.arrival_threshold_m, 30.0);
        assert_eq!(config.tracker.advance_threshold_m, 20.0);
        assert_eq!(config.reroute.savings_threshold_secs, 60.0);
        assert!(!config.reroute.auto_reroute_on_deviation);
        assert_eq!(config.replay.speed, 0.0);
        assert_eq!(config.replay.tick_interval_ms, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MargaConfig::from_toml_str("[tracker]\nadvance_threshold_m = -1.0").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));

        let err = MargaConfig::from_toml_str("[reroute]\ndeviation_samples = 0").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = MargaConfig::from_toml_str(include_str!("../marga.toml")).unwrap();
        let defaults = MargaConfig::default();
        assert_eq!(
            config.tracker.announce_thresholds_m,
            defaults.tracker.announce_thresholds_m
        );
        assert_eq!(config.reroute.history_len, defaults.reroute.history_len);
        assert_eq!(config.position.timeout_ms, defaults.position.timeout_ms);
        assert_eq!(
            config.announce.words_per_minute,
            defaults.announce.words_per_minute
        );
    }

    #[test]
    fn test_malformed_toml() {
        let err = MargaConfig::from_toml_str("[tracker\n").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[announce]\nmuted = true").unwrap();

        let config = MargaConfig::load(file.path()).unwrap();
        assert!(config.announce.muted);

        let missing = MargaConfig::load(Path::new("/nonexistent/marga.toml"));
        assert!(matches!(missing, Err(NavError::Config(_))));
    }
}
