// Engine configuration - Tunable timing parameters with serde persistence

use std::io::Read;

/// Tunable timing parameters. All defaults are safe for interactive use.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduling lookahead between "now" and the shared start anchor
    pub lookahead_secs: f64,
    /// Drift below this is ignored
    pub drift_threshold_secs: f64,
    /// Fraction of the measured drift corrected per step, at most 0.5
    pub drift_correction_max: f64,
    /// Drift is estimated every this many sync ticks
    pub drift_check_interval_ticks: u32,
    /// How long a deferred audio start may wait for its buffer
    pub deferred_start_deadline_secs: f64,
    /// Minimum gap between programmatic auto-resumes
    pub auto_resume_cooldown_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.1,
            drift_threshold_secs: 0.010,
            drift_correction_max: 0.5,
            drift_check_interval_ticks: 30,
            deferred_start_deadline_secs: 5.0,
            auto_resume_cooldown_secs: 0.5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineConfig {
    /// Load from JSON, clamping out-of-range values instead of rejecting
    /// them.
    pub fn from_json(reader: impl Read) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_reader(reader)?;
        config.sanitize();
        Ok(config)
    }

    /// Clamp fields into their valid ranges.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.lookahead_secs.is_finite() || self.lookahead_secs < 0.0 {
            self.lookahead_secs = defaults.lookahead_secs;
        }
        if !self.drift_threshold_secs.is_finite() || self.drift_threshold_secs <= 0.0 {
            self.drift_threshold_secs = defaults.drift_threshold_secs;
        }
        if !self.drift_correction_max.is_finite() {
            self.drift_correction_max = defaults.drift_correction_max;
        }
        // never correct more than half the measured error in one step
        self.drift_correction_max = self.drift_correction_max.clamp(0.0, 0.5);
        if self.drift_check_interval_ticks == 0 {
            self.drift_check_interval_ticks = defaults.drift_check_interval_ticks;
        }
        if !self.deferred_start_deadline_secs.is_finite() || self.deferred_start_deadline_secs <= 0.0
        {
            self.deferred_start_deadline_secs = defaults.deferred_start_deadline_secs;
        }
        if !self.auto_resume_cooldown_secs.is_finite() || self.auto_resume_cooldown_secs < 0.0 {
            self.auto_resume_cooldown_secs = defaults.auto_resume_cooldown_secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.drift_threshold_secs, 0.010);
        assert_eq!(config.drift_correction_max, 0.5);
        assert_eq!(config.auto_resume_cooldown_secs, 0.5);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{ "lookahead_secs": 0.05 }"#;
        let config = EngineConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(config.lookahead_secs, 0.05);
        assert_eq!(
            config.drift_threshold_secs,
            EngineConfig::default().drift_threshold_secs
        );
    }

    #[test]
    fn test_sanitize_caps_correction() {
        let json = r#"{ "drift_correction_max": 0.9, "drift_check_interval_ticks": 0 }"#;
        let config = EngineConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(config.drift_correction_max, 0.5);
        assert_eq!(
            config.drift_check_interval_ticks,
            EngineConfig::default().drift_check_interval_ticks
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(EngineConfig::from_json("not json".as_bytes()).is_err());
    }
}
