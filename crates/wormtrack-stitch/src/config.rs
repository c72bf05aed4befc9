//! Configuration for the stitching pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::candidates::{ConeParams, FRAME_RATE};
use crate::error::{ConfigError, StitchResult};

/// Default minimum lifetime, seconds.
pub const DEFAULT_MIN_TIME: f64 = 10.0;

/// Default minimum travel in body lengths.
pub const DEFAULT_MIN_MOVE: f64 = 2.0;

/// Default displacement horizon, seconds.
pub const DEFAULT_HORIZON: f64 = 50.0;

/// Default log10 score threshold for accepting a join.
pub const DEFAULT_LOG_THRESHOLD: f64 = -2.0;

// ---------------------------------------------------------------------------
// StitchConfig
// ---------------------------------------------------------------------------

/// Tunable parameters of one stitching run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StitchConfig {
    /// Entities shorter-lived than this many seconds are dropped before
    /// anything else happens (summary tier).
    pub min_time: f64,
    /// Entities travelling fewer than this many body lengths are dropped
    /// after parsing (record tier).
    pub min_move: f64,
    /// How far into each track, in seconds, displacement examples are
    /// collected for fitting the scorer.
    pub horizon: f64,
    /// Recording rate, frames per second.
    pub frame_rate: f64,
    /// Admissibility cone for the candidate search.
    pub cone: ConeParams,
    /// Joins whose best log10 score falls below this are rejected.
    pub log_threshold: f64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            min_time: DEFAULT_MIN_TIME,
            min_move: DEFAULT_MIN_MOVE,
            horizon: DEFAULT_HORIZON,
            frame_rate: FRAME_RATE,
            cone: ConeParams::default(),
            log_threshold: DEFAULT_LOG_THRESHOLD,
        }
    }
}

impl StitchConfig {
    /// Load a configuration from a JSON file. Missing fields take their
    /// defaults; the result is validated.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileRead`], [`ConfigError::ParseError`], or any
    /// validation failure.
    pub fn from_file(path: impl AsRef<Path>) -> StitchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field for sanity.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> StitchResult<()> {
        if !(self.min_time >= 0.0) {
            return Err(ConfigError::invalid_value("min_time", "must be >= 0").into());
        }
        if !(self.min_move >= 0.0) {
            return Err(ConfigError::invalid_value("min_move", "must be >= 0").into());
        }
        if !(self.horizon > 0.0) {
            return Err(ConfigError::invalid_value("horizon", "must be > 0").into());
        }
        if !(self.frame_rate > 0.0) {
            return Err(ConfigError::invalid_value("frame_rate", "must be > 0").into());
        }
        if self.cone.max_frame_gap == 0 {
            return Err(ConfigError::invalid_value("cone.max_frame_gap", "must be >= 1").into());
        }
        if !(self.cone.max_speed > 0.0) {
            return Err(ConfigError::invalid_value("cone.max_speed", "must be > 0").into());
        }
        if !(self.cone.position_error >= 0.0) {
            return Err(ConfigError::invalid_value("cone.position_error", "must be >= 0").into());
        }
        if !self.log_threshold.is_finite() {
            return Err(ConfigError::invalid_value("log_threshold", "must be finite").into());
        }
        Ok(())
    }

    /// The displacement horizon in frames.
    #[must_use]
    pub fn horizon_frames(&self) -> usize {
        (self.horizon * self.frame_rate) as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StitchError;

    #[test]
    fn defaults_validate() {
        let config = StitchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.horizon_frames(), 700);
    }

    #[test]
    fn nan_and_negative_fields_rejected() {
        for config in [
            StitchConfig {
                min_time: -1.0,
                ..Default::default()
            },
            StitchConfig {
                horizon: 0.0,
                ..Default::default()
            },
            StitchConfig {
                frame_rate: f64::NAN,
                ..Default::default()
            },
            StitchConfig {
                log_threshold: f64::NEG_INFINITY,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(StitchError::Config(ConfigError::InvalidValue { .. }))
            ));
        }
    }

    #[test]
    fn from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stitch.json");
        std::fs::write(&path, r#"{"min_time": 5.0, "log_threshold": -1.5}"#).unwrap();

        let config = StitchConfig::from_file(&path).unwrap();
        assert_eq!(config.min_time, 5.0);
        assert_eq!(config.log_threshold, -1.5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.min_move, DEFAULT_MIN_MOVE);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            StitchConfig::from_file(&path).unwrap_err(),
            StitchError::Config(ConfigError::ParseError { .. })
        ));

        assert!(matches!(
            StitchConfig::from_file(dir.path().join("missing.json")).unwrap_err(),
            StitchError::Config(ConfigError::FileRead { .. })
        ));
    }

    #[test]
    fn invalid_file_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stitch.json");
        std::fs::write(&path, r#"{"horizon": -3.0}"#).unwrap();
        assert!(StitchConfig::from_file(&path).is_err());
    }
}
