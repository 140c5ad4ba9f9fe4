//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// What an `Unknown` eye status does to the closed-eye streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    /// Any frame that is not `Closed` ends the streak
    #[default]
    Reset,
    /// Detection dropouts keep the streak at its last value
    Hold,
}

/// Drowsiness monitor configuration, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Consecutive closed-eye frames tolerated before alerting
    pub closed_threshold: u32,

    /// Head-tilt ratio above which the driver counts as distracted
    pub tilt_threshold: f32,

    /// Classifier score above which an eye counts as open
    pub open_score_threshold: f32,

    /// Streak handling for frames where neither eye could be classified
    pub unknown_policy: UnknownPolicy,

    /// Frames kept for PERCLOS (~1 minute at 15fps)
    pub perclos_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            closed_threshold: 10,
            tilt_threshold: 0.5,
            open_score_threshold: 0.5,
            unknown_policy: UnknownPolicy::Reset,
            perclos_window: 900,
        }
    }
}

impl MonitorConfig {
    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.closed_threshold == 0 {
            return Err(DmsError::Config("closed_threshold must be greater than 0".into()));
        }
        if !self.tilt_threshold.is_finite() || self.tilt_threshold <= 0.0 {
            return Err(DmsError::Config(format!(
                "tilt_threshold must be a positive number, got {}",
                self.tilt_threshold
            )));
        }
        if !(self.open_score_threshold > 0.0 && self.open_score_threshold < 1.0) {
            return Err(DmsError::Config(format!(
                "open_score_threshold must lie in (0, 1), got {}",
                self.open_score_threshold
            )));
        }
        if self.perclos_window == 0 {
            return Err(DmsError::Config("perclos_window must be greater than 0".into()));
        }
        Ok(())
    }
}
