//! Per-frame observations and verdicts

use serde::{Deserialize, Serialize};

/// One frame's measurements.
///
/// A `None` field means detection failed for that frame. That is a valid
/// input, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Classifier openness score for the left eye (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_eye_openness: Option<f32>,

    /// Classifier openness score for the right eye (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_eye_openness: Option<f32>,

    /// Nose-to-eye-line distance over eye-corner distance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_tilt_ratio: Option<f32>,
}

impl Observation {
    pub fn new(left: Option<f32>, right: Option<f32>, head_tilt_ratio: Option<f32>) -> Self {
        Self {
            left_eye_openness: left,
            right_eye_openness: right,
            head_tilt_ratio,
        }
    }

    /// Same score for both eyes, no tilt measurement
    pub fn both_eyes(score: f32) -> Self {
        Self::new(Some(score), Some(score), None)
    }

    /// Nothing could be measured (no face, unreadable frame)
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn with_tilt(mut self, ratio: f32) -> Self {
        self.head_tilt_ratio = Some(ratio);
        self
    }
}

/// Eye status for one eye or for the frame as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeStatus {
    Open,
    Closed,
    Unknown,
}

impl EyeStatus {
    /// Status of a single eye. Non-finite scores are treated as absent.
    pub fn classify(score: Option<f32>, open_threshold: f32) -> Self {
        match score {
            Some(s) if !s.is_finite() => EyeStatus::Unknown,
            Some(s) if s > open_threshold => EyeStatus::Open,
            Some(_) => EyeStatus::Closed,
            None => EyeStatus::Unknown,
        }
    }

    /// Frame status from both eyes: closed only when both are seen closed,
    /// open as soon as either is seen open.
    pub fn combine(left: EyeStatus, right: EyeStatus) -> Self {
        match (left, right) {
            (EyeStatus::Closed, EyeStatus::Closed) => EyeStatus::Closed,
            (EyeStatus::Open, _) | (_, EyeStatus::Open) => EyeStatus::Open,
            _ => EyeStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EyeStatus::Open => "Open",
            EyeStatus::Closed => "Closed",
            EyeStatus::Unknown => "Unknown",
        }
    }
}

/// Alert decision surfaced to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alert {
    Focused,
    DrowsyOrDistracted,
}

impl Alert {
    pub fn is_alert(&self) -> bool {
        matches!(self, Alert::DrowsyOrDistracted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alert::Focused => "FOCUSED",
            Alert::DrowsyOrDistracted => "DROWSY / DISTRACTED",
        }
    }
}

/// Monitor output for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub eye_status: EyeStatus,
    pub alert: Alert,
}

impl Verdict {
    pub fn is_alert(&self) -> bool {
        self.alert.is_alert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundary() {
        assert_eq!(EyeStatus::classify(Some(0.51), 0.5), EyeStatus::Open);
        assert_eq!(EyeStatus::classify(Some(0.5), 0.5), EyeStatus::Closed);
        assert_eq!(EyeStatus::classify(Some(0.0), 0.5), EyeStatus::Closed);
        assert_eq!(EyeStatus::classify(None, 0.5), EyeStatus::Unknown);
        assert_eq!(EyeStatus::classify(Some(f32::NAN), 0.5), EyeStatus::Unknown);
    }

    #[test]
    fn test_combine_table() {
        use EyeStatus::*;

        assert_eq!(EyeStatus::combine(Closed, Closed), Closed);
        assert_eq!(EyeStatus::combine(Open, Closed), Open);
        assert_eq!(EyeStatus::combine(Closed, Open), Open);
        assert_eq!(EyeStatus::combine(Open, Unknown), Open);
        assert_eq!(EyeStatus::combine(Unknown, Open), Open);
        assert_eq!(EyeStatus::combine(Closed, Unknown), Unknown);
        assert_eq!(EyeStatus::combine(Unknown, Closed), Unknown);
        assert_eq!(EyeStatus::combine(Unknown, Unknown), Unknown);
    }

    #[test]
    fn test_observation_json_omits_missing_fields() {
        let json = serde_json::to_string(&Observation::new(Some(0.25), None, None)).unwrap();
        assert_eq!(json, r#"{"left_eye_openness":0.25}"#);

        let parsed: Observation = serde_json::from_str(r#"{"head_tilt_ratio": 0.7}"#).unwrap();
        assert_eq!(parsed, Observation::missing().with_tilt(0.7));
    }
}
