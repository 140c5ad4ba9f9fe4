//! Driver Monitoring System (DMS)
//!
//! Eye-state drowsiness detection:
//! - Face location (landmark tracks, fixed cabin framing)
//! - Eye-region extraction and head-tilt measurement
//! - Eye openness classification (ONNX model or contrast heuristic)
//! - Per-session drowsiness decisions from closed-eye streaks and head tilt

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod extractor;
pub mod state;

pub use analysis::{Alert, EyeStatus, Observation, Verdict};
pub use classifier::{ContrastEyeClassifier, EyeStateClassifier, OnnxEyeClassifier};
pub use config::{MonitorConfig, UnknownPolicy};
pub use detector::{primary_face, CenteredFaceLocator, FaceLocator, FaceRegion, LandmarkTrack};
pub use extractor::{head_tilt_ratio, EyeExtractor, EyeSample, EyeSamples, FaceMeasurement};
pub use state::{MonitorPhase, MonitorState};

use thiserror::Error;
use tracing::{debug, info, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Landmark data invalid: {0}")]
    Landmarks(String),
}

/// Turns per-frame observations into drowsiness verdicts for one session.
///
/// `update` is pure computation over the observation and the owned state: it
/// never blocks and never fails. Separate sessions use separate monitors.
#[derive(Debug, Clone)]
pub struct DrowsinessMonitor {
    config: MonitorConfig,
    state: MonitorState,
}

impl DrowsinessMonitor {
    /// Start a session with a validated configuration
    pub fn new(config: MonitorConfig) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            "Starting monitor session (closed_threshold={}, tilt_threshold={}, unknown_policy={:?})",
            config.closed_threshold, config.tilt_threshold, config.unknown_policy
        );
        Ok(Self {
            state: MonitorState::new(&config),
            config,
        })
    }

    /// Ingest one frame's observation, in frame order
    pub fn update(&mut self, observation: &Observation) -> Verdict {
        let threshold = self.config.open_score_threshold;
        let left = EyeStatus::classify(observation.left_eye_openness, threshold);
        let right = EyeStatus::classify(observation.right_eye_openness, threshold);
        let eye_status = EyeStatus::combine(left, right);

        let state = &mut self.state;
        state.frames_seen += 1;
        match eye_status {
            EyeStatus::Closed => {
                state.consecutive_closed_frames = state.consecutive_closed_frames.saturating_add(1);
            }
            EyeStatus::Open => state.consecutive_closed_frames = 0,
            EyeStatus::Unknown => match self.config.unknown_policy {
                UnknownPolicy::Reset => state.consecutive_closed_frames = 0,
                UnknownPolicy::Hold => {}
            },
        }
        state.record_eye_status(eye_status);

        let eyes_drowsy = state.consecutive_closed_frames > state.closed_threshold;
        let tilted = observation
            .head_tilt_ratio
            .is_some_and(|ratio| ratio > state.tilt_threshold);

        let phase = if eyes_drowsy {
            MonitorPhase::DrowsyClosedEyes
        } else if tilted {
            MonitorPhase::DrowsyTilted
        } else {
            MonitorPhase::Focused
        };

        if phase != state.phase {
            match phase {
                MonitorPhase::DrowsyClosedEyes => warn!(
                    "Eyes closed for {} consecutive frames",
                    state.consecutive_closed_frames
                ),
                MonitorPhase::DrowsyTilted => warn!(
                    "Head tilt ratio {:.2} above {:.2}",
                    observation.head_tilt_ratio.unwrap_or_default(),
                    state.tilt_threshold
                ),
                MonitorPhase::Focused => info!("Driver focused again after {:?}", state.phase),
            }
            state.phase = phase;
        }

        debug!(
            "Frame {}: eyes {:?}/{:?} -> {:?}, streak {}",
            state.frames_seen, left, right, eye_status, state.consecutive_closed_frames
        );

        Verdict {
            eye_status,
            alert: phase.alert(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> MonitorPhase {
        self.state.phase
    }

    pub fn consecutive_closed_frames(&self) -> u32 {
        self.state.consecutive_closed_frames
    }

    /// Fraction of recent frames with both eyes closed
    pub fn perclos(&self) -> f32 {
        self.state.perclos()
    }

    /// Start over for a new subject
    pub fn reset(&mut self) {
        info!("Resetting monitor session after {} frames", self.state.frames_seen);
        self.state = MonitorState::new(&self.config);
    }
}

impl Default for DrowsinessMonitor {
    fn default() -> Self {
        let config = MonitorConfig::default();
        Self {
            state: MonitorState::new(&config),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn monitor(closed_threshold: u32) -> DrowsinessMonitor {
        DrowsinessMonitor::new(MonitorConfig {
            closed_threshold,
            ..Default::default()
        })
        .unwrap()
    }

    fn alerts(monitor: &mut DrowsinessMonitor, observations: &[Observation]) -> Vec<Alert> {
        observations.iter().map(|o| monitor.update(o).alert).collect()
    }

    #[test]
    fn test_sustained_closure_alerts_after_threshold() {
        let mut m = monitor(3);
        let frames: Vec<_> = [0.2, 0.3, 0.1, 0.05].into_iter().map(Observation::both_eyes).collect();
        assert_eq!(
            alerts(&mut m, &frames),
            vec![Alert::Focused, Alert::Focused, Alert::Focused, Alert::DrowsyOrDistracted]
        );
        assert_eq!(m.phase(), MonitorPhase::DrowsyClosedEyes);
    }

    #[test]
    fn test_open_frame_breaks_streak() {
        let mut m = monitor(3);
        let mut counters = Vec::new();
        for score in [0.2, 0.3, 0.9, 0.1] {
            let verdict = m.update(&Observation::both_eyes(score));
            assert_eq!(verdict.alert, Alert::Focused);
            counters.push(m.consecutive_closed_frames());
        }
        assert_eq!(counters, vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_tilt_alone_alerts() {
        let mut m = DrowsinessMonitor::default();
        let frames = [
            Observation::both_eyes(0.9).with_tilt(0.1),
            Observation::both_eyes(0.9).with_tilt(0.6),
        ];
        assert_eq!(alerts(&mut m, &frames), vec![Alert::Focused, Alert::DrowsyOrDistracted]);
        assert_eq!(m.phase(), MonitorPhase::DrowsyTilted);
    }

    #[test]
    fn test_tilt_at_threshold_is_focused() {
        let mut m = DrowsinessMonitor::default();
        let verdict = m.update(&Observation::both_eyes(0.9).with_tilt(0.5));
        assert_eq!(verdict.alert, Alert::Focused);
    }

    #[test]
    fn test_missing_eyes_are_unknown_and_reset() {
        let mut m = monitor(3);
        m.update(&Observation::both_eyes(0.1));
        m.update(&Observation::both_eyes(0.1));

        let verdict = m.update(&Observation::missing());
        assert_eq!(verdict, Verdict { eye_status: EyeStatus::Unknown, alert: Alert::Focused });
        assert_eq!(m.consecutive_closed_frames(), 0);
    }

    #[test]
    fn test_one_closed_one_missing_is_unknown() {
        let mut m = monitor(3);
        let verdict = m.update(&Observation::new(Some(0.1), None, None));
        assert_eq!(verdict.eye_status, EyeStatus::Unknown);

        let verdict = m.update(&Observation::new(None, Some(0.8), None));
        assert_eq!(verdict.eye_status, EyeStatus::Open);
    }

    #[test]
    fn test_hold_policy_keeps_streak_through_dropout() {
        let mut m = DrowsinessMonitor::new(MonitorConfig {
            closed_threshold: 2,
            unknown_policy: UnknownPolicy::Hold,
            ..Default::default()
        })
        .unwrap();

        m.update(&Observation::both_eyes(0.1));
        m.update(&Observation::both_eyes(0.1));
        m.update(&Observation::missing());
        assert_eq!(m.consecutive_closed_frames(), 2);

        let verdict = m.update(&Observation::both_eyes(0.1));
        assert_eq!(verdict.alert, Alert::DrowsyOrDistracted);

        m.update(&Observation::both_eyes(0.7));
        assert_eq!(m.consecutive_closed_frames(), 0);
    }

    #[test]
    fn test_closed_eyes_take_precedence_over_tilt() {
        let mut m = monitor(1);
        m.update(&Observation::both_eyes(0.1));
        m.update(&Observation::both_eyes(0.1).with_tilt(0.9));
        assert_eq!(m.phase(), MonitorPhase::DrowsyClosedEyes);

        m.update(&Observation::both_eyes(0.9).with_tilt(0.9));
        assert_eq!(m.phase(), MonitorPhase::DrowsyTilted);

        m.update(&Observation::both_eyes(0.9));
        assert_eq!(m.phase(), MonitorPhase::Focused);
    }

    #[test]
    fn test_open_score_threshold_is_configurable() {
        let mut m = DrowsinessMonitor::new(MonitorConfig {
            open_score_threshold: 0.3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(m.update(&Observation::both_eyes(0.4)).eye_status, EyeStatus::Open);
        assert_eq!(m.update(&Observation::both_eyes(0.3)).eye_status, EyeStatus::Closed);
    }

    #[test]
    fn test_perclos_and_reset() {
        let mut m = monitor(10);
        for score in [0.1, 0.1, 0.9, 0.9] {
            m.update(&Observation::both_eyes(score));
        }
        m.update(&Observation::missing());
        assert_eq!(m.perclos(), 0.5);
        assert_eq!(m.state().frames_seen, 5);

        m.reset();
        assert_eq!(m.perclos(), 0.0);
        assert_eq!(m.state().frames_seen, 0);
        assert_eq!(m.phase(), MonitorPhase::Focused);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = DrowsinessMonitor::new(MonitorConfig {
            closed_threshold: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(DmsError::Config(_))));
    }

    fn closed_score() -> impl Strategy<Value = f32> {
        0.0f32..=0.5
    }

    fn open_score() -> impl Strategy<Value = f32> {
        0.501f32..=1.0
    }

    proptest! {
        #[test]
        fn prop_closed_streak_alerts_from_threshold_plus_one(
            threshold in 1u32..20,
            extra in 1usize..20,
            scores in proptest::collection::vec((closed_score(), closed_score()), 40),
            tilt in proptest::option::of(0.0f32..=0.5),
        ) {
            let mut m = monitor(threshold);
            let frames = threshold as usize + extra;
            for (i, (l, r)) in scores.into_iter().cycle().take(frames).enumerate() {
                let verdict = m.update(&Observation::new(Some(l), Some(r), tilt));
                prop_assert_eq!(verdict.eye_status, EyeStatus::Closed);
                prop_assert_eq!(m.consecutive_closed_frames(), i as u32 + 1);
                let expected = if i as u32 + 1 > threshold {
                    Alert::DrowsyOrDistracted
                } else {
                    Alert::Focused
                };
                prop_assert_eq!(verdict.alert, expected);
            }
        }

        #[test]
        fn prop_any_open_eye_resets_streak(
            streak in 0usize..50,
            open in open_score(),
            other in proptest::option::of(0.0f32..=1.0),
            open_on_left in any::<bool>(),
        ) {
            let mut m = monitor(5);
            for _ in 0..streak {
                m.update(&Observation::both_eyes(0.1));
            }
            let observation = if open_on_left {
                Observation::new(Some(open), other, None)
            } else {
                Observation::new(other, Some(open), None)
            };
            let verdict = m.update(&observation);
            prop_assert_eq!(verdict, Verdict { eye_status: EyeStatus::Open, alert: Alert::Focused });
            prop_assert_eq!(m.consecutive_closed_frames(), 0);

            m.update(&Observation::both_eyes(0.2));
            prop_assert_eq!(m.consecutive_closed_frames(), 1);
        }

        #[test]
        fn prop_tilt_above_threshold_always_alerts(
            tilt_threshold in 0.1f32..2.0,
            excess in 0.001f32..5.0,
            left in proptest::option::of(0.0f32..=1.0),
            right in proptest::option::of(0.0f32..=1.0),
        ) {
            let mut m = DrowsinessMonitor::new(MonitorConfig {
                tilt_threshold,
                ..Default::default()
            }).unwrap();
            let verdict = m.update(&Observation::new(left, right, Some(tilt_threshold + excess)));
            prop_assert_eq!(verdict.alert, Alert::DrowsyOrDistracted);
        }

        #[test]
        fn prop_streak_matches_trailing_closed_frames(
            frames in proptest::collection::vec(
                (proptest::option::of(0.0f32..=1.0), proptest::option::of(0.0f32..=1.0)),
                0..200,
            ),
        ) {
            let mut m = monitor(10);
            let mut expected = 0u32;
            for (l, r) in frames {
                let verdict = m.update(&Observation::new(l, r, None));
                expected = if verdict.eye_status == EyeStatus::Closed { expected + 1 } else { 0 };
                prop_assert_eq!(m.consecutive_closed_frames(), expected);
                prop_assert_eq!(verdict.alert.is_alert(), expected > 10);
            }
        }
    }
}
