//! Driver state tracking

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::analysis::{Alert, EyeStatus};
use crate::config::MonitorConfig;

/// Monitor phase (the latter two both surface as `DrowsyOrDistracted`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitorPhase {
    #[default]
    Focused,
    DrowsyClosedEyes,
    DrowsyTilted,
}

impl MonitorPhase {
    pub fn alert(&self) -> Alert {
        match self {
            MonitorPhase::Focused => Alert::Focused,
            MonitorPhase::DrowsyClosedEyes | MonitorPhase::DrowsyTilted => {
                Alert::DrowsyOrDistracted
            }
        }
    }
}

/// Closed/open history over the last N frames with a known eye status
#[derive(Debug, Clone)]
struct ClosureWindow {
    data: VecDeque<bool>,
    capacity: usize,
    closed: usize,
}

impl ClosureWindow {
    fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            closed: 0,
        }
    }

    fn push(&mut self, closed: bool) {
        if self.data.len() >= self.capacity {
            if let Some(true) = self.data.pop_front() {
                self.closed -= 1;
            }
        }
        self.data.push_back(closed);
        if closed {
            self.closed += 1;
        }
    }

    fn ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.closed as f32 / self.data.len() as f32
    }
}

/// Per-session monitor state (one subject, one continuous run)
#[derive(Debug, Clone)]
pub struct MonitorState {
    /// Immediately preceding frames with both eyes closed
    pub consecutive_closed_frames: u32,

    /// Closed frames tolerated before alerting
    pub closed_threshold: u32,

    /// Head-tilt ratio above which the driver counts as distracted
    pub tilt_threshold: f32,

    /// Current phase
    pub phase: MonitorPhase,

    /// Frames processed this session
    pub frames_seen: u64,

    closure_history: ClosureWindow,
}

impl MonitorState {
    /// Fresh state at session start
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            consecutive_closed_frames: 0,
            closed_threshold: config.closed_threshold,
            tilt_threshold: config.tilt_threshold,
            phase: MonitorPhase::Focused,
            frames_seen: 0,
            closure_history: ClosureWindow::new(config.perclos_window),
        }
    }

    /// Add a frame's combined status to the PERCLOS history.
    /// `Unknown` frames are not counted.
    pub fn record_eye_status(&mut self, status: EyeStatus) {
        match status {
            EyeStatus::Closed => self.closure_history.push(true),
            EyeStatus::Open => self.closure_history.push(false),
            EyeStatus::Unknown => {}
        }
    }

    /// Calculate PERCLOS (Percentage of Eye Closure)
    /// Higher PERCLOS indicates drowsiness
    pub fn perclos(&self) -> f32 {
        self.closure_history.ratio()
    }
}
