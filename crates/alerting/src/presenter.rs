//! Verdict presenters

use std::io::Write;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dms::{MonitorPhase, Observation, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::gate::{AlertConfig, AlertGate};
use crate::PresentError;

/// Everything known about one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub sequence: u32,
    pub timestamp_ns: u64,
    pub face_detected: bool,
    pub observation: Observation,
    pub verdict: Verdict,
    pub phase: MonitorPhase,
    pub closed_frames: u32,
    pub perclos: f32,
}

/// Consumes frame reports
pub trait Presenter {
    fn present(&mut self, report: &FrameReport) -> Result<(), PresentError>;

    /// Called once after the last frame
    fn finish(&mut self) -> Result<(), PresentError> {
        Ok(())
    }
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, report: &FrameReport) -> Result<(), PresentError> {
        (**self).present(report)
    }

    fn finish(&mut self) -> Result<(), PresentError> {
        (**self).finish()
    }
}

/// Writes verdicts to the tracing log
pub struct LogPresenter {
    gate: AlertGate,
    frames: u64,
    alert_frames: u64,
}

impl LogPresenter {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            gate: AlertGate::new(config),
            frames: 0,
            alert_frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn alert_frames(&self) -> u64 {
        self.alert_frames
    }

    pub fn announcements(&self) -> usize {
        self.gate.fire_count()
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, report: &FrameReport) -> Result<(), PresentError> {
        self.frames += 1;
        if report.verdict.is_alert() {
            self.alert_frames += 1;
        }

        debug!(
            "Frame {}: {} / {}",
            report.sequence,
            report.verdict.eye_status.as_str(),
            report.verdict.alert.as_str()
        );

        if self.gate.should_announce(report.verdict.alert, Instant::now()) {
            warn!(
                "{} at frame {} ({:?}, eyes closed {} frames, PERCLOS {:.0}%)",
                report.verdict.alert.as_str(),
                report.sequence,
                report.phase,
                report.closed_frames,
                report.perclos * 100.0
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PresentError> {
        info!(
            "Session summary: {} frames, {} alert frames, {} alert episodes, {} announcements",
            self.frames,
            self.alert_frames,
            self.gate.episodes(),
            self.gate.fire_count()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    recorded_at: DateTime<Utc>,
    announce: bool,
    #[serde(flatten)]
    report: &'a FrameReport,
}

/// Writes one JSON object per frame
pub struct JsonPresenter<W: Write> {
    writer: W,
    gate: AlertGate,
}

impl<W: Write> JsonPresenter<W> {
    pub fn new(writer: W, config: &AlertConfig) -> Self {
        Self {
            writer,
            gate: AlertGate::new(config),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Presenter for JsonPresenter<W> {
    fn present(&mut self, report: &FrameReport) -> Result<(), PresentError> {
        let record = JsonRecord {
            recorded_at: Utc::now(),
            announce: self.gate.should_announce(report.verdict.alert, Instant::now()),
            report,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PresentError> {
        self.writer.flush()?;
        Ok(())
    }
}
