//! Alerting System
//!
//! Presents per-frame verdicts: alert deduplication with cooldown, tracing
//! output for the console and JSON lines for downstream tooling.

mod gate;
mod presenter;

pub use gate::{AlertConfig, AlertGate};
pub use presenter::{FrameReport, JsonPresenter, LogPresenter, Presenter};

use thiserror::Error;

/// Presentation errors
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("Output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
