//! Drowsiness Monitoring Pipeline
//!
//! Wires frame acquisition, face location, eye extraction and classification
//! into the drowsiness monitor, one frame at a time, and hands every verdict
//! to a presenter.

pub mod settings;
pub mod stream;

pub use settings::{AppConfig, ClassifierConfig, InputConfig, InputMode, OutputConfig, OutputFormat};
pub use stream::{FrameObservation, FramePipeline, ObservationReplay, ObservationStream};

use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alerting::{FrameReport, JsonPresenter, LogPresenter, PresentError, Presenter};
use dms::{
    CenteredFaceLocator, ContrastEyeClassifier, DmsError, DrowsinessMonitor, EyeStateClassifier,
    FaceLocator, LandmarkTrack, OnnxEyeClassifier,
};
use frame_source::{ImageSequenceSource, SourceError};
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Present(#[from] PresentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub faceless_frames: u64,
    pub alert_frames: u64,
    /// The run was asked to stop before the stream ended
    pub interrupted: bool,
}

/// Initialize logging (to stderr, stdout is left to the JSON presenter)
pub fn init_logging(level: &str, json: bool) -> Result<(), PipelineError> {
    let level = Level::from_str(level)
        .map_err(|_| PipelineError::Invalid(format!("unknown log level '{}'", level)))?;

    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| PipelineError::Invalid(format!("tracing subscriber: {}", e)))
}

/// Serve Prometheus metrics on `addr`. Needs a running tokio runtime.
pub fn init_metrics(addr: &str) -> Result<(), PipelineError> {
    let socket: SocketAddr = addr
        .parse()
        .map_err(|e| PipelineError::Invalid(format!("metrics_addr '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .map_err(|e| PipelineError::Metrics(e.to_string()))?;

    info!("Serving metrics on http://{}/metrics", socket);
    Ok(())
}

/// Feed a stream through the monitor until it ends or `stop` is raised
pub fn run_session<S, P>(
    stream: &mut S,
    monitor: &mut DrowsinessMonitor,
    presenter: &mut P,
    stop: &AtomicBool,
) -> Result<RunSummary, PipelineError>
where
    S: ObservationStream + ?Sized,
    P: Presenter + ?Sized,
{
    let mut summary = RunSummary::default();

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = stream.next_observation() else {
            break;
        };

        let verdict = monitor.update(&frame.observation);
        let report = FrameReport {
            sequence: frame.sequence,
            timestamp_ns: frame.timestamp_ns,
            face_detected: frame.face_detected,
            observation: frame.observation,
            verdict,
            phase: monitor.phase(),
            closed_frames: monitor.consecutive_closed_frames(),
            perclos: monitor.perclos(),
        };
        presenter.present(&report)?;

        summary.frames += 1;
        metrics::counter!("drowsy_frames_total").increment(1);
        if !frame.face_detected {
            summary.faceless_frames += 1;
            metrics::counter!("drowsy_faceless_frames_total").increment(1);
        }
        if verdict.is_alert() {
            summary.alert_frames += 1;
            metrics::counter!("drowsy_alert_frames_total").increment(1);
        }
        metrics::gauge!("drowsy_closed_streak").set(report.closed_frames as f64);
        metrics::gauge!("drowsy_perclos").set(report.perclos as f64);
    }

    summary.interrupted = stop.load(Ordering::Relaxed);
    presenter.finish()?;
    Ok(summary)
}

fn build_presenter(config: &AppConfig) -> Result<Box<dyn Presenter + Send>, PipelineError> {
    let output = &config.output;
    let presenter: Box<dyn Presenter + Send> = match output.format {
        OutputFormat::Log => Box::new(LogPresenter::new(&output.alert)),
        OutputFormat::Json => match &output.path {
            Some(path) => {
                info!("Writing verdicts to {}", path.display());
                let file = std::fs::File::create(path)?;
                Box::new(JsonPresenter::new(std::io::BufWriter::new(file), &output.alert))
            }
            None => Box::new(JsonPresenter::new(std::io::stdout(), &output.alert)),
        },
    };
    Ok(presenter)
}

fn build_stream(config: &AppConfig) -> Result<Box<dyn ObservationStream + Send>, PipelineError> {
    let input = &config.input;
    match input.mode {
        InputMode::Observations => {
            let path = input.observations_path.as_ref().ok_or_else(|| {
                PipelineError::Invalid("input.observations_path is required in observations mode".into())
            })?;
            Ok(Box::new(ObservationReplay::open(path)?))
        }
        InputMode::Frames => {
            let source = ImageSequenceSource::with_fps(&input.frames_dir, input.fps)?;
            if source.is_empty() {
                warn!("No frames found in {}", input.frames_dir.display());
            }

            let locator: Box<dyn FaceLocator + Send> = match &input.landmarks_path {
                Some(path) => Box::new(
                    LandmarkTrack::from_path(path)?.with_min_confidence(input.min_face_confidence),
                ),
                None => {
                    warn!("No landmark track configured, assuming a centered face without landmarks");
                    Box::new(CenteredFaceLocator::default())
                }
            };

            let classifier: Box<dyn EyeStateClassifier + Send> = match &config.classifier.model_path {
                Some(path) => Box::new(OnnxEyeClassifier::load(path)?),
                None => {
                    warn!("No eye model configured, using the contrast heuristic");
                    Box::new(ContrastEyeClassifier::new(config.classifier.open_spread)?)
                }
            };

            Ok(Box::new(FramePipeline::new(source, locator, classifier)))
        }
    }
}

/// Build every component from `config` and run one monitoring session
pub fn run(config: &AppConfig, stop: &AtomicBool) -> Result<RunSummary, PipelineError> {
    let mut monitor = DrowsinessMonitor::new(config.monitor.clone())?;
    let mut presenter = build_presenter(config)?;
    let mut stream = build_stream(config)?;

    info!("Monitoring session started ({:?} input)", config.input.mode);
    let summary = run_session(&mut stream, &mut monitor, &mut presenter, stop)?;
    info!(
        "Monitoring session ended: {} frames, {} without a face, {} alert frames{}",
        summary.frames,
        summary.faceless_frames,
        summary.alert_frames,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(summary)
}

/// Run a session on the blocking pool; resolving `shutdown` stops it
/// between two frames.
pub async fn run_until<F>(config: AppConfig, shutdown: F) -> Result<RunSummary, PipelineError>
where
    F: Future<Output = ()>,
{
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || run(&config, &worker_stop));

    tokio::pin!(shutdown);
    let finished = tokio::select! {
        joined = &mut worker => Some(joined),
        _ = &mut shutdown => None,
    };

    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("Shutdown requested, stopping after the current frame");
            stop.store(true, Ordering::Relaxed);
            worker.await
        }
    };

    joined.map_err(|e| PipelineError::Worker(e.to_string()))?
}
