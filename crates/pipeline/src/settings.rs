//! Application configuration
//!
//! Layered with the `config` crate: an optional file (TOML, JSON, YAML...)
//! overridden by `DROWSY__`-prefixed environment variables, e.g.
//! `DROWSY__MONITOR__CLOSED_THRESHOLD=15`.

use std::path::{Path, PathBuf};

use alerting::AlertConfig;
use config::{Config, Environment, File};
use dms::MonitorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PipelineError;

/// Where observations come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Image frames run through locator, extractor and classifier
    #[default]
    Frames,
    /// Pre-computed observations, one JSON object per line
    Observations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub mode: InputMode,
    /// Directory of frame images, read in file-name order
    pub frames_dir: PathBuf,
    /// Frame rate used to timestamp image sequences
    pub fps: u32,
    /// Face boxes and landmarks per frame (JSON lines)
    pub landmarks_path: Option<PathBuf>,
    /// Faces below this detector confidence are ignored
    pub min_face_confidence: f32,
    /// Observation replay file (JSON lines)
    pub observations_path: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mode: InputMode::Frames,
            frames_dir: PathBuf::from("frames"),
            fps: frame_source::sequence::DEFAULT_FPS,
            landmarks_path: None,
            min_face_confidence: 0.0,
            observations_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Eye model exported to ONNX; the contrast heuristic is used without one
    pub model_path: Option<PathBuf>,
    /// Intensity spread the contrast heuristic treats as fully open
    pub open_spread: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            open_spread: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Log,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// JSON output file; stdout when unset
    pub path: Option<PathBuf>,
    pub alert: AlertConfig,
}

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub input: InputConfig,
    pub classifier: ClassifierConfig,
    pub output: OutputConfig,
    pub log_level: String,
    pub log_json: bool,
    /// Prometheus listen address, e.g. "0.0.0.0:9000"
    pub metrics_addr: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            input: InputConfig::default(),
            classifier: ClassifierConfig::default(),
            output: OutputConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
            metrics_addr: None,
        }
    }
}

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "DROWSY";

impl AppConfig {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        Self::load_with_env(
            path,
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load from an optional file and an explicit environment source
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }

        let config: AppConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot start with
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.monitor.validate()?;

        if self.input.fps == 0 {
            return Err(PipelineError::Invalid("input.fps must be greater than 0".into()));
        }
        if self.input.mode == InputMode::Observations && self.input.observations_path.is_none() {
            return Err(PipelineError::Invalid(
                "input.observations_path is required in observations mode".into(),
            ));
        }
        if !self.classifier.open_spread.is_finite() || self.classifier.open_spread <= 0.0 {
            return Err(PipelineError::Invalid(
                "classifier.open_spread must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Map;
    use dms::UnknownPolicy;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.input.mode, InputMode::Frames);
        assert_eq!(config.output.format, OutputFormat::Log);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drowsy.toml");
        std::fs::write(
            &path,
            r#"
log_level = "debug"

[monitor]
closed_threshold = 3
tilt_threshold = 0.4
unknown_policy = "hold"

[input]
mode = "observations"
observations_path = "session.jsonl"

[output]
format = "json"

[output.alert]
cooldown_seconds = 1.5
"#,
        )
        .unwrap();

        let config = AppConfig::load_with_env(
            Some(&path),
            env(&[("DROWSY__MONITOR__CLOSED_THRESHOLD", "7")]),
        )
        .unwrap();

        assert_eq!(config.monitor.closed_threshold, 7);
        assert_eq!(config.monitor.tilt_threshold, 0.4);
        assert_eq!(config.monitor.unknown_policy, UnknownPolicy::Hold);
        assert_eq!(config.monitor.perclos_window, 900);
        assert_eq!(config.input.mode, InputMode::Observations);
        assert_eq!(config.input.observations_path, Some(PathBuf::from("session.jsonl")));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.alert.cooldown_seconds, 1.5);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_monitor_settings_rejected() {
        let result = AppConfig::load_with_env(
            None,
            env(&[("DROWSY__MONITOR__CLOSED_THRESHOLD", "0")]),
        );
        assert!(matches!(result, Err(PipelineError::Dms(_))));
    }

    #[test]
    fn test_observation_mode_needs_a_file() {
        let config = AppConfig {
            input: InputConfig {
                mode: InputMode::Observations,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Invalid(_))));
    }
}
