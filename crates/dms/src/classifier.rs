//! Eye openness classifiers
//!
//! Contract: a normalized 24x24 sample in, a score in [0, 1] out, higher
//! meaning more open. Anything that honours it can be plugged into the
//! pipeline.

use std::path::Path;

use tract_onnx::prelude::*;
use tracing::{debug, error, info};

use crate::extractor::{EyeSample, EYE_SAMPLE_SIZE};
use crate::DmsError;

/// Scores how open an eye is
pub trait EyeStateClassifier {
    fn openness(&self, sample: &EyeSample) -> Result<f32, DmsError>;
}

impl<C: EyeStateClassifier + ?Sized> EyeStateClassifier for Box<C> {
    fn openness(&self, sample: &EyeSample) -> Result<f32, DmsError> {
        (**self).openness(sample)
    }
}

/// Exported eye CNN run through tract.
///
/// Expects an NHWC `1x24x24x1` float input and a single sigmoid output.
pub struct OnnxEyeClassifier {
    model: TypedRunnableModel<TypedModel>,
    side: usize,
}

impl OnnxEyeClassifier {
    /// Load and optimize the model for the extractor's sample size
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        let side = EYE_SAMPLE_SIZE as usize;
        info!("Loading eye model from {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, side, side, 1]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| {
                error!("Failed to load eye model: {}", e);
                DmsError::ModelLoad(format!("{}: {}", path.display(), e))
            })?;

        Ok(Self { model, side })
    }
}

impl EyeStateClassifier for OnnxEyeClassifier {
    fn openness(&self, sample: &EyeSample) -> Result<f32, DmsError> {
        let (h, w) = sample.dim();
        if h != self.side || w != self.side {
            return Err(DmsError::Inference(format!(
                "expected {0}x{0} sample, got {1}x{2}",
                self.side, h, w
            )));
        }

        let input = Tensor::from_shape(&[1, self.side, self.side, 1], &sample.to_vec())
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| DmsError::Inference("model produced no output".into()))?;
        let score = output
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| DmsError::Inference("empty model output".into()))?;

        if !score.is_finite() {
            return Err(DmsError::Inference(format!("non-finite score {}", score)));
        }
        debug!("Eye model score {:.3}", score);
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Model-free fallback: an open eye shows dark iris against bright sclera,
/// a closed lid is close to uniform. Openness is the intensity spread
/// relative to `open_spread`.
#[derive(Debug, Clone)]
pub struct ContrastEyeClassifier {
    open_spread: f32,
}

impl Default for ContrastEyeClassifier {
    fn default() -> Self {
        Self { open_spread: 0.2 }
    }
}

impl ContrastEyeClassifier {
    pub fn new(open_spread: f32) -> Result<Self, DmsError> {
        if !open_spread.is_finite() || open_spread <= 0.0 {
            return Err(DmsError::Config(format!(
                "open_spread must be positive, got {}",
                open_spread
            )));
        }
        Ok(Self { open_spread })
    }
}

impl EyeStateClassifier for ContrastEyeClassifier {
    fn openness(&self, sample: &EyeSample) -> Result<f32, DmsError> {
        Ok((sample.std_dev() / self.open_spread).clamp(0.0, 1.0))
    }
}
