//! Eye-region extraction and head-tilt measurement
//!
//! Turns a located face into classifier inputs: one normalized 24x24 sample
//! per eye, plus a head-tilt ratio when landmarks are available. A crop that
//! comes out empty marks that eye as absent instead of failing the frame.

use frame_source::VideoFrame;
use image::{imageops, GrayImage};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::detector::FaceRegion;
use crate::DmsError;

/// Side length of the square classifier input
pub const EYE_SAMPLE_SIZE: u32 = 24;

/// 68-point (iBUG) landmark indices used by the extractor
pub mod landmarks {
    pub const COUNT: usize = 68;
    pub const NOSE_TIP: usize = 30;
    pub const LEFT_EYE_OUTER: usize = 36;
    pub const LEFT_EYE_UPPER: usize = 37;
    pub const LEFT_EYE_INNER: usize = 39;
    pub const LEFT_EYE_LOWER: usize = 41;
    pub const RIGHT_EYE_INNER: usize = 42;
    pub const RIGHT_EYE_UPPER: usize = 43;
    pub const RIGHT_EYE_OUTER: usize = 45;
    pub const RIGHT_EYE_LOWER: usize = 47;
}

// Eye bands inside a bare face box, as fractions of the box
const EYE_BAND_TOP: f32 = 0.25;
const EYE_BAND_BOTTOM: f32 = 0.5;
const LEFT_EYE_SPAN: (f32, f32) = (0.15, 0.45);
const RIGHT_EYE_SPAN: (f32, f32) = (0.55, 0.85);

/// Normalized grayscale eye crop, values in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct EyeSample {
    pixels: Array2<f32>,
}

impl EyeSample {
    /// Resize a grayscale crop to `size` x `size` and scale to [0, 1]
    pub fn from_gray(crop: &GrayImage, size: u32) -> Self {
        let resized = imageops::resize(crop, size, size, imageops::FilterType::Triangle);
        let pixels = Array2::from_shape_fn((size as usize, size as usize), |(y, x)| {
            resized.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        });
        Self { pixels }
    }

    /// Wrap already-normalized pixels (row-major, rows = y); values are clamped to [0, 1]
    pub fn from_array(pixels: Array2<f32>) -> Self {
        Self {
            pixels: pixels.mapv(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }),
        }
    }

    pub fn pixels(&self) -> &Array2<f32> {
        &self.pixels
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    /// Row-major copy of the pixel values
    pub fn to_vec(&self) -> Vec<f32> {
        self.pixels.iter().copied().collect()
    }

    pub fn mean(&self) -> f32 {
        self.pixels.mean().unwrap_or(0.0)
    }

    pub fn std_dev(&self) -> f32 {
        self.pixels.std(0.0)
    }
}

/// Pixel rectangle inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Rectangle spanning `[left, right) x [top, bottom)`, clamped to the frame.
    /// `None` when nothing of it is left.
    pub fn from_bounds(
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
            return None;
        }
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;

        let (x0, x1) = (clamp(left, frame_width), clamp(right, frame_width));
        let (y0, y1) = (clamp(top, frame_height), clamp(bottom, frame_height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Samples for both eyes; `None` when that eye's crop was empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyeSamples {
    pub left: Option<EyeSample>,
    pub right: Option<EyeSample>,
}

/// Everything measured from one face
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceMeasurement {
    pub samples: EyeSamples,
    pub head_tilt_ratio: Option<f32>,
}

/// Crops and normalizes eye regions from a located face.
///
/// Samples are always `EYE_SAMPLE_SIZE` square, the input size the eye
/// classifiers expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct EyeExtractor;

impl EyeExtractor {
    /// Eye samples and head tilt for one face. Fails with
    /// `DmsError::ImageProcessing` when the frame buffer does not hold
    /// `width * height` RGB pixels.
    pub fn measure(&self, frame: &VideoFrame, face: &FaceRegion) -> Result<FaceMeasurement, DmsError> {
        let gray = grayscale(frame)?;
        Ok(FaceMeasurement {
            samples: self.extract_from_gray(&gray, face),
            head_tilt_ratio: face.landmarks.as_deref().and_then(head_tilt_ratio),
        })
    }

    /// Crop, resize and normalize both eyes. A frame that cannot be
    /// converted yields no samples.
    pub fn extract_eye_samples(&self, frame: &VideoFrame, face: &FaceRegion) -> EyeSamples {
        match grayscale(frame) {
            Ok(gray) => self.extract_from_gray(&gray, face),
            Err(e) => {
                warn!("{}", e);
                EyeSamples::default()
            }
        }
    }

    /// Same as [`extract_eye_samples`](Self::extract_eye_samples) on an
    /// already converted grayscale frame
    pub fn extract_from_gray(&self, gray: &GrayImage, face: &FaceRegion) -> EyeSamples {
        let (left, right) = self.eye_regions(face, gray.width(), gray.height());
        let sample = |rect: Option<CropRect>| {
            rect.map(|r| {
                let crop = imageops::crop_imm(gray, r.x, r.y, r.width, r.height).to_image();
                EyeSample::from_gray(&crop, EYE_SAMPLE_SIZE)
            })
        };

        let samples = EyeSamples {
            left: sample(left),
            right: sample(right),
        };
        if samples.left.is_none() || samples.right.is_none() {
            debug!(
                "Empty eye crop (left: {}, right: {})",
                samples.left.is_some(),
                samples.right.is_some()
            );
        }
        samples
    }

    /// Eye rectangles from landmarks when a full set is present, otherwise
    /// from fixed bands of the face box
    pub fn eye_regions(
        &self,
        face: &FaceRegion,
        frame_width: u32,
        frame_height: u32,
    ) -> (Option<CropRect>, Option<CropRect>) {
        use crate::extractor::landmarks::*;

        match face.landmarks.as_deref() {
            Some(points) if points.len() >= COUNT => {
                let left = CropRect::from_bounds(
                    points[LEFT_EYE_OUTER].0,
                    points[LEFT_EYE_UPPER].1,
                    points[LEFT_EYE_INNER].0,
                    points[LEFT_EYE_LOWER].1,
                    frame_width,
                    frame_height,
                );
                let right = CropRect::from_bounds(
                    points[RIGHT_EYE_INNER].0,
                    points[RIGHT_EYE_UPPER].1,
                    points[RIGHT_EYE_OUTER].0,
                    points[RIGHT_EYE_LOWER].1,
                    frame_width,
                    frame_height,
                );
                (left, right)
            }
            _ => {
                let band = |span: (f32, f32)| {
                    CropRect::from_bounds(
                        face.x + face.width * span.0,
                        face.y + face.height * EYE_BAND_TOP,
                        face.x + face.width * span.1,
                        face.y + face.height * EYE_BAND_BOTTOM,
                        frame_width,
                        frame_height,
                    )
                };
                (band(LEFT_EYE_SPAN), band(RIGHT_EYE_SPAN))
            }
        }
    }
}

fn grayscale(frame: &VideoFrame) -> Result<GrayImage, DmsError> {
    frame.to_gray_image().ok_or_else(|| {
        DmsError::ImageProcessing(format!(
            "frame {} has {} bytes for {}x{} RGB",
            frame.sequence,
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Distance from the nose tip to the midpoint of the outer eye corners,
/// relative to the corner distance. Larger means the head is tilted or turned
/// further from the camera. `None` without a full landmark set or when the
/// corners coincide.
pub fn head_tilt_ratio(points: &[(f32, f32)]) -> Option<f32> {
    use crate::extractor::landmarks::*;

    if points.len() < COUNT {
        return None;
    }
    let left = points[LEFT_EYE_OUTER];
    let right = points[RIGHT_EYE_OUTER];
    let nose = points[NOSE_TIP];

    let eye_distance = distance(left, right);
    if !eye_distance.is_finite() || eye_distance <= 0.0 {
        return None;
    }

    let midpoint = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let ratio = distance(nose, midpoint) / eye_distance;
    ratio.is_finite().then_some(ratio)
}
