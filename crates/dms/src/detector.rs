//! Face location: the detector boundary and the locators shipped with the monitor

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use frame_source::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::DmsError;

/// Face bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    /// 68 landmarks in iBUG ordering, when a landmark model ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<(f32, f32)>>,
}

fn full_confidence() -> f32 {
    1.0
}

impl FaceRegion {
    /// Face box without landmarks
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<(f32, f32)>) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Finds faces in a frame
pub trait FaceLocator {
    fn locate(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError>;
}

impl<L: FaceLocator + ?Sized> FaceLocator for Box<L> {
    fn locate(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError> {
        (**self).locate(frame)
    }
}

/// The face to monitor when several are found: the largest one
pub fn primary_face(faces: &[FaceRegion]) -> Option<&FaceRegion> {
    faces
        .iter()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// Assumes a driver seated in front of a fixed cabin camera: one face box in
/// the middle of the frame, no landmarks.
#[derive(Debug, Clone)]
pub struct CenteredFaceLocator {
    x_ratio: f32,
    y_ratio: f32,
    width_ratio: f32,
    height_ratio: f32,
}

impl Default for CenteredFaceLocator {
    fn default() -> Self {
        Self {
            x_ratio: 0.3,
            y_ratio: 0.2,
            width_ratio: 0.4,
            height_ratio: 0.5,
        }
    }
}

impl FaceLocator for CenteredFaceLocator {
    fn locate(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError> {
        let w = frame.width as f32;
        let h = frame.height as f32;
        Ok(vec![FaceRegion::new(
            w * self.x_ratio,
            h * self.y_ratio,
            w * self.width_ratio,
            h * self.height_ratio,
        )])
    }
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    sequence: u32,
    #[serde(default)]
    faces: Vec<FaceRegion>,
}

/// Face boxes and landmarks recorded by an external landmark detector,
/// replayed by frame sequence number.
///
/// One JSON object per line: `{"sequence": 12, "faces": [{"x": .., "y": ..,
/// "width": .., "height": .., "landmarks": [[x, y], ...]}]}`. Frames with no
/// line have no faces.
#[derive(Debug, Clone, Default)]
pub struct LandmarkTrack {
    frames: HashMap<u32, Vec<FaceRegion>>,
    min_confidence: f32,
}

impl LandmarkTrack {
    /// Load a track from a JSON-lines file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        info!("Loading landmark track from {}", path.display());
        let file = std::fs::File::open(path)
            .map_err(|e| DmsError::Landmarks(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse a track from JSON lines; blank lines are ignored
    pub fn from_reader(reader: impl BufRead) -> Result<Self, DmsError> {
        let mut frames = HashMap::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| DmsError::Landmarks(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TrackEntry = serde_json::from_str(&line)
                .map_err(|e| DmsError::Landmarks(format!("line {}: {}", index + 1, e)))?;
            if frames.insert(entry.sequence, entry.faces).is_some() {
                warn!("Duplicate landmark entry for frame {}, keeping the last", entry.sequence);
            }
        }
        debug!("Landmark track covers {} frames", frames.len());
        Ok(Self {
            frames,
            min_confidence: 0.0,
        })
    }

    /// Drop faces below this detector confidence
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FaceLocator for LandmarkTrack {
    fn locate(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DmsError> {
        Ok(self
            .frames
            .get(&frame.sequence)
            .map(|faces| {
                faces
                    .iter()
                    .filter(|f| f.confidence >= self.min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
