//! Observation streams: live frame processing and recorded replay

use std::io::BufRead;
use std::path::Path;

use dms::{
    head_tilt_ratio, primary_face, EyeExtractor, EyeSample, EyeStateClassifier, FaceLocator,
    FaceMeasurement, Observation,
};
use frame_source::{FrameSource, VideoFrame};
use tracing::{debug, info, warn};

use crate::PipelineError;

/// One frame's observation plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct FrameObservation {
    pub sequence: u32,
    pub timestamp_ns: u64,
    pub face_detected: bool,
    pub observation: Observation,
}

/// Yields one observation per frame until the stream ends
pub trait ObservationStream {
    fn next_observation(&mut self) -> Option<FrameObservation>;
}

impl<S: ObservationStream + ?Sized> ObservationStream for Box<S> {
    fn next_observation(&mut self) -> Option<FrameObservation> {
        (**self).next_observation()
    }
}

/// Frame source -> face locator -> eye extractor -> classifier.
///
/// Failures in the locator or classifier only ever show up as absent
/// measurements in the observation.
pub struct FramePipeline<S, L, C> {
    source: S,
    locator: L,
    classifier: C,
    extractor: EyeExtractor,
}

impl<S, L, C> FramePipeline<S, L, C>
where
    S: FrameSource,
    L: FaceLocator,
    C: EyeStateClassifier,
{
    pub fn new(source: S, locator: L, classifier: C) -> Self {
        Self {
            source,
            locator,
            classifier,
            extractor: EyeExtractor::default(),
        }
    }

    /// Measure a single frame
    pub fn observe(&mut self, frame: &VideoFrame) -> FrameObservation {
        let faces = self.locator.locate(frame).unwrap_or_else(|e| {
            warn!("Face location failed on frame {}: {}", frame.sequence, e);
            Vec::new()
        });

        let Some(face) = primary_face(&faces) else {
            debug!("No face in frame {}", frame.sequence);
            return FrameObservation {
                sequence: frame.sequence,
                timestamp_ns: frame.timestamp_ns,
                face_detected: false,
                observation: Observation::missing(),
            };
        };

        let measurement = self.extractor.measure(frame, face).unwrap_or_else(|e| {
            warn!("Eye extraction failed: {}", e);
            FaceMeasurement {
                head_tilt_ratio: face.landmarks.as_deref().and_then(head_tilt_ratio),
                ..Default::default()
            }
        });
        let classifier = &self.classifier;
        let score = |sample: Option<&EyeSample>, eye: &str| {
            sample.and_then(|s| match classifier.openness(s) {
                Ok(score) => Some(score),
                Err(e) => {
                    warn!("{} eye classification failed on frame {}: {}", eye, frame.sequence, e);
                    None
                }
            })
        };

        FrameObservation {
            sequence: frame.sequence,
            timestamp_ns: frame.timestamp_ns,
            face_detected: true,
            observation: Observation::new(
                score(measurement.samples.left.as_ref(), "Left"),
                score(measurement.samples.right.as_ref(), "Right"),
                measurement.head_tilt_ratio,
            ),
        }
    }
}

impl<S, L, C> ObservationStream for FramePipeline<S, L, C>
where
    S: FrameSource,
    L: FaceLocator,
    C: EyeStateClassifier,
{
    fn next_observation(&mut self) -> Option<FrameObservation> {
        let frame = self.source.next_frame()?;
        Some(self.observe(&frame))
    }
}

/// Replays recorded observations, one JSON object per line.
///
/// A line that does not parse becomes a frame with nothing measured; a read
/// error ends the stream.
pub struct ObservationReplay<R> {
    reader: R,
    line: usize,
    sequence: u32,
}

impl ObservationReplay<std::io::BufReader<std::fs::File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        info!("Replaying observations from {}", path.display());
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file)))
    }
}

impl<R: BufRead> ObservationReplay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            sequence: 0,
        }
    }
}

impl<R: BufRead> ObservationStream for ObservationReplay<R> {
    fn next_observation(&mut self) -> Option<FrameObservation> {
        let mut buf = String::new();
        loop {
            buf.clear();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("Observation replay stopped at line {}: {}", self.line + 1, e);
                    return None;
                }
            }
            self.line += 1;
            if !buf.trim().is_empty() {
                break;
            }
        }

        let observation = serde_json::from_str::<Observation>(buf.trim()).unwrap_or_else(|e| {
            warn!("Unreadable observation on line {}: {}", self.line, e);
            Observation::missing()
        });

        let sequence = self.sequence;
        self.sequence += 1;
        Some(FrameObservation {
            sequence,
            timestamp_ns: 0,
            face_detected: observation != Observation::missing(),
            observation,
        })
    }
}
