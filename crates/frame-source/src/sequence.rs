//! Image-sequence and in-memory frame sources

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::{FrameSource, SourceError, VideoFrame};

/// Default playback rate used to derive frame timestamps
pub const DEFAULT_FPS: u32 = 15;

/// Reads a directory of still images as a frame stream, in file-name order.
///
/// Frame sequence numbers are the file's position in the sorted listing, so
/// they stay stable when an unreadable file is skipped.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_interval_ns: u64,
    skipped: usize,
}

impl ImageSequenceSource {
    /// Open a directory of frames at the default rate
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::with_fps(dir, DEFAULT_FPS)
    }

    /// Open a directory of frames, timestamping them at `fps`
    pub fn with_fps(dir: impl AsRef<Path>, fps: u32) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        if fps == 0 {
            return Err(SourceError::Open("fps must be positive".into()));
        }

        let entries = std::fs::read_dir(dir)
            .map_err(|e| SourceError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        paths.sort();

        info!("Opened image sequence {} ({} frames)", dir.display(), paths.len());

        Ok(Self {
            paths,
            cursor: 0,
            frame_interval_ns: 1_000_000_000 / fps as u64,
            skipped: 0,
        })
    }

    /// Number of frames listed when the source was opened
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the listing is empty
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of files skipped because they could not be decoded
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode(path: &Path) -> Result<image::RgbImage, SourceError> {
        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|e| SourceError::Decode(format!("{}: {}", path.display(), e)))
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        while self.cursor < self.paths.len() {
            let index = self.cursor;
            self.cursor += 1;

            match Self::decode(&self.paths[index]) {
                Ok(img) => {
                    debug!("Read frame {} from {}", index, self.paths[index].display());
                    let timestamp_ns = index as u64 * self.frame_interval_ns;
                    return Some(VideoFrame::from_rgb_image(img, timestamp_ns, index as u32));
                }
                Err(e) => {
                    warn!("Skipping frame: {}", e);
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

/// Replays frames held in memory
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<VideoFrame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = VideoFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.frames.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_frame(dir: &Path, name: &str, value: u8) {
        let img = RgbImage::from_pixel(6, 4, image::Rgb([value, value, value]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_sequence_reads_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "frame_002.png", 20);
        write_frame(dir.path(), "frame_001.png", 10);
        write_frame(dir.path(), "frame_003.png", 30);

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);

        let values: Vec<u8> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.data[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn test_unreadable_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
        write_frame(dir.path(), "c.png", 30);
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = ImageSequenceSource::with_fps(dir.path(), 10).unwrap();
        assert_eq!(source.len(), 3);

        let first = source.next_frame().unwrap();
        assert_eq!(first.sequence, 0);

        let second = source.next_frame().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.timestamp_ns, 200_000_000);
        assert_eq!(second.data[0], 30);

        assert!(source.next_frame().is_none());
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn test_missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageSequenceSource::open(dir.path().join("nope"));
        assert!(matches!(result, Err(SourceError::Open(_))));
    }

    #[test]
    fn test_memory_source_drains() {
        let mut source = MemorySource::new(vec![
            VideoFrame::filled(2, 2, 0, 0),
            VideoFrame::filled(2, 2, 0, 1),
        ]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_frame().unwrap().sequence, 0);
        assert_eq!(source.next_frame().unwrap().sequence, 1);
        assert!(source.next_frame().is_none());
    }
}
