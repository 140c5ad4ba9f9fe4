//! Frame acquisition for the drowsiness monitor
//!
//! Supplies one decoded frame per call until the stream ends:
//! - Image sequences on disk (recorded cabin footage, one file per frame)
//! - In-memory replay for tests and offline tooling

pub mod frame;
pub mod sequence;

pub use frame::VideoFrame;
pub use sequence::{ImageSequenceSource, MemorySource};

use thiserror::Error;

/// Frame source error types
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),
}

/// A stream of frames.
///
/// `None` signals end of stream. A frame that cannot be read is the source's
/// own concern: it either skips it or ends the stream, it never hands a
/// broken frame downstream.
pub trait FrameSource {
    /// Next frame, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> Option<VideoFrame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        (**self).next_frame()
    }
}
