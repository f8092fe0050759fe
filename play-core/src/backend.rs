//! Media backend seam.
//!
//! The pipeline controller talks to probing and decoding through this trait
//! so playback logic can run against scripted fakes in tests, with the
//! ffmpeg-backed implementation as the production default.

use crate::decoder::{FfmpegFrameSource, FrameSource, SourceControl, SourceError};
use crate::frame::{PixelLayout, StreamGeometry};
use crate::probe::{self, ProbeError, StreamInfo};
use crate::source::MediaSource;
use std::sync::Arc;

/// Probe + open for one media technology.
pub trait MediaBackend: Send + Sync {
    /// Metadata-only geometry query. Must not start decoding.
    fn probe(&self, source: &MediaSource, layout: PixelLayout) -> Result<StreamInfo, ProbeError>;

    /// Spawn a frame source bound to the probed geometry, plus the control
    /// handle that can unblock its reads from the controlling side.
    fn open(
        &self,
        source: &MediaSource,
        geometry: StreamGeometry,
    ) -> Result<(Box<dyn FrameSource>, Arc<dyn SourceControl>), SourceError>;
}

/// Production backend: ffprobe for metadata, ffmpeg for raw frames.
#[derive(Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe(&self, source: &MediaSource, layout: PixelLayout) -> Result<StreamInfo, ProbeError> {
        probe::probe_source(source, layout)
    }

    fn open(
        &self,
        source: &MediaSource,
        geometry: StreamGeometry,
    ) -> Result<(Box<dyn FrameSource>, Arc<dyn SourceControl>), SourceError> {
        let (src, control) = FfmpegFrameSource::spawn(source, geometry)?;
        Ok((Box::new(src), control))
    }
}
