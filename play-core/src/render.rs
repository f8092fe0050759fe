//! Presentation sinks.
//!
//! A sink consumes one frame at a time, fire-and-forget; it never retains the
//! frame past `present`. Backends are selected at pipeline construction via
//! `Box<dyn FrameSink>`, one implementation per display technology.

use crate::frame::{PixelLayout, RawFrame, StreamGeometry};
use std::path::PathBuf;
use std::sync::mpsc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Frame length disagrees with the declared geometry. Hard error;
    /// reshaping a mismatched buffer is never attempted.
    #[error("Frame geometry mismatch: got {got} bytes, expected {expected}")]
    GeometryMismatch { expected: usize, got: usize },
    #[error("Display surface detached")]
    SurfaceDetached,
    #[error("Snapshot write failed: {0}")]
    Snapshot(String),
}

/// A presentation backend.
pub trait FrameSink: Send {
    /// Present one frame. The frame is consumed exactly once.
    fn present(&mut self, frame: RawFrame, geometry: &StreamGeometry) -> Result<(), RenderError>;

    /// Sink name for diagnostics.
    fn name(&self) -> &str;
}

/// Reject frames whose length disagrees with `bytes_per_frame`.
pub fn check_geometry(frame: &RawFrame, geometry: &StreamGeometry) -> Result<(), RenderError> {
    if !frame.matches(geometry) {
        return Err(RenderError::GeometryMismatch {
            expected: geometry.bytes_per_frame(),
            got: frame.len(),
        });
    }
    Ok(())
}

// ============================================================================
// Counting Sink (headless playback / tests)
// ============================================================================

/// Discards pixels, counts presentations.
#[derive(Default)]
pub struct CountingSink {
    presented: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameSink for CountingSink {
    fn present(&mut self, frame: RawFrame, geometry: &StreamGeometry) -> Result<(), RenderError> {
        check_geometry(&frame, geometry)?;
        self.presented += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

// ============================================================================
// Channel Sink (hand-off to a display thread)
// ============================================================================

/// Forwards frames to another thread without blocking.
///
/// Display APIs that must run on a specific thread receive frames through the
/// paired receiver instead of a direct cross-thread call.
pub struct ChannelSink {
    tx: mpsc::Sender<RawFrame>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<RawFrame>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn present(&mut self, frame: RawFrame, geometry: &StreamGeometry) -> Result<(), RenderError> {
        check_geometry(&frame, geometry)?;
        self.tx
            .send(frame)
            .map_err(|_| RenderError::SurfaceDetached)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

// ============================================================================
// Snapshot Sink (PNG sequence)
// ============================================================================

/// Writes every Nth presented frame to `dir` as a PNG.
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    seen: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            dir: dir.into(),
            every: every.max(1),
            seen: 0,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn encode(&self, frame: &RawFrame, geometry: &StreamGeometry) -> Result<PathBuf, RenderError> {
        let mut pixels = frame.as_bytes().to_vec();
        if geometry.layout() == PixelLayout::Bgr24 {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        let img = image::RgbImage::from_raw(geometry.width(), geometry.height(), pixels)
            .ok_or_else(|| RenderError::Snapshot("buffer did not fill image".into()))?;

        let path = self.dir.join(format!("frame_{:06}.png", self.seen));
        img.save(&path)
            .map_err(|e| RenderError::Snapshot(e.to_string()))?;
        Ok(path)
    }
}

impl FrameSink for SnapshotSink {
    fn present(&mut self, frame: RawFrame, geometry: &StreamGeometry) -> Result<(), RenderError> {
        check_geometry(&frame, geometry)?;
        if self.seen % self.every == 0 {
            let path = self.encode(&frame, geometry)?;
            self.written += 1;
            tracing::debug!(path = %path.display(), "snapshot written");
        }
        self.seen += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;

    fn geo() -> StreamGeometry {
        StreamGeometry::new(4, 2, PixelLayout::Rgb24).unwrap()
    }

    #[test]
    fn test_counting_sink_counts() {
        let geometry = geo();
        let mut sink = CountingSink::new();
        for _ in 0..3 {
            sink.present(RawFrame::new(vec![0u8; 24]), &geometry).unwrap();
        }
        assert_eq!(sink.presented(), 3);
    }

    #[test]
    fn test_geometry_mismatch_is_hard_error() {
        let geometry = geo();
        let mut sink = CountingSink::new();
        let err = sink
            .present(RawFrame::new(vec![0u8; 10]), &geometry)
            .unwrap_err();
        match err {
            RenderError::GeometryMismatch { expected, got } => {
                assert_eq!(expected, 24);
                assert_eq!(got, 10);
            }
            other => panic!("expected GeometryMismatch, got {:?}", other),
        }
        assert_eq!(sink.presented(), 0);
    }

    #[test]
    fn test_channel_sink_forwards_frames() {
        let geometry = geo();
        let (mut sink, rx) = ChannelSink::new();
        sink.present(RawFrame::new(vec![9u8; 24]), &geometry).unwrap();
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.as_bytes(), &[9u8; 24][..]);
    }

    #[test]
    fn test_channel_sink_detached_receiver() {
        let geometry = geo();
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);
        let err = sink
            .present(RawFrame::new(vec![0u8; 24]), &geometry)
            .unwrap_err();
        assert!(matches!(err, RenderError::SurfaceDetached));
    }

    #[test]
    fn test_snapshot_sink_writes_every_nth() {
        let geometry = geo();
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(dir.path(), 2);
        for _ in 0..5 {
            sink.present(RawFrame::new(vec![128u8; 24]), &geometry)
                .unwrap();
        }
        // Frames 0, 2, 4.
        assert_eq!(sink.written(), 3);
        assert!(dir.path().join("frame_000000.png").exists());
        assert!(dir.path().join("frame_000004.png").exists());
        assert!(!dir.path().join("frame_000001.png").exists());
    }

    #[test]
    fn test_snapshot_sink_swizzles_bgr() {
        let geometry = StreamGeometry::new(1, 1, PixelLayout::Bgr24).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(dir.path(), 1);
        // BGR (10, 20, 30) should land as RGB (30, 20, 10).
        sink.present(RawFrame::new(vec![10, 20, 30]), &geometry)
            .unwrap();
        let img = image::open(dir.path().join("frame_000000.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10]);
    }
}
