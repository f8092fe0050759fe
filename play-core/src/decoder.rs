//! Frame source backed by an external ffmpeg process.
//!
//! The decode process writes consecutive fixed-size raw frames to its stdout
//! pipe with no framing headers. [`FfmpegFrameSource`] owns that process
//! exclusively and exposes a pull-based `next_frame` that performs blocking
//! reads of exactly one frame.
//!
//! The sequence is lazy, finite and not restartable. A short read mid-frame
//! is a hard [`SourceError::TruncatedFrame`]; reshaping a partial buffer into
//! a frame is never attempted.

use crate::frame::{RawFrame, StreamGeometry};
use crate::source::MediaSource;
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to launch decode process: {0}")]
    ProcessSpawn(std::io::Error),
    #[error("Truncated frame: got {got} of {expected} bytes")]
    TruncatedFrame { expected: usize, got: usize },
    #[error("Decode process closed its pipe before producing any frame ({0})")]
    PipeClosedUnexpectedly(String),
    #[error("Pipe read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pull-based source of raw frames.
///
/// The narrow seam the pipeline is built against, so playback logic can be
/// tested with a scripted source instead of a real decode process.
pub trait FrameSource: Send {
    /// Blocking read of the next frame.
    ///
    /// `Ok(Some(_))` is one full frame, `Ok(None)` is a clean end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Idempotent teardown. Must release the decode process and its pipe.
    fn close(&mut self);
}

/// Controlling-side handle that unblocks an in-flight `next_frame` read.
///
/// Shared with the pipeline controller so a stop request can interrupt the
/// decode thread within bounded time instead of waiting out the pipe.
pub trait SourceControl: Send + Sync {
    fn interrupt(&self);
}

/// Read exactly `frame_len` bytes from the pipe.
///
/// EOF at a frame boundary is `Ok(None)`; EOF mid-frame is a truncated
/// frame. Interrupted reads are retried.
fn read_frame(reader: &mut impl Read, frame_len: usize) -> Result<Option<Vec<u8>>, SourceError> {
    let mut buf = vec![0u8; frame_len];
    let mut filled = 0usize;

    while filled < frame_len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(SourceError::TruncatedFrame {
                    expected: frame_len,
                    got: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SourceError::Io(e)),
        }
    }

    Ok(Some(buf))
}

/// Fixed-size framing over a byte pipe.
///
/// Tracks whether the stream produced anything at all: EOF before the first
/// frame means the producer died without output, which is a hard error, not
/// a clean end of stream.
struct PipeFramer<R> {
    reader: R,
    frame_len: usize,
    frames_read: u64,
}

impl<R: Read> PipeFramer<R> {
    fn new(reader: R, frame_len: usize) -> Self {
        Self {
            reader,
            frame_len,
            frames_read: 0,
        }
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match read_frame(&mut self.reader, self.frame_len)? {
            Some(buf) => {
                self.frames_read += 1;
                Ok(Some(buf))
            }
            None if self.frames_read == 0 => Err(SourceError::PipeClosedUnexpectedly(
                "no output before end of stream".to_string(),
            )),
            None => Ok(None),
        }
    }
}

type SharedChild = Arc<Mutex<Option<Child>>>;

/// Kills the decode process from the controlling side. Dropping the writer
/// end unblocks the reader's pending `read` with EOF.
struct ProcessTerminator {
    child: SharedChild,
}

impl SourceControl for ProcessTerminator {
    fn interrupt(&self) {
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
    }
}

/// Frame source owning one external ffmpeg decode process.
pub struct FfmpegFrameSource {
    child: SharedChild,
    framer: Option<PipeFramer<ChildStdout>>,
    geometry: StreamGeometry,
}

impl FfmpegFrameSource {
    /// Spawn ffmpeg decoding `source` to raw frames in the declared layout.
    ///
    /// Returns the source plus the control handle used to interrupt a
    /// blocked read. Audio and subtitle streams are dropped at the demuxer;
    /// stderr is discarded since nothing drains it during playback.
    pub fn spawn(
        source: &MediaSource,
        geometry: StreamGeometry,
    ) -> Result<(Self, Arc<dyn SourceControl>), SourceError> {
        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-i")
            .arg(source.as_arg())
            .arg("-an")
            .arg("-sn")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg(geometry.layout().pix_fmt())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(SourceError::ProcessSpawn)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SourceError::ProcessSpawn(std::io::Error::other("ffmpeg stdout unavailable"))
        })?;

        tracing::debug!(
            %source,
            pid = child.id(),
            frame_bytes = geometry.bytes_per_frame(),
            "decode process started"
        );

        let child = Arc::new(Mutex::new(Some(child)));
        let control: Arc<dyn SourceControl> = Arc::new(ProcessTerminator {
            child: child.clone(),
        });

        Ok((
            Self {
                child,
                framer: Some(PipeFramer::new(stdout, geometry.bytes_per_frame())),
                geometry,
            },
            control,
        ))
    }

    pub fn geometry(&self) -> StreamGeometry {
        self.geometry
    }

    /// Exit status description for diagnostics, reaping the child.
    fn reap_status(&mut self) -> String {
        match self.child.lock().take() {
            Some(mut child) => match child.wait() {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {}", e),
            },
            None => "already reaped".to_string(),
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let Some(framer) = self.framer.as_mut() else {
            // Closed; the sequence is over.
            return Ok(None);
        };

        match framer.next_frame() {
            Ok(Some(buf)) => Ok(Some(RawFrame::new(buf))),
            Ok(None) => Ok(None),
            Err(SourceError::PipeClosedUnexpectedly(_)) => {
                // Swap in the exit status for diagnostics.
                let status = self.reap_status();
                Err(SourceError::PipeClosedUnexpectedly(status))
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        // Drop our end of the pipe first, then terminate and reap.
        let frames = self.framer.as_ref().map_or(0, |f| f.frames_read());
        self.framer = None;
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(frames, "decode process closed");
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;
    use std::io::Cursor;

    fn test_geometry() -> StreamGeometry {
        // 4x2 RGB24: 24 bytes per frame.
        StreamGeometry::new(4, 2, PixelLayout::Rgb24).unwrap()
    }

    #[test]
    fn test_exact_frames_then_eof() {
        let geo = test_geometry();
        let mut stream = Cursor::new(vec![7u8; geo.bytes_per_frame() * 3]);

        for _ in 0..3 {
            let frame = read_frame(&mut stream, geo.bytes_per_frame())
                .unwrap()
                .unwrap();
            assert_eq!(frame.len(), 24);
        }
        // Not a fourth frame, not an error.
        assert!(read_frame(&mut stream, geo.bytes_per_frame())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_trailing_partial_is_truncated() {
        let geo = test_geometry();
        let mut stream = Cursor::new(vec![7u8; geo.bytes_per_frame() * 2 + 10]);

        assert!(read_frame(&mut stream, geo.bytes_per_frame())
            .unwrap()
            .is_some());
        assert!(read_frame(&mut stream, geo.bytes_per_frame())
            .unwrap()
            .is_some());

        let err = read_frame(&mut stream, geo.bytes_per_frame()).unwrap_err();
        match err {
            SourceError::TruncatedFrame { expected, got } => {
                assert_eq!(expected, 24);
                assert_eq!(got, 10);
            }
            other => panic!("expected TruncatedFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_stream_is_eof() {
        let mut stream = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut stream, 24).unwrap().is_none());
    }

    #[test]
    fn test_eof_before_first_frame_is_unexpected_close() {
        let mut framer = PipeFramer::new(Cursor::new(Vec::<u8>::new()), 24);
        let err = framer.next_frame().unwrap_err();
        assert!(matches!(err, SourceError::PipeClosedUnexpectedly(_)));
    }

    #[test]
    fn test_eof_after_frames_is_clean_end() {
        let geo = test_geometry();
        let mut framer = PipeFramer::new(
            Cursor::new(vec![7u8; geo.bytes_per_frame() * 2]),
            geo.bytes_per_frame(),
        );

        assert!(framer.next_frame().unwrap().is_some());
        assert!(framer.next_frame().unwrap().is_some());
        assert!(framer.next_frame().unwrap().is_none());
        assert_eq!(framer.frames_read(), 2);
    }

    /// Reader that hands out data in small chunks, the way a pipe does.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.data.len() - self.pos;
            let n = remaining.min(self.chunk).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let geo = test_geometry();
        let mut stream = ChunkedReader {
            data: (0..geo.bytes_per_frame() as u8).collect(),
            pos: 0,
            chunk: 5,
        };

        let frame = read_frame(&mut stream, geo.bytes_per_frame())
            .unwrap()
            .unwrap();
        assert_eq!(frame.len(), 24);
        assert_eq!(frame[5], 5);
        assert!(read_frame(&mut stream, geo.bytes_per_frame())
            .unwrap()
            .is_none());
    }
}
