//! Media probe.
//!
//! Metadata-only query of a source's stream geometry via `ffprobe`. Nothing
//! here starts decoding; the probe runs to completion and its JSON output is
//! parsed for the first video stream.

use crate::frame::{PixelLayout, StreamGeometry};
use crate::source::MediaSource;
use serde::Deserialize;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the metadata query. A stop request cannot interrupt the
/// probe phase (no frame pipe exists yet), so a wedged tool is cut off here
/// instead of holding the worker thread indefinitely.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Path missing, permissions, unsupported container, or the probe tool
    /// itself could not run.
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),
    /// The container has no decodable video track (or a zero-sized one).
    #[error("No video stream found")]
    NoVideoStream,
}

/// Probed stream metadata.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub geometry: StreamGeometry,
    /// Average frame rate as reported by the container, if any.
    pub frame_rate: Option<f64>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

/// Parse an ffprobe rational like "30000/1001". Zero denominator means the
/// container reported no usable rate.
fn parse_rational(value: &str) -> Option<f64> {
    let mut parts = value.split('/');
    let numerator = parts.next()?.trim().parse::<f64>().ok()?;
    let denominator = parts.next()?.trim().parse::<f64>().ok()?;
    if denominator == 0.0 || numerator <= 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Parse raw ffprobe JSON and select the first video-typed stream.
///
/// The output routinely carries audio/subtitle/data streams as well; those
/// are skipped, not errors.
pub fn parse_probe_output(raw: &[u8], layout: PixelLayout) -> Result<StreamInfo, ProbeError> {
    let probe: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| ProbeError::SourceUnreadable(format!("ffprobe parse: {}", e)))?;

    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    let geometry =
        StreamGeometry::new(width, height, layout).map_err(|_| ProbeError::NoVideoStream)?;

    let frame_rate = stream.avg_frame_rate.as_deref().and_then(parse_rational);

    Ok(StreamInfo {
        geometry,
        frame_rate,
    })
}

/// Run the probe command and collect its stdout. The child is killed if it
/// does not finish within `timeout`; killing it closes both pipes and lets
/// the drain threads run out.
fn run_probe(mut cmd: Command, timeout: Duration) -> Result<Vec<u8>, ProbeError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProbeError::SourceUnreadable(format!("ffprobe spawn failed: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProbeError::SourceUnreadable("ffprobe stdout unavailable".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProbeError::SourceUnreadable("ffprobe stderr unavailable".to_string()))?;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut raw = Vec::new();
        let result = stdout.read_to_end(&mut raw).map(|_| raw);
        let _ = tx.send(result);
    });
    let err_drain = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    let outcome = rx.recv_timeout(timeout);
    if outcome.is_err() {
        let _ = child.kill();
    }
    let status = child
        .wait()
        .map_err(|e| ProbeError::SourceUnreadable(format!("ffprobe wait failed: {}", e)))?;

    let raw = match outcome {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            return Err(ProbeError::SourceUnreadable(format!(
                "ffprobe read failed: {}",
                e
            )))
        }
        Err(_) => {
            return Err(ProbeError::SourceUnreadable(format!(
                "probe timed out after {:?}",
                timeout
            )))
        }
    };

    if !status.success() {
        let diagnostics = err_drain.join().unwrap_or_default();
        return Err(ProbeError::SourceUnreadable(format!(
            "ffprobe error: {}",
            String::from_utf8_lossy(&diagnostics).trim()
        )));
    }
    Ok(raw)
}

/// Run ffprobe against the source and return its geometry.
pub fn probe_source(source: &MediaSource, layout: PixelLayout) -> Result<StreamInfo, ProbeError> {
    if let MediaSource::Path(path) = source {
        if !path.exists() {
            return Err(ProbeError::SourceUnreadable(format!(
                "File not found: {}",
                path.display()
            )));
        }
    }

    tracing::debug!(%source, "probing");

    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("stream=codec_type,width,height,avg_frame_rate")
        .arg("-of")
        .arg("json")
        .arg(source.as_arg());

    let raw = run_probe(cmd, PROBE_TIMEOUT)?;
    let info = parse_probe_output(&raw, layout)?;
    tracing::debug!(
        width = info.geometry.width(),
        height = info.geometry.height(),
        fps = ?info.frame_rate,
        "probe complete"
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("nonsense"), None);
    }

    #[test]
    fn test_selects_first_video_stream() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720, "avg_frame_rate": "25/1"},
                {"codec_type": "video", "width": 640, "height": 360, "avg_frame_rate": "30/1"},
                {"codec_type": "subtitle"}
            ]
        }"#;
        let info = parse_probe_output(raw, PixelLayout::Rgb24).unwrap();
        assert_eq!(info.geometry.width(), 1280);
        assert_eq!(info.geometry.height(), 720);
        assert_eq!(info.frame_rate, Some(25.0));
    }

    #[test]
    fn test_audio_only_is_no_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "audio"}, {"codec_type": "subtitle"}]}"#;
        let err = parse_probe_output(raw, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_zero_geometry_is_no_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "video", "width": 0, "height": 720}]}"#;
        let err = parse_probe_output(raw, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_missing_dimensions_is_no_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "video"}]}"#;
        let err = parse_probe_output(raw, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_empty_streams() {
        let err = parse_probe_output(br#"{"streams": []}"#, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_garbage_output_is_unreadable() {
        let err = parse_probe_output(b"not json", PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::SourceUnreadable(_)));
    }

    #[test]
    fn test_hung_probe_command_is_cut_off() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");

        let begin = std::time::Instant::now();
        let err = run_probe(cmd, Duration::from_millis(200)).unwrap_err();
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, ProbeError::SourceUnreadable(_)));
    }

    #[test]
    fn test_probe_command_output_is_collected() {
        let mut cmd = Command::new("echo");
        cmd.arg(r#"{"streams": []}"#);

        let raw = run_probe(cmd, Duration::from_secs(5)).unwrap();
        let err = parse_probe_output(&raw, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let source: MediaSource = "/definitely/not/here.mp4".parse().unwrap();
        let err = probe_source(&source, PixelLayout::Rgb24).unwrap_err();
        assert!(matches!(err, ProbeError::SourceUnreadable(_)));
    }
}
