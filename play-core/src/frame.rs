//! Frame geometry and raw frame buffers.
//!
//! A [`StreamGeometry`] is fixed once probed and determines the exact byte
//! length of every frame read from the decode pipe. A [`RawFrame`] is one
//! uncompressed image of exactly that length, no header, no timestamp.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Zero-sized video geometry: {width}x{height}")]
    ZeroSized { width: u32, height: u32 },
}

/// Byte order of the packed pixels ffmpeg emits on the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb24,
    Bgr24,
}

impl PixelLayout {
    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        3
    }

    /// Name understood by ffmpeg's `-pix_fmt`.
    pub fn pix_fmt(&self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
        }
    }
}

impl std::str::FromStr for PixelLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb24" => Ok(Self::Rgb24),
            "bgr24" => Ok(Self::Bgr24),
            other => Err(format!("Unknown pixel layout: {}", other)),
        }
    }
}

/// Probed stream geometry. Immutable for the lifetime of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    width: u32,
    height: u32,
    layout: PixelLayout,
}

impl StreamGeometry {
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::ZeroSized { width, height });
        }
        Ok(Self {
            width,
            height,
            layout,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Fixed read size for every frame of this stream.
    pub fn bytes_per_frame(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }
}

/// One uncompressed frame, exactly `bytes_per_frame` long.
///
/// Produced by a frame source, consumed exactly once by a sink. Carries no
/// presentation timestamp; pacing is rate-based.
#[derive(Debug)]
pub struct RawFrame {
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Whether this buffer matches the declared frame shape.
    pub fn matches(&self, geometry: &StreamGeometry) -> bool {
        self.data.len() == geometry.bytes_per_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_frame() {
        let geo = StreamGeometry::new(4, 2, PixelLayout::Rgb24).unwrap();
        assert_eq!(geo.bytes_per_frame(), 24);

        let geo = StreamGeometry::new(1920, 1080, PixelLayout::Bgr24).unwrap();
        assert_eq!(geo.bytes_per_frame(), 1920 * 1080 * 3);
    }

    #[test]
    fn test_zero_geometry_rejected() {
        assert!(StreamGeometry::new(0, 1080, PixelLayout::Rgb24).is_err());
        assert!(StreamGeometry::new(1920, 0, PixelLayout::Rgb24).is_err());
        assert!(StreamGeometry::new(0, 0, PixelLayout::Bgr24).is_err());
    }

    #[test]
    fn test_frame_matches_geometry() {
        let geo = StreamGeometry::new(4, 2, PixelLayout::Rgb24).unwrap();
        assert!(RawFrame::new(vec![0u8; 24]).matches(&geo));
        assert!(!RawFrame::new(vec![0u8; 23]).matches(&geo));
        assert!(!RawFrame::new(vec![0u8; 25]).matches(&geo));
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("rgb24".parse::<PixelLayout>().unwrap(), PixelLayout::Rgb24);
        assert_eq!("bgr24".parse::<PixelLayout>().unwrap(), PixelLayout::Bgr24);
        assert!("yuv420p".parse::<PixelLayout>().is_err());
    }
}
