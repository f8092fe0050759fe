//! Media source addressing.
//!
//! A source is either a local file or a URL. Both are handed verbatim to the
//! external probe/decode tools; only local paths get an existence check up
//! front.

use std::ffi::OsString;
use std::path::PathBuf;
use url::Url;

/// A playable media source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Path(PathBuf),
    Url(Url),
}

impl MediaSource {
    /// The single argument passed to ffprobe/ffmpeg `-i`.
    pub fn as_arg(&self) -> OsString {
        match self {
            Self::Path(path) => path.clone().into_os_string(),
            Self::Url(url) => OsString::from(url.as_str()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Path(_))
    }
}

impl std::str::FromStr for MediaSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            if let Ok(url) = Url::parse(s) {
                return Ok(Self::Url(url));
            }
        }
        Ok(Self::Path(PathBuf::from(s)))
    }
}

impl std::fmt::Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}
