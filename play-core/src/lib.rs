//! # Play Core
//!
//! Raw-frame video playback pipeline: probe a media source, decode it to
//! uncompressed frames through an external ffmpeg process, pace the frames to
//! a target rate and hand them to a presentation sink.

// ============================================================================
// Data Model
// ============================================================================
pub mod frame;
pub mod source;

// ============================================================================
// Pipeline Stages
// ============================================================================
pub mod probe;
pub mod decoder;
pub mod pacer;
pub mod render;

// ============================================================================
// Controller
// ============================================================================
pub mod backend;
pub mod pipeline;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
