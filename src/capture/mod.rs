//! Webcam capture
//!
//! This module provides camera enumeration and the chunked capture
//! source feeding the recorder.

pub mod traits;
pub mod webcam;

// Re-export the seam types
pub use traits::{CameraInfo, CaptureError, CaptureResult, CaptureSource, ChunkSink, Resolution};
pub use webcam::{get_cameras, WebcamSource};
