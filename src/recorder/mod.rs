//! Capture system module
//!
//! This module implements the capture lifecycle:
//! - CaptureController owning state, session, and artifact
//! - The session chunk log and the snapshot the UI renders from

pub mod controller;
pub mod state;

pub use controller::{CaptureController, TranscodeJob};
pub use state::{CaptureConfig, CaptureSnapshot, CaptureState, CaptureSummary, RecordingSession};
