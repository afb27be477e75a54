//! WEBM to MP4 conversion
//!
//! The engine stages recorded bytes in a private workspace and runs
//! the system FFmpeg against them.

pub mod engine;
pub mod types;

pub use engine::TranscodeEngine;
pub use types::{Artifact, ArtifactInfo, MediaContainer, TranscodeError};
