//! Transcoding types
//!
//! This module defines the container formats the engine converts
//! between, the completed artifact, and error handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Media container formats the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaContainer {
    Webm,
    Mp4,
}

impl MediaContainer {
    /// Get the file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            MediaContainer::Webm => "webm",
            MediaContainer::Mp4 => "mp4",
        }
    }

    /// Get the MIME type for this container
    pub fn mime(&self) -> &'static str {
        match self {
            MediaContainer::Webm => "video/webm",
            MediaContainer::Mp4 => "video/mp4",
        }
    }
}

/// A completed conversion result
///
/// The media type always describes the bytes actually produced by the
/// engine, so a WEBM to MP4 conversion yields MP4 bytes labeled MP4.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Session the artifact was produced from
    pub session_id: Uuid,

    /// The converted bytes
    pub bytes: Vec<u8>,

    /// Container of `bytes`
    pub media_type: MediaContainer,

    /// When the conversion finished
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(session_id: Uuid, bytes: Vec<u8>, media_type: MediaContainer) -> Self {
        Self {
            session_id,
            bytes,
            media_type,
            created_at: Utc::now(),
        }
    }

    /// Metadata view for the UI; the bytes travel separately
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            session_id: self.session_id,
            mime: self.media_type.mime().to_string(),
            byte_len: self.bytes.len(),
            created_at: self.created_at,
        }
    }
}

/// Artifact metadata sent to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    /// Session the artifact was produced from
    pub session_id: Uuid,

    /// MIME type of the artifact bytes
    pub mime: String,

    /// Size of the artifact in bytes
    pub byte_len: usize,

    /// When the conversion finished
    pub created_at: DateTime<Utc>,
}

/// Transcoding errors
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg not available: {0}")]
    EngineMissing(String),

    #[error("nothing was recorded, input is empty")]
    EmptyInput,

    #[error("FFmpeg error: {0}")]
    Engine(String),

    #[error("conversion produced no output: {0}")]
    OutputMissing(String),
}

impl From<TranscodeError> for String {
    fn from(e: TranscodeError) -> String {
        e.to_string()
    }
}
