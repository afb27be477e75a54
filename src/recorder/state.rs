//! Capture state management
//!
//! Defines the capture state machine, the per-cycle chunk log, and the
//! snapshot the UI renders from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transcode::types::ArtifactInfo;

/// Current state of the capture system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No capture in progress
    Idle,
    /// Currently capturing
    Capturing,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::Idle
    }
}

/// One capture cycle's recorded data
///
/// A fresh session replaces the previous one on every start, so chunks
/// never leak across cycles. After stop the session stays around
/// untouched until the next start; a failed conversion leaves it
/// inspectable.
#[derive(Debug)]
pub struct RecordingSession {
    /// Session identifier
    pub id: Uuid,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// When the session ended (None while capturing)
    pub ended_at: Option<DateTime<Utc>>,

    /// Recorded chunks in arrival order
    chunks: Vec<Vec<u8>>,
}

impl RecordingSession {
    /// Create a new session starting now
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            chunks: Vec::new(),
        }
    }

    /// Append a chunk in arrival order. Zero-length chunks are
    /// discarded, they carry no data and must never reach the
    /// concatenated output.
    pub fn append_chunk(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            tracing::debug!("Discarding empty chunk for session {}", self.id);
            return;
        }
        self.chunks.push(chunk);
    }

    /// End the session
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Number of chunks recorded so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total recorded bytes
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate all chunks into one buffer, preserving arrival
    /// order byte-for-byte
    pub fn concatenate(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Milliseconds from start to end (or to now while live)
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for starting a capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Camera device ID (None = default camera)
    pub device_id: Option<String>,

    /// Requested capture width
    pub width: u32,

    /// Requested capture height
    pub height: u32,

    /// Requested capture FPS
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Summary of a stopped capture cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    /// Session identifier
    pub session_id: Uuid,

    /// Chunks recorded
    pub chunk_count: usize,

    /// Total recorded bytes
    pub byte_len: usize,

    /// Capture duration in milliseconds
    pub duration_ms: u64,
}

/// Point-in-time view of the capture system for the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    /// Current state
    pub state: CaptureState,

    /// Elapsed milliseconds of the current (or last) session
    pub elapsed_ms: u64,

    /// Whether a conversion is still in flight
    pub transcoding: bool,

    /// Completed artifact, if any
    pub artifact: Option<ArtifactInfo>,

    /// Most recent cycle-scoped error message, if any
    pub last_error: Option<String>,
}
