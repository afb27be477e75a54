//! Capture trait definitions
//!
//! Device-agnostic seam between the capture controller and whatever
//! produces the recorded byte stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recorder::state::CaptureConfig;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Callback receiving recorded chunks in arrival order.
///
/// Invoked from the source's reader thread; implementations must be
/// cheap and must not block the stream.
pub type ChunkSink = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// A source of recorded media chunks (webcam in production, a test
/// double in tests).
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Stable identifier for logging
    fn id(&self) -> &str;

    /// Preflight checks: device present, tooling available.
    ///
    /// Must be called before `start`. Failure means capture cannot
    /// begin and maps to a user-visible message.
    async fn initialize(&mut self, config: &CaptureConfig) -> CaptureResult<()>;

    /// Begin producing chunks into `sink`.
    ///
    /// Resolves once the stream is up; a stream that cannot be brought
    /// up is returned as an error.
    async fn start(&mut self, sink: ChunkSink) -> CaptureResult<()>;

    /// Stop producing chunks.
    ///
    /// Flushes the stream first, so chunks already in flight are still
    /// delivered to the sink before this returns.
    async fn stop(&mut self) -> CaptureResult<()>;

    /// Whether the source is currently producing chunks
    fn is_live(&self) -> bool;
}

/// Errors from capture sources
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture already live")]
    AlreadyLive,

    #[error("capture not live")]
    NotLive,

    #[error("no camera available: {0}")]
    DeviceNotFound(String),

    #[error("required tool missing: {0}")]
    ToolMissing(String),

    #[error("capture stream failed: {0}")]
    Stream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
