//! Capture command handlers
//!
//! Tauri commands behind the UI: camera listing, the start/stop
//! toggle, snapshots, and artifact retrieval. Stop hands the
//! conversion job to a background task that reports back through
//! events.

use std::sync::Arc;

use tauri::{AppHandle, Emitter, Manager, State};
use tokio::sync::Mutex;

use crate::capture::traits::CameraInfo;
use crate::capture::webcam::{self, WebcamSource};
use crate::recorder::controller::TranscodeJob;
use crate::recorder::state::{CaptureConfig, CaptureSnapshot};
use crate::recorder::CaptureController;
use crate::transcode::types::{Artifact, ArtifactInfo, TranscodeError};
use crate::transcode::TranscodeEngine;
use crate::utils::error::{AppError, ErrorResponse};

/// Application state for capture
pub struct ControllerState {
    pub controller: Arc<Mutex<CaptureController>>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            controller: Arc::new(Mutex::new(CaptureController::new())),
        }
    }
}

/// Lazily-loaded conversion engine shared by all jobs
#[derive(Default)]
pub struct EngineState {
    slot: Mutex<Option<Arc<TranscodeEngine>>>,
}

impl EngineState {
    /// Get the engine, running its one-time setup on first use
    pub async fn get_or_load(&self) -> Result<Arc<TranscodeEngine>, TranscodeError> {
        let mut slot = self.slot.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new(TranscodeEngine::load().await?);
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Release the engine at shutdown, removing its workspace
    pub async fn teardown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(engine) = slot.take() {
            match Arc::try_unwrap(engine) {
                Ok(engine) => engine.teardown(),
                Err(_) => tracing::warn!("Transcode engine still in use at shutdown"),
            }
        }
    }
}

/// Get list of available cameras/webcams
#[tauri::command]
pub async fn get_cameras() -> Result<Vec<CameraInfo>, String> {
    Ok(webcam::get_cameras())
}

/// Start capturing from the webcam
#[tauri::command]
pub async fn start_capture(
    app: AppHandle,
    state: State<'_, ControllerState>,
    config: Option<CaptureConfig>,
) -> Result<CaptureSnapshot, String> {
    let config = config.unwrap_or_default();
    let mut controller = state.controller.lock().await;

    let snapshot = controller
        .start(Box::new(WebcamSource::new()), config)
        .await
        .map_err(|e| e.to_string())?;

    if let Err(e) = app.emit("capture-started", &snapshot) {
        tracing::warn!("Failed to emit capture-started: {}", e);
    }

    Ok(snapshot)
}

/// Stop capturing and convert the recording in the background.
///
/// Returns as soon as the capture is stopped; the conversion outcome
/// arrives later as a transcode-complete or transcode-error event.
#[tauri::command]
pub async fn stop_capture(
    app: AppHandle,
    state: State<'_, ControllerState>,
) -> Result<CaptureSnapshot, String> {
    let mut controller = state.controller.lock().await;
    let job = controller.stop().await.map_err(|e| e.to_string())?;
    let snapshot = controller.snapshot();
    drop(controller);

    let Some(job) = job else {
        return Ok(snapshot);
    };

    if let Err(e) = app.emit("capture-stopped", &job.summary) {
        tracing::warn!("Failed to emit capture-stopped: {}", e);
    }

    let controller = Arc::clone(&state.controller);
    tauri::async_runtime::spawn(async move {
        run_transcode(app, controller, job).await;
    });

    Ok(snapshot)
}

/// Convert a stopped cycle's recording and report the outcome
async fn run_transcode(
    app: AppHandle,
    controller: Arc<Mutex<CaptureController>>,
    job: TranscodeJob,
) {
    let session_id = job.summary.session_id;

    let result = async {
        let engine_state = app.state::<EngineState>();
        let engine = engine_state.get_or_load().await?;
        engine.convert(&job.input, job.from, job.to).await
    }
    .await;

    match result {
        Ok(bytes) => {
            let artifact = Artifact::new(session_id, bytes, job.to);
            let info = artifact.info();
            controller.lock().await.install_artifact(artifact);

            if let Err(e) = app.emit("transcode-complete", &info) {
                tracing::warn!("Failed to emit transcode-complete: {}", e);
            }
        }
        Err(e) => {
            let message = e.to_string();
            let response = ErrorResponse::from(AppError::from(e));
            controller.lock().await.record_transcode_error(message);

            if let Err(emit_err) = app.emit("transcode-error", &response) {
                tracing::warn!("Failed to emit transcode-error: {}", emit_err);
            }
        }
    }
}

/// Get the current capture snapshot
#[tauri::command]
pub async fn get_capture_state(
    state: State<'_, ControllerState>,
) -> Result<CaptureSnapshot, String> {
    let controller = state.controller.lock().await;
    Ok(controller.snapshot())
}

/// Fetch the completed artifact's bytes for playback
#[tauri::command]
pub async fn get_artifact(
    state: State<'_, ControllerState>,
) -> Result<tauri::ipc::Response, String> {
    let controller = state.controller.lock().await;
    match controller.artifact() {
        Some(artifact) => Ok(tauri::ipc::Response::new(artifact.bytes.clone())),
        None => Err("No artifact available yet".to_string()),
    }
}

/// Metadata for the completed artifact, if any
#[tauri::command]
pub async fn get_artifact_info(
    state: State<'_, ControllerState>,
) -> Result<Option<ArtifactInfo>, String> {
    let controller = state.controller.lock().await;
    Ok(controller.artifact().map(Artifact::info))
}
