//! Capture controller
//!
//! Owns the capture lifecycle: the state flag, the per-cycle chunk
//! log, the completed artifact, and the error display. The command
//! layer drives it and runs the conversion jobs it hands back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as ParkingMutex;

use crate::capture::traits::{CaptureError, CaptureSource, ChunkSink};
use crate::recorder::state::{
    CaptureConfig, CaptureSnapshot, CaptureState, CaptureSummary, RecordingSession,
};
use crate::transcode::types::{Artifact, MediaContainer};

/// A stopped cycle's conversion job
#[derive(Debug)]
pub struct TranscodeJob {
    /// The concatenated recording
    pub input: Vec<u8>,

    /// Container of `input`
    pub from: MediaContainer,

    /// Container to produce
    pub to: MediaContainer,

    /// Summary of the stopped cycle
    pub summary: CaptureSummary,
}

/// Owns capture state and orchestrates the source and the session
pub struct CaptureController {
    /// Current capture state
    state: CaptureState,

    /// Active source while capturing
    source: Option<Box<dyn CaptureSource>>,

    /// Current cycle's chunk log, shared with the sink closure
    session: Arc<ParkingMutex<Option<RecordingSession>>>,

    /// Sink gate; closed once a stop has completed so stragglers from
    /// a dead stream are discarded
    accepting: Arc<AtomicBool>,

    /// Artifact from the most recent successful conversion
    artifact: Option<Artifact>,

    /// Most recent cycle-scoped error message
    last_error: Option<String>,

    /// Conversions still in flight
    transcodes_in_flight: usize,
}

impl CaptureController {
    /// Create an idle controller
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            source: None,
            session: Arc::new(ParkingMutex::new(None)),
            accepting: Arc::new(AtomicBool::new(false)),
            artifact: None,
            last_error: None,
            transcodes_in_flight: 0,
        }
    }

    /// Current capture state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Completed artifact, if any
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Build the sink handed to the source. Appends run on the
    /// source's reader thread, serialized by the session lock.
    fn chunk_sink(&self) -> ChunkSink {
        let session = Arc::clone(&self.session);
        let accepting = Arc::clone(&self.accepting);
        Box::new(move |chunk: Vec<u8>| {
            if !accepting.load(Ordering::SeqCst) {
                tracing::debug!("Discarding {} bytes arriving after stop", chunk.len());
                return;
            }
            if let Some(session) = session.lock().as_mut() {
                session.append_chunk(chunk);
            }
        })
    }

    /// Start a capture cycle.
    ///
    /// Called while already capturing this is a no-op; the running
    /// cycle continues. A source that fails preflight (no camera, no
    /// ffmpeg) surfaces as a user-visible error and leaves the
    /// controller idle with the previous session intact.
    pub async fn start(
        &mut self,
        mut source: Box<dyn CaptureSource>,
        config: CaptureConfig,
    ) -> Result<CaptureSnapshot, CaptureError> {
        if self.state == CaptureState::Capturing {
            tracing::debug!("Start ignored, already capturing");
            return Ok(self.snapshot());
        }

        if let Err(e) = source.initialize(&config).await {
            tracing::warn!("Capture source '{}' failed preflight: {}", source.id(), e);
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        // A fresh session replaces the previous cycle's log; nothing
        // recorded earlier can leak into this cycle
        let session = RecordingSession::new();
        let session_id = session.id;
        *self.session.lock() = Some(session);
        self.last_error = None;
        self.accepting.store(true, Ordering::SeqCst);

        if let Err(e) = source.start(self.chunk_sink()).await {
            tracing::error!("Capture source '{}' failed to start: {}", source.id(), e);
            self.accepting.store(false, Ordering::SeqCst);
            if let Some(session) = self.session.lock().as_mut() {
                session.end();
            }
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.state = CaptureState::Capturing;
        self.source = Some(source);

        tracing::info!("Capture started (session {})", session_id);
        Ok(self.snapshot())
    }

    /// Stop the current capture cycle.
    ///
    /// Flips to Idle immediately; the returned job is converted by the
    /// caller after this returns. The source's shutdown flush still
    /// lands in the open gate, so the tail of the stream is part of
    /// the job; only chunks arriving after that are discarded. Called
    /// while idle this is a no-op returning no job.
    pub async fn stop(&mut self) -> Result<Option<TranscodeJob>, CaptureError> {
        if self.state == CaptureState::Idle {
            tracing::debug!("Stop ignored, not capturing");
            return Ok(None);
        }

        self.state = CaptureState::Idle;

        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop().await {
                // The cycle is over either way; convert what arrived
                tracing::warn!("Capture source stop reported: {}", e);
            }
        }

        self.accepting.store(false, Ordering::SeqCst);

        let job = {
            let mut guard = self.session.lock();
            guard.as_mut().map(|session| {
                session.end();
                TranscodeJob {
                    input: session.concatenate(),
                    from: MediaContainer::Webm,
                    to: MediaContainer::Mp4,
                    summary: CaptureSummary {
                        session_id: session.id,
                        chunk_count: session.chunk_count(),
                        byte_len: session.byte_len(),
                        duration_ms: session.elapsed_ms(),
                    },
                }
            })
        };

        if let Some(job) = &job {
            self.transcodes_in_flight += 1;
            tracing::info!(
                "Capture stopped: session {}, {} chunks, {} bytes",
                job.summary.session_id,
                job.summary.chunk_count,
                job.summary.byte_len
            );
        }

        Ok(job)
    }

    /// Install a completed artifact. The latest conversion to resolve
    /// wins the artifact slot.
    pub fn install_artifact(&mut self, artifact: Artifact) {
        self.transcodes_in_flight = self.transcodes_in_flight.saturating_sub(1);
        tracing::info!(
            "Artifact ready: session {}, {} bytes of {}",
            artifact.session_id,
            artifact.bytes.len(),
            artifact.media_type.mime()
        );
        self.artifact = Some(artifact);
    }

    /// Record a failed conversion. State and the stopped session are
    /// left untouched so the user can record again.
    pub fn record_transcode_error(&mut self, message: String) {
        self.transcodes_in_flight = self.transcodes_in_flight.saturating_sub(1);
        tracing::error!("Conversion failed: {}", message);
        self.last_error = Some(message);
    }

    /// Point-in-time view for the UI. No side effects; identical
    /// controller state yields identical snapshots.
    pub fn snapshot(&self) -> CaptureSnapshot {
        let elapsed_ms = self
            .session
            .lock()
            .as_ref()
            .map(RecordingSession::elapsed_ms)
            .unwrap_or(0);

        CaptureSnapshot {
            state: self.state,
            elapsed_ms,
            transcoding: self.transcodes_in_flight > 0,
            artifact: self.artifact.as_ref().map(Artifact::info),
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::CaptureResult;
    use async_trait::async_trait;
    use uuid::Uuid;

    type SinkSlot = Arc<ParkingMutex<Option<ChunkSink>>>;

    /// Source double: hands its sink back to the test through the
    /// shared slot so chunks can be pushed by hand.
    struct ScriptedSource {
        sink_slot: SinkSlot,
        live: bool,
        fail_initialize: bool,
        fail_start: bool,
    }

    impl ScriptedSource {
        fn new(sink_slot: SinkSlot) -> Self {
            Self {
                sink_slot,
                live: false,
                fail_initialize: false,
                fail_start: false,
            }
        }

        fn failing(sink_slot: SinkSlot) -> Self {
            Self {
                fail_initialize: true,
                ..Self::new(sink_slot)
            }
        }

        fn failing_start(sink_slot: SinkSlot) -> Self {
            Self {
                fail_start: true,
                ..Self::new(sink_slot)
            }
        }
    }

    #[async_trait]
    impl CaptureSource for ScriptedSource {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn initialize(&mut self, _config: &CaptureConfig) -> CaptureResult<()> {
            if self.fail_initialize {
                return Err(CaptureError::DeviceNotFound("No cameras found".to_string()));
            }
            Ok(())
        }

        async fn start(&mut self, sink: ChunkSink) -> CaptureResult<()> {
            if self.fail_start {
                return Err(CaptureError::Stream("camera disappeared".to_string()));
            }
            *self.sink_slot.lock() = Some(sink);
            self.live = true;
            Ok(())
        }

        async fn stop(&mut self) -> CaptureResult<()> {
            self.live = false;
            Ok(())
        }

        fn is_live(&self) -> bool {
            self.live
        }
    }

    fn push(slot: &SinkSlot, chunk: Vec<u8>) {
        let guard = slot.lock();
        let sink = guard.as_ref().expect("sink installed");
        sink(chunk);
    }

    async fn started_controller() -> (CaptureController, SinkSlot) {
        let slot: SinkSlot = Arc::new(ParkingMutex::new(None));
        let mut controller = CaptureController::new();
        controller
            .start(
                Box::new(ScriptedSource::new(slot.clone())),
                CaptureConfig::default(),
            )
            .await
            .expect("start");
        (controller, slot)
    }

    #[tokio::test]
    async fn test_full_cycle_concatenates_in_arrival_order() {
        let (mut controller, slot) = started_controller().await;
        assert_eq!(controller.state(), CaptureState::Capturing);

        push(&slot, vec![1, 2]);
        push(&slot, vec![3]);
        push(&slot, vec![4, 5, 6]);

        let job = controller.stop().await.expect("stop").expect("job");
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(job.input, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(job.from, MediaContainer::Webm);
        assert_eq!(job.to, MediaContainer::Mp4);

        // The conversion has not resolved yet, only been handed over
        assert!(controller.snapshot().transcoding);
    }

    #[tokio::test]
    async fn test_zero_length_chunks_never_reach_the_input() {
        let (mut controller, slot) = started_controller().await;

        push(&slot, vec![0xAA; 10]);
        push(&slot, Vec::new());
        push(&slot, vec![0xBB; 20]);

        let job = controller.stop().await.expect("stop").expect("job");
        assert_eq!(job.input.len(), 30);
        assert_eq!(job.summary.chunk_count, 2);
        assert_eq!(job.summary.byte_len, 30);
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_capturing_is_a_noop() {
        let (mut controller, slot) = started_controller().await;
        push(&slot, vec![9; 5]);

        // The second source must never be started or wired in
        let second_slot: SinkSlot = Arc::new(ParkingMutex::new(None));
        let snapshot = controller
            .start(
                Box::new(ScriptedSource::new(second_slot.clone())),
                CaptureConfig::default(),
            )
            .await
            .expect("second start");
        assert_eq!(snapshot.state, CaptureState::Capturing);
        assert!(second_slot.lock().is_none());

        // The running session kept its chunks
        let job = controller.stop().await.expect("stop").expect("job");
        assert_eq!(job.input, vec![9; 5]);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_a_noop() {
        let mut controller = CaptureController::new();
        assert!(controller.stop().await.expect("stop").is_none());
        assert_eq!(controller.state(), CaptureState::Idle);
        assert!(!controller.snapshot().transcoding);
    }

    #[tokio::test]
    async fn test_chunks_arriving_after_stop_are_discarded() {
        let (mut controller, slot) = started_controller().await;

        push(&slot, vec![1; 8]);
        let job = controller.stop().await.expect("stop").expect("job");
        assert_eq!(job.summary.byte_len, 8);

        // A straggler from the dead stream hits the closed gate
        push(&slot, vec![2; 16]);
        let retained = controller.session.lock().as_ref().map(|s| s.byte_len());
        assert_eq!(retained, Some(8));
    }

    #[tokio::test]
    async fn test_second_cycle_replaces_the_first_without_leaking() {
        let (mut controller, slot) = started_controller().await;
        push(&slot, vec![1; 10]);
        let first = controller.stop().await.expect("stop").expect("job");

        let second_slot: SinkSlot = Arc::new(ParkingMutex::new(None));
        controller
            .start(
                Box::new(ScriptedSource::new(second_slot.clone())),
                CaptureConfig::default(),
            )
            .await
            .expect("restart");
        push(&second_slot, vec![2; 5]);
        let second = controller.stop().await.expect("stop").expect("job");

        assert_ne!(first.summary.session_id, second.summary.session_id);
        assert_eq!(second.input, vec![2; 5]);
        assert_eq!(second.summary.chunk_count, 1);
    }

    #[tokio::test]
    async fn test_stop_with_no_chunks_hands_over_empty_input() {
        let (mut controller, _slot) = started_controller().await;

        let job = controller.stop().await.expect("stop").expect("job");
        assert!(job.input.is_empty());
        assert_eq!(job.summary.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_missing_camera_fails_start_with_visible_error() {
        let slot: SinkSlot = Arc::new(ParkingMutex::new(None));
        let mut controller = CaptureController::new();

        let result = controller
            .start(
                Box::new(ScriptedSource::failing(slot)),
                CaptureConfig::default(),
            )
            .await;

        assert!(matches!(result, Err(CaptureError::DeviceNotFound(_))));
        assert_eq!(controller.state(), CaptureState::Idle);

        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("no camera available: No cameras found")
        );
    }

    #[tokio::test]
    async fn test_stream_failure_during_start_leaves_controller_recoverable() {
        let slot: SinkSlot = Arc::new(ParkingMutex::new(None));
        let mut controller = CaptureController::new();

        let result = controller
            .start(
                Box::new(ScriptedSource::failing_start(slot.clone())),
                CaptureConfig::default(),
            )
            .await;

        assert!(matches!(result, Err(CaptureError::Stream(_))));
        assert_eq!(controller.state(), CaptureState::Idle);
        assert!(slot.lock().is_none());

        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("capture stream failed: camera disappeared")
        );

        // The next attempt is not poisoned
        let second: SinkSlot = Arc::new(ParkingMutex::new(None));
        controller
            .start(
                Box::new(ScriptedSource::new(second.clone())),
                CaptureConfig::default(),
            )
            .await
            .expect("retry");
        assert_eq!(controller.state(), CaptureState::Capturing);
        push(&second, vec![7; 3]);
        let job = controller.stop().await.expect("stop").expect("job");
        assert_eq!(job.input, vec![7; 3]);
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_state_and_session() {
        let (mut controller, slot) = started_controller().await;
        push(&slot, vec![3; 12]);
        controller.stop().await.expect("stop").expect("job");

        controller.record_transcode_error("FFmpeg error: boom".to_string());

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, CaptureState::Idle);
        assert_eq!(snapshot.last_error.as_deref(), Some("FFmpeg error: boom"));
        assert!(!snapshot.transcoding);
        assert!(snapshot.artifact.is_none());

        // The recording stays put for another attempt
        let retained = controller.session.lock().as_ref().map(|s| s.byte_len());
        assert_eq!(retained, Some(12));
    }

    #[tokio::test]
    async fn test_latest_artifact_wins() {
        let mut controller = CaptureController::new();

        controller.install_artifact(Artifact::new(
            Uuid::new_v4(),
            vec![0; 10],
            MediaContainer::Mp4,
        ));
        let second_id = Uuid::new_v4();
        controller.install_artifact(Artifact::new(second_id, vec![0; 99], MediaContainer::Mp4));

        let info = controller.snapshot().artifact.expect("artifact");
        assert_eq!(info.session_id, second_id);
        assert_eq!(info.byte_len, 99);
        assert_eq!(info.mime, "video/mp4");
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_for_identical_state() {
        let mut controller = CaptureController::new();
        controller.install_artifact(Artifact::new(
            Uuid::new_v4(),
            vec![1; 5],
            MediaContainer::Mp4,
        ));

        let a = controller.snapshot();
        let b = controller.snapshot();
        assert_eq!(a.state, b.state);
        assert_eq!(a.elapsed_ms, b.elapsed_ms);
        assert_eq!(a.transcoding, b.transcoding);
        assert_eq!(a.last_error, b.last_error);
        assert_eq!(
            a.artifact.map(|i| (i.session_id, i.byte_len)),
            b.artifact.map(|i| (i.session_id, i.byte_len))
        );
    }
}
