//! Webcam capture using nokhwa
//!
//! Frames are pulled from the camera on a dedicated thread and piped
//! into an ffmpeg child that muxes a WEBM stream onto its stdout. A
//! reader thread hands the stream back to the controller as ordered
//! chunks.

use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as CameraResolution,
};
use nokhwa::Camera;
use parking_lot::Mutex as ParkingMutex;

use crate::capture::traits::{
    CameraInfo, CaptureError, CaptureResult, CaptureSource, ChunkSink, Resolution,
};
use crate::recorder::state::CaptureConfig;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                let name = info.human_name().to_string();

                // Common resolutions
                let resolutions = vec![
                    Resolution {
                        width: 1920,
                        height: 1080,
                    },
                    Resolution {
                        width: 1280,
                        height: 720,
                    },
                    Resolution {
                        width: 640,
                        height: 480,
                    },
                ];

                CameraInfo {
                    id,
                    name,
                    supported_resolutions: resolutions,
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Map nokhwa FrameFormat to FFmpeg pixel format string
fn ffmpeg_pixel_format(format: FrameFormat) -> &'static str {
    match format {
        FrameFormat::YUYV => "yuyv422",
        FrameFormat::NV12 => "nv12",
        FrameFormat::RAWRGB => "rgb24",
        FrameFormat::MJPEG => "mjpeg", // FFmpeg can decode MJPEG
        _ => {
            tracing::warn!("Unknown camera format {:?}, falling back to yuyv422", format);
            "yuyv422"
        }
    }
}

/// Build the FFmpeg argument list for the WEBM chunk muxer.
///
/// Frames come in on stdin, the muxed WEBM stream leaves on stdout.
/// MJPEG cameras deliver compressed frames, so those take the mjpeg
/// demuxer instead of rawvideo.
fn muxer_args(width: u32, height: u32, fps: u32, pixel_format: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if pixel_format == "mjpeg" {
        args.extend(["-f".into(), "mjpeg".into()]);
    } else {
        args.extend([
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            pixel_format.to_string(),
            "-video_size".into(),
            format!("{width}x{height}"),
        ]);
    }

    args.extend([
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        "-".into(), // Read frames from stdin
        "-an".into(), // Video only
        "-c:v".into(),
        "libvpx".into(), // VP8 in WEBM
        "-deadline".into(),
        "realtime".into(), // Keep encoding ahead of the camera
        "-cpu-used".into(),
        "8".into(),
        "-b:v".into(),
        "2M".into(),
        "-g".into(),
        (fps * 2).to_string(), // GOP size = 2 seconds
        "-f".into(),
        "webm".into(),
        "pipe:1".into(), // Stream the container to stdout
    ]);

    args
}

/// FFmpeg muxer turning raw camera frames into a WEBM byte stream
struct WebmChunkMuxer {
    process: ParkingMutex<Option<Child>>,
    frame_count: AtomicU64,
    running: AtomicBool,
}

impl WebmChunkMuxer {
    fn spawn(
        width: u32,
        height: u32,
        fps: u32,
        pixel_format: &str,
    ) -> Result<(Self, ChildStdout), std::io::Error> {
        let mut process = Command::new("ffmpeg")
            .args(muxer_args(width, height, fps, pixel_format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = process.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "muxer stdout not piped")
        })?;

        tracing::info!(
            "Started WEBM muxer: {}x{} @ {}fps, pixel_format={}",
            width,
            height,
            fps,
            pixel_format
        );

        Ok((
            Self {
                process: ParkingMutex::new(Some(process)),
                frame_count: AtomicU64::new(0),
                running: AtomicBool::new(true),
            },
            stdout,
        ))
    }

    fn write_frame(&self, data: &[u8]) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }

        let mut guard = self.process.lock();
        if let Some(ref mut process) = *guard {
            if let Some(ref mut stdin) = process.stdin {
                if stdin.write_all(data).is_ok() {
                    self.frame_count.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
            }
        }
        false
    }

    fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    fn finish(&self) -> Result<(), std::io::Error> {
        self.running.store(false, Ordering::Relaxed);
        let mut guard = self.process.lock();
        if let Some(mut process) = guard.take() {
            // Close stdin so the muxer flushes the container and exits
            drop(process.stdin.take());
            let output = process.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!("WEBM muxer exited with status {}: {}", output.status, stderr);
            }
        }

        tracing::info!("WEBM muxer finished after {} frames", self.frame_count());
        Ok(())
    }
}

/// Webcam capture source using nokhwa
pub struct WebcamSource {
    /// Source identifier
    id: String,

    /// Device ID/index to capture from (None = default camera)
    device_id: Option<String>,

    /// Requested capture width
    width: u32,

    /// Requested capture height
    height: u32,

    /// Capture FPS
    fps: u32,

    /// Whether currently producing chunks
    is_live: Arc<AtomicBool>,

    /// Capture thread handle
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl WebcamSource {
    /// Create a new webcam source; settings arrive at initialize time
    pub fn new() -> Self {
        Self {
            id: "webcam".to_string(),
            device_id: None,
            width: 1280,
            height: 720,
            fps: 30,
            is_live: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        }
    }

    /// Get camera index from device_id
    fn camera_index(&self) -> CameraIndex {
        match &self.device_id {
            Some(id) => {
                // Try to parse as integer first
                if let Ok(idx) = id.parse::<u32>() {
                    CameraIndex::Index(idx)
                } else {
                    CameraIndex::String(id.clone())
                }
            }
            None => CameraIndex::Index(0), // Default to first camera
        }
    }
}

impl Default for WebcamSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureSource for WebcamSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        // Check if FFmpeg is available
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return Err(CaptureError::ToolMissing(
                "FFmpeg not found. Please install FFmpeg: brew install ffmpeg".to_string(),
            ));
        }

        // Check if a camera is available
        let cameras = get_cameras();
        if cameras.is_empty() {
            return Err(CaptureError::DeviceNotFound("No cameras found".to_string()));
        }

        self.device_id = config.device_id.clone();
        self.width = config.width;
        self.height = config.height;
        self.fps = config.fps;

        tracing::info!(
            "Webcam source initialized ({}x{} @ {}fps requested)",
            self.width,
            self.height,
            self.fps
        );
        Ok(())
    }

    async fn start(&mut self, sink: ChunkSink) -> CaptureResult<()> {
        if self.is_live.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyLive);
        }

        self.is_live.store(true, Ordering::SeqCst);

        // Capture runs on a background thread. The muxer is created
        // inside the thread once the actual camera format is known;
        // the thread reports back once the stream is up so setup
        // failures surface to the caller instead of only to the log.
        let camera_index = self.camera_index();
        let is_live = self.is_live.clone();
        let requested_width = self.width;
        let requested_height = self.height;
        let requested_fps = self.fps;
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<CaptureResult<()>>();

        let handle = std::thread::spawn(move || {
            let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
                CameraFormat::new(
                    CameraResolution::new(requested_width, requested_height),
                    FrameFormat::YUYV,
                    requested_fps,
                ),
            ));

            let mut camera = match Camera::new(camera_index.clone(), format) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to open camera {:?}: {:?}", camera_index, e);
                    is_live.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(CaptureError::Stream(format!(
                        "could not open camera {camera_index:?}: {e}"
                    ))));
                    return;
                }
            };

            if let Err(e) = camera.open_stream() {
                tracing::error!("Failed to open camera stream: {:?}", e);
                is_live.store(false, Ordering::SeqCst);
                let _ = ready_tx.send(Err(CaptureError::Stream(format!(
                    "could not start camera stream: {e}"
                ))));
                return;
            }

            // The camera negotiates the final format; the muxer
            // geometry follows what it actually delivers.
            let camera_format = camera.camera_format();
            let actual_width = camera_format.resolution().width();
            let actual_height = camera_format.resolution().height();
            let actual_fps = camera_format.frame_rate();
            let frame_format = camera_format.format();
            let pix_fmt = ffmpeg_pixel_format(frame_format);

            tracing::info!(
                "Webcam opened: {}x{} @ {}fps, format={:?} -> ffmpeg pix_fmt={} (requested {}x{} @ {}fps)",
                actual_width,
                actual_height,
                actual_fps,
                frame_format,
                pix_fmt,
                requested_width,
                requested_height,
                requested_fps
            );

            let (muxer, stdout) =
                match WebmChunkMuxer::spawn(actual_width, actual_height, actual_fps, pix_fmt) {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!("Failed to start WEBM muxer: {:?}", e);
                        let _ = camera.stop_stream();
                        is_live.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(CaptureError::Io(e)));
                        return;
                    }
                };

            let _ = ready_tx.send(Ok(()));

            // One reader keeps delivery order identical to stream order
            let reader = std::thread::spawn(move || {
                let mut stdout = stdout;
                let mut buf = [0u8; 64 * 1024];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => sink(buf[..n].to_vec()),
                        Err(e) => {
                            tracing::debug!("Muxer stdout read failed: {:?}", e);
                            break;
                        }
                    }
                }
                tracing::debug!("Chunk reader finished");
            });

            let mut frame_count: u64 = 0;
            let capture_start = std::time::Instant::now();

            while is_live.load(Ordering::SeqCst) {
                // Blocks until the camera delivers the next frame; the
                // camera controls the timing
                match camera.frame() {
                    Ok(frame) => {
                        if !muxer.write_frame(frame.buffer()) {
                            tracing::warn!("WEBM muxer rejected frame, stopping capture loop");
                            break;
                        }
                        frame_count += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Failed to capture frame: {:?}", e);
                    }
                }
            }

            let elapsed = capture_start.elapsed();
            tracing::info!(
                "Webcam captured {} frames in {:.2}s",
                frame_count,
                elapsed.as_secs_f64()
            );

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }

            // Closing stdin flushes the container; the reader drains
            // the tail chunks before hitting EOF
            if let Err(e) = muxer.finish() {
                tracing::error!("Failed to finish WEBM muxer: {:?}", e);
            }

            let _ = reader.join();
            tracing::info!("Webcam capture thread stopped");
        });

        self.capture_thread = Some(handle);

        // Do not report a live capture before the stream is actually up
        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.is_live.store(false, Ordering::SeqCst);
                if let Some(handle) = self.capture_thread.take() {
                    let _ = handle.join();
                }
                return Err(e);
            }
            Err(_) => {
                self.is_live.store(false, Ordering::SeqCst);
                if let Some(handle) = self.capture_thread.take() {
                    let _ = handle.join();
                }
                return Err(CaptureError::Stream(
                    "capture thread exited before the stream came up".to_string(),
                ));
            }
        }

        tracing::info!(
            "Webcam capture started (requested {}x{} @ {}fps)",
            self.width,
            self.height,
            self.fps
        );
        Ok(())
    }

    async fn stop(&mut self) -> CaptureResult<()> {
        if !self.is_live.load(Ordering::SeqCst) {
            return Err(CaptureError::NotLive);
        }

        self.is_live.store(false, Ordering::SeqCst);

        // The capture thread finalizes the muxer and joins the reader,
        // so the tail of the stream reaches the sink before we return
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }

        tracing::info!("Webcam capture stopped");
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.is_live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(ffmpeg_pixel_format(FrameFormat::YUYV), "yuyv422");
        assert_eq!(ffmpeg_pixel_format(FrameFormat::NV12), "nv12");
        assert_eq!(ffmpeg_pixel_format(FrameFormat::RAWRGB), "rgb24");
        assert_eq!(ffmpeg_pixel_format(FrameFormat::MJPEG), "mjpeg");
    }

    #[test]
    fn test_muxer_args_rawvideo_input() {
        let args = muxer_args(1280, 720, 30, "yuyv422");
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-pixel_format" && w[1] == "yuyv422"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-video_size" && w[1] == "1280x720"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "webm"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_muxer_args_mjpeg_input() {
        let args = muxer_args(640, 480, 30, "mjpeg");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "mjpeg"));
        assert!(!args.iter().any(|a| a == "-video_size"));
        assert!(!args.iter().any(|a| a == "-pixel_format"));
    }

    #[test]
    fn test_muxer_args_video_only_with_gop() {
        let args = muxer_args(1920, 1080, 60, "nv12");
        assert!(args.iter().any(|a| a == "-an"));
        assert!(args.windows(2).any(|w| w[0] == "-g" && w[1] == "120"));
    }
}
