//! FFmpeg-backed conversion engine
//!
//! The engine is constructed lazily, owns a private workspace
//! directory for staging conversion jobs, and is torn down explicitly
//! when the app exits. Each conversion stages its input in a job
//! directory, runs the fixed FFmpeg job, and reads the output back.

use std::path::Path;

use tempfile::TempDir;
use uuid::Uuid;

use crate::transcode::types::{MediaContainer, TranscodeError};

/// Fixed conversion arguments.
///
/// The product exposes no quality or codec options; every conversion
/// runs the same WEBM to MP4 job.
fn conversion_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(), // Overwrite output
        "-i".into(),
        input.display().to_string(),
        "-c:v".into(),
        "libx264".into(), // H.264 codec
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "23".into(),
        "-pix_fmt".into(),
        "yuv420p".into(), // Required for broad player compatibility
        "-movflags".into(),
        "+faststart".into(), // Move moov atom to start for streaming
        output.display().to_string(),
    ]
}

/// Conversion engine over the system FFmpeg
pub struct TranscodeEngine {
    /// Private staging area for conversion jobs
    workspace: TempDir,
}

impl TranscodeEngine {
    /// One-time setup: probe FFmpeg and open the workspace.
    ///
    /// Must complete before the first conversion; the command layer
    /// awaits this lazily on first use.
    pub async fn load() -> Result<Self, TranscodeError> {
        let probe = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| TranscodeError::EngineMissing(format!("ffmpeg not found on PATH: {e}")))?;

        if !probe.status.success() {
            return Err(TranscodeError::EngineMissing(format!(
                "ffmpeg -version exited with {}",
                probe.status
            )));
        }

        let workspace = tempfile::Builder::new()
            .prefix("camclip-engine-")
            .tempdir()?;

        tracing::info!(
            "Transcode engine loaded, workspace at {}",
            workspace.path().display()
        );

        Ok(Self { workspace })
    }

    /// Convert `input` bytes from one container to another.
    ///
    /// Empty input is rejected before FFmpeg is touched; there is
    /// nothing a conversion could produce from it.
    pub async fn convert(
        &self,
        input: &[u8],
        from: MediaContainer,
        to: MediaContainer,
    ) -> Result<Vec<u8>, TranscodeError> {
        if input.is_empty() {
            return Err(TranscodeError::EmptyInput);
        }

        let job_dir = self.workspace.path().join(format!("job-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&job_dir).await?;

        let input_path = job_dir.join(format!("input.{}", from.extension()));
        let output_path = job_dir.join(format!("output.{}", to.extension()));
        tokio::fs::write(&input_path, input).await?;

        tracing::info!(
            "Converting {} bytes from {} to {}",
            input.len(),
            from.extension(),
            to.extension()
        );

        let output = tokio::process::Command::new("ffmpeg")
            .args(conversion_args(&input_path, &output_path))
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!("FFmpeg conversion failed ({}): {}", output.status, stderr);
            Self::cleanup_job(&job_dir).await;
            return Err(TranscodeError::Engine(stderr));
        }

        let bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                Self::cleanup_job(&job_dir).await;
                return Err(TranscodeError::OutputMissing(
                    output_path.display().to_string(),
                ));
            }
        };

        Self::cleanup_job(&job_dir).await;

        tracing::info!("Conversion finished: {} bytes of {}", bytes.len(), to.mime());
        Ok(bytes)
    }

    /// Tear the engine down, removing the workspace
    pub fn teardown(self) {
        let path = self.workspace.path().to_path_buf();
        match self.workspace.close() {
            Ok(()) => tracing::info!("Transcode engine torn down, removed {}", path.display()),
            Err(e) => tracing::warn!(
                "Failed to remove engine workspace {}: {:?}",
                path.display(),
                e
            ),
        }
    }

    async fn cleanup_job(job_dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
            tracing::warn!("Failed to clean up job dir {}: {:?}", job_dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_args_fixed_job() {
        let input = Path::new("/tmp/work/input.webm");
        let output = Path::new("/tmp/work/output.mp4");
        let args = conversion_args(input, output);

        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1].ends_with("input.webm")));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-movflags" && w[1] == "+faststart"));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv420p"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/work/output.mp4"));
    }

    #[test]
    fn test_conversion_args_overwrite_before_input() {
        let args = conversion_args(Path::new("a.webm"), Path::new("b.mp4"));
        let y_pos = args.iter().position(|a| a == "-y");
        let i_pos = args.iter().position(|a| a == "-i");
        assert!(y_pos < i_pos);
    }

    #[tokio::test]
    async fn test_convert_rejects_empty_input() {
        let engine = TranscodeEngine {
            workspace: tempfile::tempdir().expect("tempdir"),
        };

        let result = engine
            .convert(&[], MediaContainer::Webm, MediaContainer::Mp4)
            .await;

        assert!(matches!(result, Err(TranscodeError::EmptyInput)));
    }
}
