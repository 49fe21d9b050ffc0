//! Acquisition collaborator boundary and the recording worker.
//!
//! The camera itself (pixel formats, vendor SDK, encoding) is an external
//! collaborator behind the narrow [`FrameSource`] trait. What lives here is
//! the part the folder lifecycle depends on: the frame loop that writes
//! frames into the open folder, the cooperative [`CancelToken`] checked at
//! each frame boundary, and the [`RunReport`] left behind in the folder so a
//! cancelled or failed run is visible after the fact.
//!
//! Cancellation keeps the partial frames on disk; a short recording is
//! tagged by its report, never deleted.

use crate::error::{AppResult, RecorderError};
use crate::folder::{AcquisitionParams, ExperimentFolder};
use crate::fsio;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// File name of the run report written after every recording attempt.
pub const REPORT_FILE: &str = "recording_report.json";

/// Cooperative cancellation signal for an in-flight recording.
///
/// Cloned into the recording worker, which checks it at each frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One captured frame of raw pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame index within the run.
    pub index: u64,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Encoded frame bytes as delivered by the camera pipeline.
    pub data: Vec<u8>,
}

/// Narrow interface to the camera pipeline.
///
/// Implementations own frame pacing: `next_frame` resolves when the next
/// frame is available at the configured rate.
#[async_trait]
pub trait FrameSource: Send {
    /// Apply a camera preset and the requested frame rate.
    async fn configure(&mut self, preset: Option<&Path>, fps: u32) -> AppResult<()>;

    /// Capture the next frame.
    async fn next_frame(&mut self) -> AppResult<Frame>;

    /// Release the camera.
    async fn stop(&mut self) -> AppResult<()>;
}

/// How a recording run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All requested frames were written.
    Complete,
    /// Cancelled cooperatively; partial frames kept.
    Cancelled,
    /// Frame source failed mid-run; partial frames kept.
    Failed,
}

/// Summary of a recording run, persisted next to the frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Outcome of the run.
    pub status: RunStatus,
    /// Frames actually written to disk.
    pub frames_written: u64,
    /// Frames the parameters asked for (`fps * duration`).
    pub frames_requested: u64,
    /// Wall-clock start of the run.
    pub started: DateTime<Utc>,
    /// Wall-clock end of the run.
    pub finished: DateTime<Utc>,
    /// Failure detail when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RunReport {
    /// True when the folder holds fewer frames than requested.
    pub fn is_short(&self) -> bool {
        self.frames_written < self.frames_requested
    }
}

/// Load the run report of a previous recording, if one exists.
pub fn load_report(folder: &ExperimentFolder) -> AppResult<Option<RunReport>> {
    match fsio::read_json(&folder.path().join(REPORT_FILE)) {
        Ok(report) => Ok(Some(report)),
        Err(RecorderError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// The recording loop: capture `fps * duration` frames into the folder root,
/// checking `token` at every frame boundary.
///
/// Always writes a [`RunReport`] before returning, whatever the outcome.
pub async fn run_recording(
    mut source: Box<dyn FrameSource>,
    folder: ExperimentFolder,
    params: AcquisitionParams,
    token: CancelToken,
) -> AppResult<RunReport> {
    let frames_requested = u64::from(params.fps) * u64::from(params.duration_secs);
    let started = Utc::now();
    let mut frames_written = 0u64;
    let mut status = RunStatus::Complete;
    let mut reason = None;

    log::info!(
        "Recording {} frames ({} fps, {} s) into {}",
        frames_requested,
        params.fps,
        params.duration_secs,
        folder.path().display()
    );

    while frames_written < frames_requested {
        if token.is_cancelled() {
            status = RunStatus::Cancelled;
            break;
        }
        match source.next_frame().await {
            Ok(frame) => {
                let name = format!("img_{:06}.jpg", frame.index);
                if let Err(e) = tokio::fs::write(folder.path().join(name), &frame.data).await {
                    log::warn!("Frame write failed after {frames_written} frames: {e}");
                    status = RunStatus::Failed;
                    reason = Some(e.to_string());
                    break;
                }
                frames_written += 1;
            }
            Err(e) => {
                log::warn!("Frame source failed after {frames_written} frames: {e}");
                status = RunStatus::Failed;
                reason = Some(e.to_string());
                break;
            }
        }
    }

    // The camera is released and the report written whatever the outcome.
    if let Err(e) = source.stop().await {
        log::warn!("Frame source did not stop cleanly: {e}");
    }

    let report = RunReport {
        status,
        frames_written,
        frames_requested,
        started,
        finished: Utc::now(),
        reason,
    };
    fsio::write_json_atomic(&folder.path().join(REPORT_FILE), &report)?;
    log::info!(
        "Recording finished: {:?}, {}/{} frames",
        report.status,
        report.frames_written,
        report.frames_requested
    );
    Ok(report)
}

/// Simulated camera for tests and dry runs: random pixel payloads at the
/// configured rate.
pub struct MockFrameSource {
    frame_bytes: usize,
    interval: Duration,
    index: u64,
    rng: StdRng,
}

impl MockFrameSource {
    /// Mock source producing frames of `frame_bytes` random bytes.
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            frame_bytes,
            interval: Duration::ZERO,
            index: 0,
            rng: StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn configure(&mut self, _preset: Option<&Path>, fps: u32) -> AppResult<()> {
        if fps == 0 {
            return Err(RecorderError::Acquisition("fps must be non-zero".into()));
        }
        self.interval = Duration::from_secs_f64(1.0 / f64::from(fps));
        Ok(())
    }

    async fn next_frame(&mut self) -> AppResult<Frame> {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        let mut data = vec![0u8; self.frame_bytes];
        self.rng.fill(data.as_mut_slice());
        let frame = Frame {
            index: self.index,
            timestamp: Utc::now(),
            data,
        };
        self.index += 1;
        Ok(frame)
    }

    async fn stop(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SubdirShape;

    fn test_params(fps: u32, duration_secs: u32) -> AcquisitionParams {
        AcquisitionParams { fps, duration_secs }
    }

    #[tokio::test]
    async fn test_complete_run_writes_all_frames_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let folder =
            ExperimentFolder::create(&dir.path().join("exp1"), SubdirShape::Arenas).unwrap();

        let mut source = MockFrameSource::new(16);
        source.configure(None, 1000).await.unwrap();
        // Interval of ~1 ms keeps the test fast but exercises pacing.
        let report = run_recording(
            Box::new(source),
            folder.clone(),
            test_params(5, 1),
            CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.frames_written, 5);
        assert!(!report.is_short());
        assert!(folder.path().join("img_000004.jpg").is_file());

        let loaded = load_report(&folder).unwrap().unwrap();
        assert_eq!(loaded.frames_written, 5);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_keeps_no_frames_but_reports() {
        let dir = tempfile::tempdir().unwrap();
        let folder =
            ExperimentFolder::create(&dir.path().join("exp1"), SubdirShape::Arenas).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let report = run_recording(
            Box::new(MockFrameSource::new(8)),
            folder.clone(),
            test_params(30, 60),
            token,
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.frames_written, 0);
        assert!(report.is_short());
        assert!(folder.path().join(REPORT_FILE).is_file());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_keeps_partial_frames() {
        let dir = tempfile::tempdir().unwrap();
        let folder =
            ExperimentFolder::create(&dir.path().join("exp1"), SubdirShape::Arenas).unwrap();

        let mut source = MockFrameSource::new(8);
        source.configure(None, 100).await.unwrap();
        let token = CancelToken::new();
        let worker = tokio::spawn(run_recording(
            Box::new(source),
            folder.clone(),
            test_params(100, 600),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();
        let report = worker.await.unwrap().unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(report.frames_written > 0);
        assert!(report.is_short());
        // Partial frames are kept, not deleted.
        assert!(folder.path().join("img_000000.jpg").is_file());
    }

    /// Camera that fails on capture and refuses to release.
    struct JammedCamera;

    #[async_trait]
    impl FrameSource for JammedCamera {
        async fn configure(&mut self, _preset: Option<&Path>, _fps: u32) -> AppResult<()> {
            Ok(())
        }

        async fn next_frame(&mut self) -> AppResult<Frame> {
            Err(RecorderError::Acquisition("sensor timeout".into()))
        }

        async fn stop(&mut self) -> AppResult<()> {
            Err(RecorderError::Acquisition("camera hung on release".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_capture_still_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let folder =
            ExperimentFolder::create(&dir.path().join("exp1"), SubdirShape::Arenas).unwrap();

        let report = run_recording(
            Box::new(JammedCamera),
            folder.clone(),
            test_params(30, 60),
            CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.frames_written, 0);
        assert_eq!(report.reason.as_deref(), Some("Acquisition error: sensor timeout"));
        assert!(folder.path().join(REPORT_FILE).is_file());
    }

    #[tokio::test]
    async fn test_report_written_even_when_stop_fails() {
        let dir = tempfile::tempdir().unwrap();
        let folder =
            ExperimentFolder::create(&dir.path().join("exp1"), SubdirShape::Arenas).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let report = run_recording(Box::new(JammedCamera), folder.clone(), test_params(30, 60), token)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        let loaded = load_report(&folder).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_zero_fps_rejected_by_configure() {
        let mut source = MockFrameSource::new(8);
        assert!(matches!(
            source.configure(None, 0).await,
            Err(RecorderError::Acquisition(_))
        ));
    }
}
