//! The live detection loop.
//!
//! Idle until `start`. While running, one scheduler task waits an interval,
//! asks the engine for an analyzed frame, and applies the result. The next
//! wait begins only after the previous attempt settled, so engine calls never
//! overlap. Each `start` bumps a generation counter; results carrying an older
//! generation are dropped when they resolve.

use crate::engine::{EngineError, FrameReport};
use chrono::Utc;
use facewatch_core::history::{DetectionHistory, HistoryEntry};
use facewatch_core::overlay::{self, OverlayStyle};
use facewatch_core::settings::ThresholdError;
use facewatch_core::types::filter_by_score;
use facewatch_core::{AlertDispatcher, ConfidenceThreshold, RecognizedFace, Speaker};
use facewatch_hw::CameraInfo;
use image::RgbImage;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// The loop's view of the engine.
pub trait FrameAnalyzer: Send + Sync + 'static {
    /// Open the camera; resolves with its native resolution.
    fn open(&self) -> impl Future<Output = Result<CameraInfo, EngineError>> + Send;
    /// Capture and analyze one frame.
    fn analyze(&self) -> impl Future<Output = Result<FrameReport, EngineError>> + Send;
    /// Release the camera.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Settings fixed for the lifetime of the loop.
pub struct LoopOptions {
    pub interval: Duration,
    pub threshold: ConfidenceThreshold,
    pub alerts: AlertDispatcher,
    pub style: OverlayStyle,
    pub overlay_path: Option<PathBuf>,
}

enum LoopState {
    Idle,
    Running {
        generation: u64,
        camera: CameraInfo,
        stop_tx: watch::Sender<bool>,
    },
}

struct Shared {
    state: LoopState,
    generation: u64,
    /// Everything the last applied cycle returned, before threshold filtering.
    faces: Vec<RecognizedFace>,
    history: DetectionHistory,
    alerts: AlertDispatcher,
    threshold: ConfidenceThreshold,
    overlay: Option<RgbImage>,
    cycles: u64,
}

impl Shared {
    fn current_generation(&self) -> Option<u64> {
        match &self.state {
            LoopState::Running { generation, .. } => Some(*generation),
            LoopState::Idle => None,
        }
    }

    fn visible_faces(&self) -> Vec<RecognizedFace> {
        filter_by_score(&self.faces, self.threshold.value())
    }
}

struct Inner<A> {
    analyzer: A,
    speaker: Arc<dyn Speaker>,
    interval: Duration,
    style: OverlayStyle,
    overlay_path: Option<PathBuf>,
    /// Serializes `start` and `stop`; never held by queries or the scheduler.
    transition: Mutex<()>,
    shared: Mutex<Shared>,
}

/// Snapshot of the loop for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub running: bool,
    pub generation: u64,
    pub camera: Option<CameraInfo>,
    pub muted: bool,
    pub confidence_threshold: ConfidenceThreshold,
    pub interval_ms: u64,
    pub visible_faces: usize,
    pub history_len: usize,
    pub cycles: u64,
}

/// Clone-safe handle to the detection loop.
pub struct DetectionLoop<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for DetectionLoop<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: FrameAnalyzer> DetectionLoop<A> {
    pub fn new(analyzer: A, options: LoopOptions, speaker: Arc<dyn Speaker>) -> Self {
        let shared = Shared {
            state: LoopState::Idle,
            generation: 0,
            faces: Vec::new(),
            history: DetectionHistory::default(),
            alerts: options.alerts,
            threshold: options.threshold,
            overlay: None,
            cycles: 0,
        };
        Self {
            inner: Arc::new(Inner {
                analyzer,
                speaker,
                interval: options.interval,
                style: options.style,
                overlay_path: options.overlay_path,
                transition: Mutex::new(()),
                shared: Mutex::new(shared),
            }),
        }
    }

    /// Enter the running state. Already running: returns the open camera.
    /// On an open failure the loop stays idle.
    pub async fn start(&self) -> Result<CameraInfo, EngineError> {
        let _transition = self.inner.transition.lock().await;
        if let LoopState::Running { camera, .. } = &self.inner.shared.lock().await.state {
            return Ok(camera.clone());
        }

        // The open can wait behind model loading; queries stay answerable meanwhile.
        let camera = self.inner.analyzer.open().await?;
        let mut shared = self.inner.shared.lock().await;
        shared.generation += 1;
        let generation = shared.generation;
        let (stop_tx, stop_rx) = watch::channel(false);
        shared.state = LoopState::Running {
            generation,
            camera: camera.clone(),
            stop_tx,
        };
        drop(shared);

        tracing::info!(generation, width = camera.width, height = camera.height, "detection started");
        tokio::spawn(run_scheduler(Arc::clone(&self.inner), generation, stop_rx));
        Ok(camera)
    }

    /// Return to idle, clearing detections and the overlay. Returns false
    /// when the loop was already idle.
    pub async fn stop(&self) -> bool {
        let _transition = self.inner.transition.lock().await;
        let mut shared = self.inner.shared.lock().await;
        let LoopState::Running { generation, stop_tx, .. } = std::mem::replace(&mut shared.state, LoopState::Idle)
        else {
            return false;
        };
        let _ = stop_tx.send(true);
        shared.faces.clear();
        shared.overlay = None;
        drop(shared);

        self.inner.analyzer.close().await;
        tracing::info!(generation, "detection stopped");
        true
    }

    pub async fn set_muted(&self, muted: bool) {
        self.inner.shared.lock().await.alerts.set_muted(muted);
        tracing::info!(muted, "alerts muted state changed");
    }

    /// Validate, snap and apply a new confidence threshold.
    pub async fn set_threshold(&self, value: f32) -> Result<ConfidenceThreshold, ThresholdError> {
        let threshold = ConfidenceThreshold::new(value)?;
        self.inner.shared.lock().await.threshold = threshold;
        tracing::info!(threshold = threshold.value(), "confidence threshold changed");
        Ok(threshold)
    }

    pub async fn status(&self) -> LoopStatus {
        let shared = self.inner.shared.lock().await;
        let camera = match &shared.state {
            LoopState::Running { camera, .. } => Some(camera.clone()),
            LoopState::Idle => None,
        };
        LoopStatus {
            running: camera.is_some(),
            generation: shared.generation,
            camera,
            muted: shared.alerts.is_muted(),
            confidence_threshold: shared.threshold,
            interval_ms: self.inner.interval.as_millis() as u64,
            visible_faces: shared.visible_faces().len(),
            history_len: shared.history.len(),
            cycles: shared.cycles,
        }
    }

    /// Faces of the last cycle that pass the current threshold.
    pub async fn detections(&self) -> Vec<RecognizedFace> {
        self.inner.shared.lock().await.visible_faces()
    }

    /// Recorded cycles, newest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.shared.lock().await.history.entries().cloned().collect()
    }

    /// The last rendered overlay, if the loop is running and has drawn one.
    pub async fn snapshot(&self) -> Option<RgbImage> {
        self.inner.shared.lock().await.overlay.clone()
    }
}

async fn run_scheduler<A: FrameAnalyzer>(inner: Arc<Inner<A>>, generation: u64, mut stop_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = tokio::time::sleep(inner.interval) => {}
        }

        let outcome = inner.analyzer.analyze().await;
        if !inner.apply(generation, outcome).await {
            break;
        }
    }
    tracing::debug!(generation, "scheduler exited");
}

impl<A> Inner<A> {
    /// Apply one settled attempt. Returns false once `generation` is stale.
    async fn apply(&self, generation: u64, outcome: Result<FrameReport, EngineError>) -> bool {
        let mut shared = self.shared.lock().await;
        if shared.current_generation() != Some(generation) {
            tracing::debug!(generation, "discarding result from a stopped run");
            return false;
        }

        let report = match outcome {
            Ok(report) => report,
            Err(EngineError::DarkFrame) => {
                tracing::debug!("dark frame skipped");
                return true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "detection cycle failed");
                return true;
            }
        };

        shared.cycles += 1;
        shared.faces = report.faces;
        let visible = shared.visible_faces();

        let frame = &report.frame;
        let canvas = overlay::render(&frame.data, frame.width, frame.height, &visible, &self.style);
        let pending_write = self.overlay_path.clone().map(|path| (path, canvas.clone()));
        shared.overlay = Some(canvas);

        let announcements = shared.alerts.dispatch(&visible, tokio::time::Instant::now().into_std());
        shared.history.record(Utc::now(), &visible);
        drop(shared);

        tracing::debug!(generation, faces = visible.len(), alerts = announcements.len(), "cycle applied");
        for announcement in announcements {
            self.speaker.speak(&announcement.phrase);
        }
        if let Some((path, canvas)) = pending_write {
            write_overlay(path, canvas).await;
        }
        true
    }
}

/// PNG encoding and the file write run on the blocking pool.
async fn write_overlay(path: PathBuf, canvas: RgbImage) {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || canvas.save(&path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(path = %shown, error = %e, "failed to write overlay"),
        Err(e) => tracing::warn!(path = %shown, error = %e, "overlay writer task failed"),
    }
}
