use crate::config::Config;
use crate::detection_loop::FrameAnalyzer;
use facewatch_core::identities::IdentityError;
use facewatch_core::loader::{self, HttpFetcher, LoaderError, SkippedIdentity};
use facewatch_core::pipeline::{DetectorKind, Pipeline, PipelineError, PipelineSummary};
use facewatch_core::settings::MIN_CONFIDENCE;
use facewatch_core::{FaceDetector, FaceRecognizer, IdentityStore, PersonDetector, RecognizedFace};
use facewatch_hw::{Camera, CameraInfo, Frame};
use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facewatch_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] facewatch_core::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] facewatch_core::recognizer::RecognizerError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("identity file: {0}")]
    Identity(#[from] IdentityError),
    #[error("reference loader: {0}")]
    Loader(#[from] LoaderError),
    #[error("cannot start: {0}")]
    Unavailable(String),
    #[error("camera is not open")]
    CameraClosed,
    #[error("frame too dark")]
    DarkFrame,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One analyzed frame: the grayscale pixels the overlay is drawn on, and
/// every face the pipeline returned (unfiltered).
pub struct FrameReport {
    pub frame: Frame,
    pub faces: Vec<RecognizedFace>,
}

/// What the engine loaded at startup.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub pipeline: Option<PipelineSummary>,
    /// Why the pipeline could not be built, when it could not.
    pub unavailable: Option<String>,
    pub identities: IdentityStore,
    pub skipped: Vec<SkippedIdentity>,
    pub camera: Option<CameraInfo>,
}

/// Messages sent from the detection loop and D-Bus handlers to the engine thread.
enum EngineRequest {
    Open {
        reply: oneshot::Sender<Result<CameraInfo, EngineError>>,
    },
    Analyze {
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Info {
        reply: oneshot::Sender<EngineInfo>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Loaded pipeline, identities and camera state.
    pub async fn info(&self) -> Result<EngineInfo, EngineError> {
        self.request(|reply| EngineRequest::Info { reply }).await
    }
}

impl FrameAnalyzer for EngineHandle {
    fn open(&self) -> impl Future<Output = Result<CameraInfo, EngineError>> + Send {
        async move { self.request(|reply| EngineRequest::Open { reply }).await? }
    }

    fn analyze(&self) -> impl Future<Output = Result<FrameReport, EngineError>> + Send {
        async move { self.request(|reply| EngineRequest::Analyze { reply }).await? }
    }

    fn close(&self) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(e) = self.request(|reply| EngineRequest::Close { reply }).await {
                tracing::warn!(error = %e, "camera close request failed");
            }
        }
    }
}

/// The pipeline plus the reference data it was built from.
struct Loaded {
    pipeline: Pipeline,
    identities: IdentityStore,
    skipped: Vec<SkippedIdentity>,
}

/// Engine-thread state. The camera is only open while the loop runs.
struct Engine {
    config: Config,
    backend: Result<Loaded, String>,
    camera: Option<Camera>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread loads the models and reference descriptors before serving
/// requests, so early requests simply queue behind the load. A load failure
/// does not stop the daemon: the engine keeps answering and every `Open`
/// reports the reason.
pub fn spawn_engine(config: Config) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let backend = load_backend(&config).map_err(|e| {
                tracing::error!(error = %e, "pipeline unavailable; start requests will fail");
                e.to_string()
            });
            let mut engine = Engine {
                config,
                backend,
                camera: None,
            };

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Open { reply } => {
                        let _ = reply.send(engine.open());
                    }
                    EngineRequest::Analyze { reply } => {
                        let _ = reply.send(engine.analyze());
                    }
                    EngineRequest::Close { reply } => {
                        engine.close();
                        let _ = reply.send(());
                    }
                    EngineRequest::Info { reply } => {
                        let _ = reply.send(engine.info());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Load the configured detector and, in face mode, the recognizer and the
/// reference descriptors.
fn load_backend(config: &Config) -> Result<Loaded, EngineError> {
    match config.detector {
        DetectorKind::Person => {
            let path = config.person_model_path();
            let detector = PersonDetector::load(&path)?;
            tracing::info!(path = %path, "person detector loaded");
            Ok(Loaded {
                pipeline: Pipeline::Detection {
                    kind: DetectorKind::Person,
                    detector: Box::new(detector),
                },
                identities: IdentityStore::default(),
                skipped: Vec::new(),
            })
        }
        DetectorKind::Face => {
            let path = config.scrfd_model_path();
            let mut detector = FaceDetector::load(&path)?.with_score_threshold(MIN_CONFIDENCE);
            tracing::info!(path = %path, "SCRFD detector loaded");

            let identities = if config.identities_path.exists() {
                IdentityStore::load(&config.identities_path)?
            } else {
                tracing::info!(path = %config.identities_path.display(), "no identity file; detection only");
                IdentityStore::default()
            };

            if identities.is_empty() {
                return Ok(Loaded {
                    pipeline: Pipeline::Detection {
                        kind: DetectorKind::Face,
                        detector: Box::new(detector),
                    },
                    identities,
                    skipped: Vec::new(),
                });
            }

            let path = config.arcface_model_path();
            let mut recognizer = FaceRecognizer::load(&path)?;
            tracing::info!(path = %path, "ArcFace recognizer loaded");

            let fetcher = HttpFetcher::new(config.fetch_timeout)?;
            let report = loader::load_descriptors(&identities, &fetcher, &mut detector, &mut recognizer);
            tracing::info!(
                loaded = report.descriptors.len(),
                skipped = report.skipped.len(),
                "reference descriptors ready"
            );

            let pipeline = Pipeline::from_descriptors(
                Box::new(detector),
                Box::new(recognizer),
                report.descriptors,
                identities.clone(),
                config.match_threshold,
            );
            Ok(Loaded {
                pipeline,
                identities,
                skipped: report.skipped,
            })
        }
    }
}

impl Engine {
    fn loaded(&mut self) -> Result<&mut Loaded, EngineError> {
        self.backend
            .as_mut()
            .map_err(|reason| EngineError::Unavailable(reason.clone()))
    }

    /// Open the camera and discard warmup frames for AGC/AE settling.
    fn open(&mut self) -> Result<CameraInfo, EngineError> {
        self.loaded()?;
        if let Some(camera) = &self.camera {
            return Ok(camera.info());
        }

        let camera = Camera::open(&self.config.camera_device)?;
        let warmup = self.config.warmup_frames;
        tracing::debug!(count = warmup, "discarding warmup frames");
        if let Err(e) = camera.discard_frames(warmup) {
            tracing::debug!(error = %e, "warmup capture failed");
        }

        let info = camera.info();
        tracing::info!(device = %info.device, width = info.width, height = info.height, "camera ready");
        self.camera = Some(camera);
        Ok(info)
    }

    /// Capture one frame and run the pipeline on it.
    fn analyze(&mut self) -> Result<FrameReport, EngineError> {
        let frame = self
            .camera
            .as_ref()
            .ok_or(EngineError::CameraClosed)?
            .capture_frame()?;
        if frame.is_dark {
            return Err(EngineError::DarkFrame);
        }

        let enhance = self.config.enhance_contrast;
        let loaded = self.loaded()?;
        let faces = if enhance {
            loaded.pipeline.analyze(&frame.enhanced(), frame.width, frame.height)?
        } else {
            loaded.pipeline.analyze(&frame.data, frame.width, frame.height)?
        };
        tracing::debug!(seq = frame.sequence, faces = faces.len(), "frame analyzed");

        Ok(FrameReport { frame, faces })
    }

    fn close(&mut self) {
        if let Some(camera) = self.camera.take() {
            tracing::info!(device = %camera.device_path, "camera released");
        }
    }

    fn info(&self) -> EngineInfo {
        let camera = self.camera.as_ref().map(Camera::info);
        match &self.backend {
            Ok(loaded) => EngineInfo {
                pipeline: Some(loaded.pipeline.summary()),
                unavailable: None,
                identities: loaded.identities.clone(),
                skipped: loaded.skipped.clone(),
                camera,
            },
            Err(reason) => EngineInfo {
                pipeline: None,
                unavailable: Some(reason.clone()),
                identities: IdentityStore::default(),
                skipped: Vec::new(),
                camera,
            },
        }
    }
}
