use crate::detection_loop::DetectionLoop;
use crate::engine::EngineHandle;
use serde::Serialize;
use zbus::interface;

pub const BUS_NAME: &str = "org.facewatch.Facewatch1";
pub const OBJECT_PATH: &str = "/org/facewatch/Facewatch1";

/// D-Bus interface for the facewatch daemon.
///
/// Bus name: org.facewatch.Facewatch1
/// Object path: /org/facewatch/Facewatch1
pub struct FacewatchService {
    detection: DetectionLoop<EngineHandle>,
    engine: EngineHandle,
}

impl FacewatchService {
    pub fn new(detection: DetectionLoop<EngineHandle>, engine: EngineHandle) -> Self {
        Self { detection, engine }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.facewatch.Facewatch1")]
impl FacewatchService {
    /// Start the detection loop. Returns the camera info as JSON.
    async fn start(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start requested");
        let camera = self.detection.start().await.map_err(|e| {
            tracing::warn!(error = %e, "start failed");
            failed(e)
        })?;
        to_json(&camera)
    }

    /// Stop the detection loop. Returns false if it was not running.
    async fn stop(&self) -> bool {
        tracing::info!("stop requested");
        self.detection.stop().await
    }

    async fn set_muted(&self, muted: bool) {
        self.detection.set_muted(muted).await;
    }

    /// Apply a confidence threshold; returns the snapped value.
    async fn set_confidence_threshold(&self, value: f64) -> zbus::fdo::Result<f64> {
        let threshold = self
            .detection
            .set_threshold(value as f32)
            .await
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        Ok(threshold.value() as f64)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.detection.status().await;
        let info = self.engine.info().await.map_err(failed)?;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "loop": status,
            "pipeline": info.pipeline,
            "unavailable": info.unavailable,
        }))
    }

    /// Visible faces from the latest cycle, as a JSON array.
    async fn detections(&self) -> zbus::fdo::Result<String> {
        to_json(&self.detection.detections().await)
    }

    /// Recent detection cycles, newest first, as a JSON array.
    async fn history(&self) -> zbus::fdo::Result<String> {
        to_json(&self.detection.history().await)
    }

    /// Reference identities and those skipped at load.
    async fn identities(&self) -> zbus::fdo::Result<String> {
        let info = self.engine.info().await.map_err(failed)?;
        to_json(&serde_json::json!({
            "identities": info.identities,
            "skipped": info.skipped,
        }))
    }

    /// Write the latest overlay as PNG. Returns false when there is none.
    async fn save_snapshot(&self, path: &str) -> zbus::fdo::Result<bool> {
        let Some(overlay) = self.detection.snapshot().await else {
            return Ok(false);
        };
        let path = path.to_string();
        tokio::task::spawn_blocking(move || overlay.save(&path).map(|_| path))
            .await
            .map_err(failed)?
            .map(|path| tracing::info!(%path, "snapshot saved"))
            .map_err(failed)?;
        Ok(true)
    }
}
