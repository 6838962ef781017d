use anyhow::Result;
use facewatch_core::overlay::OverlayStyle;
use facewatch_core::{AlertDispatcher, ConfidenceThreshold};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod detection_loop;
mod engine;
mod speech;

use detection_loop::{DetectionLoop, LoopOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.camera_device,
        detector = ?config.detector,
        "facewatchd starting"
    );

    let engine = engine::spawn_engine(config.clone())?;

    let threshold = ConfidenceThreshold::new(config.confidence).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid FACEWATCH_CONFIDENCE; using default");
        ConfidenceThreshold::default()
    });
    let mut alerts =
        AlertDispatcher::new(config.alert_cooldown).with_distinguished(config.distinguished_id.clone());
    alerts.set_muted(config.muted);
    let font = config.font_path.as_deref().and_then(load_font);

    let options = LoopOptions {
        interval: config.detection_interval,
        threshold,
        alerts,
        style: OverlayStyle::new(font, config.distinguished_id.clone()),
        overlay_path: config.overlay_path.clone(),
    };
    let speaker = Arc::new(speech::SpeechQueue::spawn(&config.speech_command));
    let detection = DetectionLoop::new(engine.clone(), options, speaker);

    let service = dbus_interface::FacewatchService::new(detection.clone(), engine);
    let _connection = zbus::connection::Builder::session()?
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = dbus_interface::BUS_NAME, "facewatchd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facewatchd shutting down");
    detection.stop().await;

    Ok(())
}

/// Overlay labels need a TrueType font; without one only bars are drawn.
fn load_font(path: &Path) -> Option<ab_glyph::FontArc> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read overlay font");
            return None;
        }
    };
    match ab_glyph::FontArc::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid overlay font");
            None
        }
    }
}
