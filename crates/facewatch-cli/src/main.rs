use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facewatch_hw::Camera;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch live face detection CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the detection loop
    Start,
    /// Stop the detection loop
    Stop,
    /// Silence spoken alerts
    Mute,
    /// Re-enable spoken alerts
    Unmute,
    /// Set the confidence threshold (0.10–0.90, snapped to 0.05)
    Threshold {
        value: f64,
    },
    /// Show daemon status
    Status,
    /// Show faces from the latest detection cycle
    Faces,
    /// Show recent detection cycles
    History,
    /// List reference identities
    Identities,
    /// Save the current overlay as PNG
    Snapshot {
        path: PathBuf,
    },
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 10)]
        frames: usize,
        /// Write the first captured frame to this PNG
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.facewatch.Facewatch1",
    default_service = "org.facewatch.Facewatch1",
    default_path = "/org/facewatch/Facewatch1"
)]
trait Facewatch {
    fn start(&self) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<bool>;
    fn set_muted(&self, muted: bool) -> zbus::Result<()>;
    fn set_confidence_threshold(&self, value: f64) -> zbus::Result<f64>;
    fn status(&self) -> zbus::Result<String>;
    fn detections(&self) -> zbus::Result<String>;
    fn history(&self) -> zbus::Result<String>;
    fn identities(&self) -> zbus::Result<String>;
    fn save_snapshot(&self, path: &str) -> zbus::Result<bool>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Test { device, frames, save } = &cli.command {
        return run_camera_test(device, *frames, save.as_ref());
    }

    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = FacewatchProxy::new(&connection)
        .await
        .context("facewatchd is not reachable; is it running?")?;
    tracing::debug!(bus = "org.facewatch.Facewatch1", "connected to facewatchd");

    match cli.command {
        Commands::Start => {
            let camera: serde_json::Value = serde_json::from_str(&proxy.start().await?)?;
            println!(
                "Detection started on {} ({}x{})",
                camera["device"].as_str().unwrap_or("?"),
                camera["width"],
                camera["height"]
            );
        }
        Commands::Stop => {
            if proxy.stop().await? {
                println!("Detection stopped");
            } else {
                println!("Detection was not running");
            }
        }
        Commands::Mute => {
            proxy.set_muted(true).await?;
            println!("Alerts muted");
        }
        Commands::Unmute => {
            proxy.set_muted(false).await?;
            println!("Alerts unmuted");
        }
        Commands::Threshold { value } => {
            let applied = proxy.set_confidence_threshold(value).await?;
            println!("Confidence threshold: {applied:.2}");
        }
        Commands::Status => print_json(&proxy.status().await?)?,
        Commands::Faces => {
            let faces: Vec<serde_json::Value> = serde_json::from_str(&proxy.detections().await?)?;
            if faces.is_empty() {
                println!("No faces");
            }
            for face in &faces {
                print_face(face);
            }
        }
        Commands::History => {
            let entries: Vec<serde_json::Value> = serde_json::from_str(&proxy.history().await?)?;
            if entries.is_empty() {
                println!("No detections recorded");
            }
            for entry in &entries {
                println!("{}", entry["at"].as_str().unwrap_or("?"));
                for face in entry["faces"].as_array().into_iter().flatten() {
                    print!("  ");
                    print_face(face);
                }
            }
        }
        Commands::Identities => print_json(&proxy.identities().await?)?,
        Commands::Snapshot { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            let path_str = path.to_str().context("snapshot path is not valid UTF-8")?;
            if proxy.save_snapshot(path_str).await? {
                println!("Overlay saved to {}", path.display());
            } else {
                bail!("no overlay yet; start detection first");
            }
        }
        Commands::Test { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_face(face: &serde_json::Value) {
    let score = face["similarity"]
        .as_f64()
        .or_else(|| face["confidence"].as_f64())
        .unwrap_or(0.0);
    let bbox = &face["bounding_box"];
    println!(
        "{:<24} {:<10} {:>3.0}%  at ({:.0}, {:.0}) {:.0}x{:.0}",
        face["name"].as_str().unwrap_or("?"),
        face["category"].as_str().unwrap_or("?"),
        score * 100.0,
        bbox["x"].as_f64().unwrap_or(0.0),
        bbox["y"].as_f64().unwrap_or(0.0),
        bbox["width"].as_f64().unwrap_or(0.0),
        bbox["height"].as_f64().unwrap_or(0.0),
    );
}

/// Capture straight from the device and report what the detector would see.
fn run_camera_test(device: &str, frames: usize, save: Option<&PathBuf>) -> Result<()> {
    println!("Capture devices:");
    for info in Camera::list_devices() {
        println!("  {}  {} ({}, {})", info.path, info.name, info.driver, info.bus);
    }

    let camera = Camera::open(device).with_context(|| format!("failed to open {device}"))?;
    let info = camera.info();
    println!("Opened {} at {}x{} ({})", info.device, info.width, info.height, info.fourcc);

    tracing::debug!(device, frames, "capturing test frames");
    let (captured, dark) = camera.capture_frames(frames)?;
    tracing::debug!(captured = captured.len(), dark, "capture finished");
    println!("Captured {} frames, skipped {} dark", captured.len(), dark);
    for frame in &captured {
        println!("  seq {:>5}  brightness {:>6.1}", frame.sequence, frame.avg_brightness());
    }

    if let Some(path) = save {
        let frame = captured.first().context("no usable frame to save")?;
        let image = image::GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
            .context("frame buffer does not match its dimensions")?;
        image.save(path)?;
        println!("Saved first frame to {}", path.display());
    }

    Ok(())
}
