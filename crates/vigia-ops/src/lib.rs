//! Operational helpers: logging, session telemetry, snapshot persistence.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use image::RgbaImage;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vigia_types::{
    config::OpsConfig,
    events::{ClientEvent, EventPayload},
    Result, VigiaError,
};

const MAX_RECORDED_EVENTS: usize = 4_096;

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Per-session counters derived from client events.
#[derive(Debug, Clone, Default)]
pub struct SessionTelemetry {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub renders_by_camera: HashMap<String, u64>,
    pub alerts: Vec<String>,
}

/// In-memory telemetry store for a running session.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    events: Arc<Mutex<Vec<ClientEvent>>>,
    session: Arc<Mutex<SessionTelemetry>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: ClientEvent) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            match &event.payload {
                EventPayload::FrameSent { bytes } => {
                    session.frames_sent += 1;
                    session.bytes_sent += *bytes as u64;
                }
                EventPayload::Rendered(render) => {
                    *session
                        .renders_by_camera
                        .entry(render.camera_id.clone())
                        .or_default() += 1;
                }
                EventPayload::Alert { message } => session.alerts.push(message.clone()),
                _ => {}
            }
        }
        let mut events = self.events.lock().await;
        if events.len() == MAX_RECORDED_EVENTS {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<ClientEvent> {
        self.events.lock().await.clone()
    }

    pub async fn session(&self) -> SessionTelemetry {
        self.session.lock().await.clone()
    }
}

/// Writes composited camera surfaces to PNG files.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = ensure_snapshot_dir(dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, camera_id: &str, image: &RgbaImage) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let path = self
            .dir
            .join(format!("{}_{}.png", sanitize(camera_id), timestamp));
        image
            .save(&path)
            .map_err(|err| ops_error(format!("failed to save snapshot {}: {err}", path.display())))?;
        Ok(path)
    }
}

fn sanitize(camera_id: &str) -> String {
    camera_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn ensure_snapshot_dir(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let dir = path.into();
    std::fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create snapshot dir: {err}")))?;
    info!("Snapshot directory ready at {:?}", dir);
    Ok(dir)
}

pub fn ops_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Ops(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use vigia_types::events::RenderEvent;

    #[tokio::test]
    async fn telemetry_counts_frames_and_renders() {
        let store = TelemetryStore::new();
        store
            .record_event(ClientEvent::new(EventPayload::FrameSent { bytes: 100 }))
            .await
            .expect("record");
        store
            .record_event(ClientEvent::new(EventPayload::FrameSent { bytes: 50 }))
            .await
            .expect("record");
        store
            .record_event(ClientEvent::new(EventPayload::Rendered(RenderEvent {
                camera_id: "cam1".into(),
                labels: vec!["Alice".into()],
                with_background: false,
            })))
            .await
            .expect("record");
        store
            .record_event(ClientEvent::alert("camera unavailable"))
            .await
            .expect("record");

        let session = store.session().await;
        assert_eq!(session.frames_sent, 2);
        assert_eq!(session.bytes_sent, 150);
        assert_eq!(session.renders_by_camera.get("cam1"), Some(&1));
        assert_eq!(session.alerts, vec!["camera unavailable".to_string()]);
        assert_eq!(store.snapshot_events().await.len(), 4);
    }

    #[test]
    fn snapshot_writer_saves_png_with_sanitized_name() {
        let dir = std::env::temp_dir().join("vigia-snapshot-test");
        let writer = SnapshotWriter::new(&dir).expect("snapshot dir");
        let path = writer
            .write("rtsp://cam/1", &RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])))
            .expect("write snapshot");
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert!(name.starts_with("rtsp___cam_1_"));
        assert!(name.ends_with(".png"));
        let loaded = image::open(&path).expect("reopen snapshot").to_rgba8();
        assert_eq!(loaded.dimensions(), (4, 4));
        std::fs::remove_file(&path).expect("cleanup snapshot");
    }
}
