use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use image::RgbaImage;
use tracing::info;
use vigia_types::{geometry::Size, Result};

use crate::{device_error, MediaDevice, VideoSource};

/// Camera that keeps showing a single image loaded from disk.
pub struct StillImageDevice {
    path: PathBuf,
}

impl StillImageDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaDevice for StillImageDevice {
    async fn open(&self) -> Result<Arc<dyn VideoSource>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            device_error(format!("no camera image at {}: {err}", self.path.display()))
        })?;
        let image = image::load_from_memory(&raw)
            .map_err(|err| {
                device_error(format!(
                    "unreadable camera image {}: {err}",
                    self.path.display()
                ))
            })?
            .to_rgba8();
        info!(
            "Still camera opened from {} ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );
        let label = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "still".into());
        Ok(Arc::new(StillImageSource::new(label, image)))
    }
}

pub struct StillImageSource {
    label: String,
    image: RgbaImage,
    stopped: AtomicBool,
}

impl StillImageSource {
    pub fn new(label: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            label: label.into(),
            image,
            stopped: AtomicBool::new(false),
        }
    }
}

impl VideoSource for StillImageSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn intrinsic_size(&self) -> Size {
        if self.is_live() {
            Size::new(self.image.width(), self.image.height())
        } else {
            Size::zero()
        }
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        self.is_live().then(|| self.image.clone())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }
}
