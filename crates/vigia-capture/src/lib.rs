//! Local camera abstraction layer.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::time::sleep;
use tracing::info;
use vigia_types::{geometry::Size, Result, VigiaError};

mod still;

pub use still::{StillImageDevice, StillImageSource};

/// A live frame source bound to a video element.
pub trait VideoSource: Send + Sync {
    fn label(&self) -> &str;
    /// Native resolution of the stream; zero until the first frame is available.
    fn intrinsic_size(&self) -> Size;
    /// The frame currently on display, if any.
    fn current_frame(&self) -> Option<RgbaImage>;
    /// Releases the underlying device. Further frames are not produced.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Grants access to a camera, the way a permission prompt would.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn VideoSource>>;
}

#[async_trait]
impl<T: MediaDevice + ?Sized> MediaDevice for Box<T> {
    async fn open(&self) -> Result<Arc<dyn VideoSource>> {
        (**self).open().await
    }
}

/// Test-pattern camera used for offline runs and integration testing.
pub struct SyntheticDevice {
    size: Size,
    warmup: Duration,
}

impl SyntheticDevice {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            warmup: Duration::ZERO,
        }
    }

    /// Delay before the stream reports a valid intrinsic size.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

#[async_trait]
impl MediaDevice for SyntheticDevice {
    async fn open(&self) -> Result<Arc<dyn VideoSource>> {
        if self.size.is_empty() {
            return Err(device_error(format!(
                "synthetic camera cannot produce {} frames",
                self.size
            )));
        }
        info!("Opening synthetic camera at {}", self.size);
        sleep(Duration::from_millis(10)).await;
        Ok(Arc::new(SyntheticCamera::new(self.size, self.warmup)))
    }
}

pub struct SyntheticCamera {
    size: Size,
    warmup: Duration,
    started_at: Instant,
    stopped: AtomicBool,
    frames_served: AtomicU64,
}

impl SyntheticCamera {
    pub fn new(size: Size, warmup: Duration) -> Self {
        Self {
            size,
            warmup,
            started_at: Instant::now(),
            stopped: AtomicBool::new(false),
            frames_served: AtomicU64::new(0),
        }
    }

    fn ready(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && self.started_at.elapsed() >= self.warmup
    }
}

impl VideoSource for SyntheticCamera {
    fn label(&self) -> &str {
        "synthetic"
    }

    fn intrinsic_size(&self) -> Size {
        if self.ready() {
            self.size
        } else {
            Size::zero()
        }
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        if !self.ready() {
            return None;
        }
        let Size { width, height } = self.size;
        let tick = self.frames_served.fetch_add(1, Ordering::Relaxed);
        let mut frame = RgbaImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgba([r, g, 96, 255])
        });

        // Moving block so consecutive frames differ.
        let block = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(block).max(1);
        let offset = ((tick * 8) % u64::from(travel)) as u32;
        let top = (height - block.min(height)) / 2;
        for y in top..(top + block).min(height) {
            for x in offset..(offset + block).min(width) {
                frame.put_pixel(x, y, Rgba([240, 240, 240, 255]));
            }
        }
        Some(frame)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!("Synthetic camera released");
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }
}

/// Generate an error aligned with device semantics.
pub fn device_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Device(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_device_serves_frames_at_configured_size() {
        let device = SyntheticDevice::new(Size::new(64, 48));
        let source = device.open().await.expect("open synthetic camera");
        assert_eq!(source.intrinsic_size(), Size::new(64, 48));
        let frame = source.current_frame().expect("frame available");
        assert_eq!(frame.dimensions(), (64, 48));
        assert_ne!(Some(frame), source.current_frame());
    }

    #[tokio::test]
    async fn warmup_reports_zero_size_until_ready() {
        let device = SyntheticDevice::new(Size::new(32, 32)).with_warmup(Duration::from_secs(60));
        let source = device.open().await.expect("open synthetic camera");
        assert!(source.intrinsic_size().is_empty());
        assert!(source.current_frame().is_none());
    }

    #[tokio::test]
    async fn stopped_camera_stops_producing() {
        let device = SyntheticDevice::new(Size::new(16, 16));
        let source = device.open().await.expect("open synthetic camera");
        assert!(source.is_live());
        source.stop();
        assert!(!source.is_live());
        assert!(source.intrinsic_size().is_empty());
        assert!(source.current_frame().is_none());
    }

    #[tokio::test]
    async fn empty_synthetic_size_is_a_device_error() {
        let device = SyntheticDevice::new(Size::zero());
        assert!(matches!(device.open().await, Err(VigiaError::Device(_))));
    }
}
