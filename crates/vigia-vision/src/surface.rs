use std::sync::Arc;

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use tokio::sync::watch;
use tracing::trace;
use vigia_capture::VideoSource;
use vigia_types::geometry::Size;

use crate::canvas::{DrawingSurface, RasterCanvas};

/// Display element for a camera: an optional live source plus the size the
/// layout gives it on screen.
pub struct VideoElement {
    layout: watch::Sender<Size>,
    source: Option<Arc<dyn VideoSource>>,
}

impl VideoElement {
    pub fn new(rendered: Size) -> Self {
        let (layout, _) = watch::channel(rendered);
        Self {
            layout,
            source: None,
        }
    }

    pub fn rendered_size(&self) -> Size {
        *self.layout.borrow()
    }

    /// Layout change; every attached surface picks it up on its next sync.
    pub fn set_rendered_size(&self, size: Size) {
        self.layout.send_if_modified(|current| {
            if *current == size {
                false
            } else {
                *current = size;
                true
            }
        });
    }

    pub fn observe_layout(&self) -> watch::Receiver<Size> {
        self.layout.subscribe()
    }

    pub fn bind(&mut self, source: Arc<dyn VideoSource>) {
        self.source = Some(source);
    }

    pub fn unbind(&mut self) -> Option<Arc<dyn VideoSource>> {
        self.source.take()
    }

    pub fn source(&self) -> Option<&Arc<dyn VideoSource>> {
        self.source.as_ref()
    }

    pub fn intrinsic_size(&self) -> Size {
        self.source
            .as_ref()
            .map(|s| s.intrinsic_size())
            .unwrap_or_default()
    }

    pub fn current_frame(&self) -> Option<RgbaImage> {
        self.source.as_ref().and_then(|s| s.current_frame())
    }
}

/// Overlay layer whose pixel size follows a video element's rendered size.
pub struct CameraSurface {
    overlay: RasterCanvas,
    background: Option<RgbaImage>,
    layout: watch::Receiver<Size>,
}

impl CameraSurface {
    pub fn attach(video: &VideoElement) -> Self {
        let mut layout = video.observe_layout();
        let size = *layout.borrow_and_update();
        Self {
            overlay: RasterCanvas::new(size),
            background: None,
            layout,
        }
    }

    /// Re-applies the video's rendered size if the layout changed since the
    /// last sync. Returns whether the surface was resized.
    pub fn sync_layout(&mut self) -> bool {
        if !self.layout.has_changed().unwrap_or(false) {
            return false;
        }
        let size = *self.layout.borrow_and_update();
        self.apply_size(size)
    }

    pub fn size(&self) -> Size {
        self.overlay.size()
    }

    /// Resizes the overlay. A no-op when the size is unchanged.
    pub fn apply_size(&mut self, size: Size) -> bool {
        if self.overlay.size() == size {
            return false;
        }
        trace!("Surface resized {} -> {}", self.overlay.size(), size);
        self.overlay.resize(size);
        true
    }

    /// Sets a decoded remote frame as the surface background, resizing the
    /// surface to the frame's dimensions first.
    pub fn paint_background(&mut self, frame: RgbaImage) {
        self.apply_size(Size::new(frame.width(), frame.height()));
        self.background = Some(frame);
    }

    pub fn background(&self) -> Option<&RgbaImage> {
        self.background.as_ref()
    }

    pub fn overlay(&self) -> &RasterCanvas {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut RasterCanvas {
        &mut self.overlay
    }

    /// Flattens background (or the supplied live frame) and overlay into one
    /// image at the surface's current size.
    pub fn composite(&self, live_frame: Option<&RgbaImage>) -> RgbaImage {
        let Size { width, height } = self.size();
        let mut out = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        if let Some(base) = self.background.as_ref().or(live_frame) {
            if base.dimensions() == (width, height) {
                imageops::overlay(&mut out, base, 0, 0);
            } else if width > 0 && height > 0 {
                let scaled = imageops::resize(base, width, height, FilterType::Triangle);
                imageops::overlay(&mut out, &scaled, 0, 0);
            }
        }
        imageops::overlay(&mut out, self.overlay.image(), 0, 0);
        out
    }
}
