use std::collections::HashMap;

use tracing::debug;
use vigia_types::{detection::MAIN_CAMERA_ID, geometry::Size};
use vigia_vision::{CameraSurface, VideoElement};

/// One displayed camera: its video element, the overlay surface attached to
/// it, and the bookkeeping used to discard out-of-order renders.
pub struct CameraFeed {
    camera_id: String,
    title: String,
    instance: u64,
    generation: u64,
    video: VideoElement,
    surface: CameraSurface,
    next_seq: u64,
    rendered_seq: Option<u64>,
}

impl CameraFeed {
    pub fn new(camera_id: impl Into<String>, rendered: Size) -> Self {
        Self::with_identity(camera_id.into(), rendered, 0, 0)
    }

    fn with_identity(camera_id: String, rendered: Size, instance: u64, generation: u64) -> Self {
        let video = VideoElement::new(rendered);
        let surface = CameraSurface::attach(&video);
        Self {
            title: format!("Câmera {camera_id}"),
            camera_id,
            instance,
            generation,
            video,
            surface,
            next_seq: 0,
            rendered_seq: None,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Distinguishes feeds that were recreated under the same identifier.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn video(&self) -> &VideoElement {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoElement {
        &mut self.video
    }

    pub fn surface(&self) -> &CameraSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut CameraSurface {
        &mut self.surface
    }

    /// Sequence number for the next update received for this feed.
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// An update may render only if nothing newer has rendered already.
    pub fn accepts(&self, seq: u64) -> bool {
        self.rendered_seq.map_or(true, |rendered| seq > rendered)
    }

    pub fn mark_rendered(&mut self, seq: u64) {
        self.rendered_seq = Some(self.rendered_seq.map_or(seq, |rendered| rendered.max(seq)));
    }

    pub fn last_rendered(&self) -> Option<u64> {
        self.rendered_seq
    }
}

/// Remote camera feeds keyed by camera identifier, in creation order.
///
/// Feeds are created lazily on first reference and live until [`clear`]
/// removes all of them. The main camera is never stored here.
///
/// [`clear`]: CameraRegistry::clear
pub struct CameraRegistry {
    feeds: HashMap<String, CameraFeed>,
    tile_size: Size,
    generation: u64,
    next_instance: u64,
}

impl CameraRegistry {
    pub fn new(tile_size: Size) -> Self {
        Self {
            feeds: HashMap::new(),
            tile_size,
            generation: 0,
            next_instance: 1,
        }
    }

    /// Returns the feed for `camera_id`, creating it on first use.
    pub fn resolve(&mut self, camera_id: &str) -> &mut CameraFeed {
        debug_assert_ne!(camera_id, MAIN_CAMERA_ID, "main camera is not a registry feed");
        let Self {
            feeds,
            tile_size,
            generation,
            next_instance,
        } = self;
        feeds.entry(camera_id.to_string()).or_insert_with(|| {
            let instance = *next_instance;
            *next_instance += 1;
            debug!("Creating feed for camera {}", camera_id);
            CameraFeed::with_identity(camera_id.to_string(), *tile_size, instance, *generation)
        })
    }

    pub fn contains(&self, camera_id: &str) -> bool {
        self.feeds.contains_key(camera_id)
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraFeed> {
        self.feeds.get(camera_id)
    }

    pub fn get_mut(&mut self, camera_id: &str) -> Option<&mut CameraFeed> {
        self.feeds.get_mut(camera_id)
    }

    /// Feeds in the order they were created.
    pub fn feeds(&self) -> Vec<&CameraFeed> {
        let mut feeds: Vec<&CameraFeed> = self.feeds.values().collect();
        feeds.sort_by_key(|feed| feed.instance);
        feeds
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Removes every feed. Work still in flight for a removed feed carries
    /// the old generation and is ignored on completion.
    pub fn clear(&mut self) -> usize {
        let removed = self.feeds.len();
        self.feeds.clear();
        self.generation += 1;
        removed
    }

    /// Grid layout change: existing tiles and tiles created later use `size`.
    pub fn resize_tiles(&mut self, size: Size) {
        self.tile_size = size;
        for feed in self.feeds.values_mut() {
            feed.video.set_rendered_size(size);
            feed.surface.sync_layout();
        }
    }
}
