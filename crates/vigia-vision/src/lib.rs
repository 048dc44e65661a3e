//! Frame encoding, camera surfaces, and detection overlays.

pub mod canvas;
pub mod encoder;
pub mod font;
pub mod overlay;
pub mod surface;

pub use canvas::{DrawingSurface, RasterCanvas};
pub use encoder::{decode_data_url, EncodedFrame, FrameEncoder};
pub use overlay::{place_label, OverlayRenderer, OverlayStyle};
pub use surface::{CameraSurface, VideoElement};
