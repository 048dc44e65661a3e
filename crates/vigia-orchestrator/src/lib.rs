//! Client session orchestration: the stream controller event loop, the
//! remote camera registry, and enrollment workflows.

pub mod controller;
pub mod demo;
pub mod enrollment;
pub mod registry;

pub use controller::{ControllerEvent, DecodedFrame, StreamController, SurfaceTarget, UserCommand};
pub use demo::DemoService;
pub use enrollment::{capture_samples, enroll, register_camera};
pub use registry::{CameraFeed, CameraRegistry};
