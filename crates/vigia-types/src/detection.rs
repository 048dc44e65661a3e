use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Size};

/// Reserved identifier for the locally captured camera.
pub const MAIN_CAMERA_ID: &str = "main";

/// Label used when the recognition service could not name a face.
pub const DEFAULT_UNKNOWN_LABEL: &str = "Desconhecido";

/// One recognized or unrecognized face within a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DetectionResult {
    pub fn new(bbox: BoundingBox, name: Option<String>) -> Self {
        Self { bbox, name }
    }

    /// Display label, falling back to `unknown` when the name is absent or empty.
    pub fn label<'a>(&'a self, unknown: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => unknown,
        }
    }
}

/// Pixel dimensions of the frame the detection boxes were computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceDims {
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl SourceDims {
    pub fn new(width: Option<f32>, height: Option<f32>) -> Self {
        Self { width, height }
    }

    pub fn known(width: f32, height: f32) -> Self {
        Self::new(Some(width), Some(height))
    }

    /// Scale factors mapping source coordinates onto `surface`.
    ///
    /// Unknown (absent or non-positive) source dimensions pass through at 1:1.
    pub fn scale_onto(&self, surface: Size) -> (f32, f32) {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => {
                (surface.width as f32 / w, surface.height as f32 / h)
            }
            _ => (1.0, 1.0),
        }
    }
}

/// Inbound update exactly as it arrives on the wire. Every field is optional
/// so that malformed payloads can be detected instead of failing the decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecognitionUpdate {
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<DetectionResult>>,
    #[serde(default, alias = "frame_b64", skip_serializing_if = "Option::is_none")]
    pub frame_image: Option<String>,
    #[serde(default, alias = "frame_w", skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<f32>,
    #[serde(default, alias = "frame_h", skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<f32>,
}

/// Validated detection results for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionUpdate {
    pub camera_id: String,
    pub results: Vec<DetectionResult>,
    pub frame_image: Option<String>,
    pub source: SourceDims,
}

impl RecognitionUpdate {
    pub fn new(camera_id: impl Into<String>, results: Vec<DetectionResult>) -> Self {
        Self {
            camera_id: camera_id.into(),
            results,
            frame_image: None,
            source: SourceDims::default(),
        }
    }

    pub fn with_source(mut self, width: f32, height: f32) -> Self {
        self.source = SourceDims::known(width, height);
        self
    }

    pub fn with_frame_image(mut self, data_url: impl Into<String>) -> Self {
        self.frame_image = Some(data_url.into());
        self
    }

    pub fn is_main(&self) -> bool {
        self.camera_id == MAIN_CAMERA_ID
    }

    /// Returns `None` for updates without a usable camera identifier.
    pub fn from_raw(raw: RawRecognitionUpdate) -> Option<Self> {
        let camera_id = raw.camera_id.filter(|id| !id.is_empty())?;
        Some(Self {
            camera_id,
            results: raw.results.unwrap_or_default(),
            frame_image: raw.frame_image.filter(|image| !image.is_empty()),
            source: SourceDims::new(raw.frame_width, raw.frame_height),
        })
    }

    pub fn into_raw(self) -> RawRecognitionUpdate {
        RawRecognitionUpdate {
            camera_id: Some(self.camera_id),
            results: Some(self.results),
            frame_image: self.frame_image,
            frame_width: self.source.width,
            frame_height: self.source.height,
        }
    }
}
