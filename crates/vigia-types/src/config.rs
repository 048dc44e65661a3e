use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{detection::DEFAULT_UNKNOWN_LABEL, geometry::Size, Result, VigiaError};

/// Where the main camera's frames come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Synthetic,
    Still,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interval_ms: u64,
    pub jpeg_quality: u8,
    pub device: DeviceKind,
    pub still_image: Option<String>,
    pub synthetic_size: Size,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 150,
            jpeg_quality: 60,
            device: DeviceKind::Synthetic,
            still_image: None,
            synthetic_size: Size::new(640, 480),
        }
    }
}

/// Rendered (layout) sizes of the main view and of each grid tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub main_size: Size,
    pub grid_tile_size: Size,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            main_size: Size::new(640, 480),
            grid_tile_size: Size::new(320, 240),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub server_addr: String,
    pub connect_timeout_ms: u64,
    /// Pause between reconnection attempts after the service goes away.
    pub reconnect_delay_ms: u64,
    /// Longest inbound line accepted before the connection is dropped.
    pub max_line_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:5001".into(),
            connect_timeout_ms: 5_000,
            reconnect_delay_ms: 2_000,
            max_line_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    #[default]
    Rectangle,
    Circle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPlacement {
    #[default]
    Above,
    Below,
}

/// RGBA color written as `#rrggbb` or `#rrggbbaa` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub [u8; 4]);

impl HexColor {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for HexColor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{s}' must start with '#'"))?;
        if digits.len() != 6 && digits.len() != 8 {
            return Err(format!("color '{s}' must be #rrggbb or #rrggbbaa"));
        }
        let mut channels = [0u8, 0, 0, 255];
        for (i, channel) in channels.iter_mut().enumerate().take(digits.len() / 2) {
            let pair = digits
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| format!("color '{s}' is not ASCII hex"))?;
            *channel = u8::from_str_radix(pair, 16)
                .map_err(|err| format!("color '{s}' has invalid hex digits: {err}"))?;
        }
        Ok(Self(channels))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub marker: MarkerShape,
    pub label_placement: LabelPlacement,
    pub line_width: u32,
    pub stroke_color: HexColor,
    pub label_background: HexColor,
    pub label_color: HexColor,
    pub font_px: u32,
    pub label_height: u32,
    pub label_padding: u32,
    pub unknown_label: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            marker: MarkerShape::Rectangle,
            label_placement: LabelPlacement::Above,
            line_width: 2,
            stroke_color: HexColor::rgba(0, 255, 0, 255),
            label_background: HexColor::rgba(0, 0, 0, 128),
            label_color: HexColor::rgba(0, 255, 0, 255),
            font_px: 14,
            label_height: 18,
            label_padding: 4,
            unknown_label: DEFAULT_UNKNOWN_LABEL.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub snapshot_dir: Option<String>,
    /// Zero disables periodic snapshots; explicit snapshot requests still work.
    pub snapshot_interval_ms: u64,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            snapshot_dir: None,
            snapshot_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub samples: usize,
    pub spacing_ms: u64,
    pub jpeg_quality: u8,
    pub reply_timeout_ms: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            spacing_ms: 200,
            jpeg_quality: 80,
            reply_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigiaConfig {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub network: NetworkConfig,
    pub overlay: OverlayConfig,
    pub ops: OpsConfig,
    pub enrollment: EnrollmentConfig,
}

impl VigiaConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            VigiaError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            VigiaError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.interval_ms == 0 {
            return Err(VigiaError::Configuration(
                "capture.interval_ms must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(VigiaError::Configuration(
                "capture.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.capture.device == DeviceKind::Still && self.capture.still_image.is_none() {
            return Err(VigiaError::Configuration(
                "capture.still_image is required when capture.device = \"still\"".into(),
            ));
        }
        if self.display.main_size.is_empty() || self.display.grid_tile_size.is_empty() {
            return Err(VigiaError::Configuration(
                "display sizes must be non-zero".into(),
            ));
        }
        if self.network.server_addr.trim().is_empty() {
            return Err(VigiaError::Configuration(
                "network.server_addr must not be empty".into(),
            ));
        }
        if self.network.max_line_bytes == 0 {
            return Err(VigiaError::Configuration(
                "network.max_line_bytes must be greater than zero".into(),
            ));
        }
        if self.overlay.line_width == 0 {
            return Err(VigiaError::Configuration(
                "overlay.line_width must be greater than zero".into(),
            ));
        }
        if self.overlay.font_px < 8 {
            return Err(VigiaError::Configuration(
                "overlay.font_px must be at least 8".into(),
            ));
        }
        if self.enrollment.samples == 0 {
            return Err(VigiaError::Configuration(
                "enrollment.samples must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.enrollment.jpeg_quality) {
            return Err(VigiaError::Configuration(
                "enrollment.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "server={} capture={}ms q={} main={} tile={} marker={:?}",
            self.network.server_addr,
            self.capture.interval_ms,
            self.capture.jpeg_quality,
            self.display.main_size,
            self.display.grid_tile_size,
            self.overlay.marker
        )
    }
}
