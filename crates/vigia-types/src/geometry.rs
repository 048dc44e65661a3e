use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame, surface, or layout box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// A size with either side at zero has no drawable pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Axis-aligned box in `[x, y, w, h]` form, as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            w: self.w * sx,
            h: self.h * sy,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, w, h]: [f32; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bounding_box_uses_array_wire_form() {
        let parsed: BoundingBox = serde_json::from_str("[10, 20.5, 30, 40]").expect("parse box");
        assert_eq!(parsed, BoundingBox::new(10.0, 20.5, 30.0, 40.0));
        let encoded = serde_json::to_string(&parsed).expect("encode box");
        assert_eq!(encoded, "[10.0,20.5,30.0,40.0]");
    }

    #[test]
    fn scaling_applies_per_axis() {
        let scaled = BoundingBox::new(100.0, 100.0, 50.0, 50.0).scaled(2.0, 0.5);
        assert_relative_eq!(scaled.x, 200.0);
        assert_relative_eq!(scaled.y, 50.0);
        assert_relative_eq!(scaled.w, 100.0);
        assert_relative_eq!(scaled.h, 25.0);
    }

    #[test]
    fn empty_size_detection() {
        assert!(Size::zero().is_empty());
        assert!(Size::new(640, 0).is_empty());
        assert!(!Size::new(1, 1).is_empty());
        assert_eq!(Size::new(320, 240).to_string(), "320x240");
    }
}
