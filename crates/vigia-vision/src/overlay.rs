use image::Rgba;
use vigia_types::{
    config::{LabelPlacement, MarkerShape, OverlayConfig},
    detection::{DetectionResult, SourceDims},
    geometry::{BoundingBox, Size},
};

use crate::canvas::DrawingSurface;

/// Presentation options for detection overlays.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub marker: MarkerShape,
    pub placement: LabelPlacement,
    pub line_width: u32,
    pub stroke: Rgba<u8>,
    pub label_background: Rgba<u8>,
    pub label_color: Rgba<u8>,
    pub font_px: u32,
    pub label_height: u32,
    pub label_padding: u32,
    pub unknown_label: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            marker: config.marker,
            placement: config.label_placement,
            line_width: config.line_width,
            stroke: Rgba(config.stroke_color.0),
            label_background: Rgba(config.label_background.0),
            label_color: Rgba(config.label_color.0),
            font_px: config.font_px,
            label_height: config.label_height,
            label_padding: config.label_padding,
            unknown_label: config.unknown_label.clone(),
        }
    }
}

/// Paints detection markers and labels, mapping boxes from the source frame's
/// coordinate space onto the surface's pixel space.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Full repaint: clears the surface, then draws one marker and one label
    /// per result.
    pub fn render<S>(&self, surface: &mut S, results: &[DetectionResult], source: SourceDims)
    where
        S: DrawingSurface + ?Sized,
    {
        surface.clear();
        let size = surface.size();
        let (sx, sy) = source.scale_onto(size);
        let style = &self.style;

        for result in results {
            let marker = result.bbox.scaled(sx, sy);
            match style.marker {
                MarkerShape::Rectangle => surface.stroke_rect(marker, style.stroke, style.line_width),
                MarkerShape::Circle => {
                    let (cx, cy) = marker.center();
                    let radius = marker.w.min(marker.h) / 2.0;
                    surface.stroke_circle(cx, cy, radius, style.stroke, style.line_width);
                }
            }

            let text = result.label(&style.unknown_label);
            let padding = style.label_padding as f32;
            let label_width = surface.measure_text(text, style.font_px) + padding * 2.0;
            let label = place_label(
                &marker,
                label_width,
                style.label_height as f32,
                size,
                style.placement,
            );
            surface.fill_rect(label, style.label_background);
            surface.fill_text(
                text,
                label.x + padding,
                label.bottom() - padding,
                style.label_color,
                style.font_px,
            );
        }
    }
}

/// Computes the label box for a marker, kept inside the surface.
///
/// Horizontally the label starts at the marker's left edge, shifted left so
/// its right edge never passes the surface width. `Above` places it on the
/// marker's top edge and never lets it go above row 0; `Below` hangs it under
/// the marker and keeps it above the bottom edge.
pub fn place_label(
    marker: &BoundingBox,
    width: f32,
    height: f32,
    surface: Size,
    placement: LabelPlacement,
) -> BoundingBox {
    let surface_w = surface.width as f32;
    let surface_h = surface.height as f32;
    let x = marker.x.min(surface_w - width).max(0.0);
    let y = match placement {
        LabelPlacement::Above => (marker.y - height).max(0.0),
        LabelPlacement::Below => marker.bottom().min(surface_h - height).max(0.0),
    };
    BoundingBox::new(x, y, width, height)
}
