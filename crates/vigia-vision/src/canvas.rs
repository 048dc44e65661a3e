use image::{Rgba, RgbaImage};
use vigia_types::geometry::{BoundingBox, Size};

use crate::font;

/// Minimal 2D drawing API that overlays are painted through.
pub trait DrawingSurface {
    fn size(&self) -> Size;
    /// Erases every pixel to fully transparent.
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, line_width: u32);
    fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>, line_width: u32);
    fn fill_rect(&mut self, rect: BoundingBox, color: Rgba<u8>);
    /// Draws `text` with its baseline at `baseline`.
    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, color: Rgba<u8>, font_px: u32);
    fn measure_text(&self, text: &str, font_px: u32) -> f32;
}

/// Transparent RGBA drawing layer.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    pixels: RgbaImage,
}

impl RasterCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            pixels: RgbaImage::new(size.width, size.height),
        }
    }

    /// Reallocates the pixel buffer. Like a canvas, any existing content is lost.
    pub fn resize(&mut self, size: Size) {
        self.pixels = RgbaImage::new(size.width, size.height);
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[3] == 0)
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= i64::from(self.pixels.width()) || y >= i64::from(self.pixels.height()) {
            return;
        }
        let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
        *dst = blend_over(*dst, color);
    }

    fn fill_span(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let w = i64::from(self.pixels.width());
        let h = i64::from(self.pixels.height());
        for y in y0.max(0)..y1.min(h) {
            for x in x0.max(0)..x1.min(w) {
                self.blend(x, y, color);
            }
        }
    }
}

/// Source-over compositing of `src` onto `dst`.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(src.0[3]) / 255.0;
    if sa >= 1.0 {
        return src;
    }
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst.0[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = f32::from(src.0[c]) * sa;
        let d = f32::from(dst.0[c]) * da * (1.0 - sa);
        out[c] = ((s + d) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

impl DrawingSurface for RasterCanvas {
    fn size(&self) -> Size {
        Size::new(self.pixels.width(), self.pixels.height())
    }

    fn clear(&mut self) {
        for p in self.pixels.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: BoundingBox, color: Rgba<u8>, line_width: u32) {
        let x0 = rect.x.round() as i64;
        let y0 = rect.y.round() as i64;
        let x1 = rect.right().round() as i64;
        let y1 = rect.bottom().round() as i64;
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let t = i64::from(line_width.max(1));
        // Edges are drawn inward from the box outline.
        self.fill_span(x0, y0, x1, (y0 + t).min(y1), color);
        self.fill_span(x0, (y1 - t).max(y0 + t), x1, y1, color);
        self.fill_span(x0, y0 + t, (x0 + t).min(x1), y1 - t, color);
        self.fill_span((x1 - t).max(x0 + t), y0 + t, x1, y1 - t, color);
    }

    fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>, line_width: u32) {
        if !(radius.is_finite() && cx.is_finite() && cy.is_finite()) || radius <= 0.0 {
            return;
        }
        let half = line_width.max(1) as f32 / 2.0;
        let outer = radius + half;
        // Only the part of the bounding square that lands on the canvas is scanned.
        let w = i64::from(self.pixels.width());
        let h = i64::from(self.pixels.height());
        let x0 = ((cx - outer).floor() as i64).max(0);
        let x1 = ((cx + outer).ceil() as i64).min(w - 1);
        let y0 = ((cy - outer).floor() as i64).max(0);
        let y1 = ((cy + outer).ceil() as i64).min(h - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if (dist - radius).abs() <= half {
                    self.blend(x, y, color);
                }
            }
        }
    }

    fn fill_rect(&mut self, rect: BoundingBox, color: Rgba<u8>) {
        self.fill_span(
            rect.x.round() as i64,
            rect.y.round() as i64,
            rect.right().round() as i64,
            rect.bottom().round() as i64,
            color,
        );
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, color: Rgba<u8>, font_px: u32) {
        let scale = i64::from(font::scale_for(font_px));
        let top = baseline.round() as i64 - i64::from(font::GLYPH_ASCENT) * scale;
        let mut pen = x.round() as i64;
        for c in text.chars() {
            let columns = font::glyph(c);
            for (col, bits) in columns.iter().enumerate() {
                for row in 0..font::GLYPH_ROWS {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    let px = pen + col as i64 * scale;
                    let py = top + i64::from(row) * scale;
                    self.fill_span(px, py, px + scale, py + scale, color);
                }
            }
            pen += i64::from(font::GLYPH_ADVANCE) * scale;
        }
    }

    fn measure_text(&self, text: &str, font_px: u32) -> f32 {
        font::text_width(text, font_px) as f32
    }
}
