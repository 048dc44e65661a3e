use base64::{prelude::BASE64_STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImage, RgbaImage};
use tracing::trace;
use vigia_capture::VideoSource;
use vigia_types::{geometry::Size, Result, VigiaError};

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A compressed still ready to embed in a message.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data_url: String,
    pub size: Size,
    pub jpeg_bytes: usize,
}

/// Captures a video source's current frame into a lossy JPEG data URL.
///
/// The offscreen buffer is sized from the source's intrinsic dimensions on
/// first use and keeps that size until [`FrameEncoder::reset`] is called;
/// later frames of a different size are scaled into it.
pub struct FrameEncoder {
    buffer: Option<RgbaImage>,
    quality: u8,
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            buffer: None,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn buffer_size(&self) -> Option<Size> {
        self.buffer
            .as_ref()
            .map(|b| Size::new(b.width(), b.height()))
    }

    pub fn reset(&mut self) {
        self.buffer = None;
    }

    /// Returns `Ok(None)` when the source has no valid frame yet.
    pub fn encode(&mut self, source: &dyn VideoSource) -> Result<Option<EncodedFrame>> {
        let intrinsic = source.intrinsic_size();
        if intrinsic.is_empty() {
            trace!("{} has no intrinsic size yet; skipping encode", source.label());
            return Ok(None);
        }
        let Some(frame) = source.current_frame() else {
            return Ok(None);
        };

        let buffer = self
            .buffer
            .get_or_insert_with(|| RgbaImage::new(intrinsic.width, intrinsic.height));
        if frame.dimensions() == buffer.dimensions() {
            buffer
                .copy_from(&frame, 0, 0)
                .map_err(|err| encoding_error(format!("frame copy failed: {err}")))?;
        } else {
            let scaled =
                image::imageops::resize(&frame, buffer.width(), buffer.height(), FilterType::Triangle);
            buffer
                .copy_from(&scaled, 0, 0)
                .map_err(|err| encoding_error(format!("frame copy failed: {err}")))?;
        }

        let size = Size::new(buffer.width(), buffer.height());
        let jpeg = encode_jpeg(buffer, self.quality)?;
        Ok(Some(EncodedFrame {
            data_url: to_data_url(&jpeg),
            size,
            jpeg_bytes: jpeg.len(),
        }))
    }
}

pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|err| encoding_error(format!("jpeg encode failed: {err}")))?;
    Ok(bytes)
}

pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("{JPEG_DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(jpeg))
}

/// Decodes an embedded image, either a `data:` URL or bare base64.
pub fn decode_data_url(encoded: &str) -> Result<RgbaImage> {
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| decode_error("data URL has no payload separator"))?;
            if !header.ends_with(";base64") {
                return Err(decode_error(format!(
                    "unsupported data URL encoding '{header}'"
                )));
            }
            body
        }
        None => encoded,
    };
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|err| decode_error(format!("invalid base64 image: {err}")))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|err| decode_error(format!("undecodable image: {err}")))?;
    Ok(image.to_rgba8())
}

pub fn encoding_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Encoding(message.into())
}

pub fn decode_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Decode(message.into())
}
