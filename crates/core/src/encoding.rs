//! Image encoding and region extraction.
//!
//! This module turns uploaded files into self-describing data URLs and
//! cuts selected regions out of them for transmission to the image service.
//!
//! # Coordinate Mapping
//!
//! The front-end shows the upload at some display size (e.g., 800x600)
//! while the file itself may be much larger (e.g., 4032x3024 from a phone
//! camera). Selections arrive in display space and are scaled to native
//! pixels before cropping.

use crate::error::{AppError, Result};
use crate::selection::SelectionRect;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// An image payload carrying its MIME type and base64-encoded bytes.
///
/// The string form is a data URL: `data:<mime>;base64,<payload>`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    payload: String,
}

impl EncodedImage {
    /// Wraps raw bytes, encoding them to base64.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload: BASE64.encode(bytes),
        }
    }

    /// Wraps an existing base64 payload after checking that it decodes.
    pub fn from_base64(mime_type: impl Into<String>, payload: impl Into<String>) -> Result<Self> {
        let payload = payload.into();
        BASE64
            .decode(payload.as_bytes())
            .map_err(|e| AppError::encoding(format!("payload is not valid base64: {}", e)))?;

        Ok(Self {
            mime_type: mime_type.into(),
            payload,
        })
    }

    /// Parses a `data:<mime>;base64,<payload>` string.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| AppError::encoding("missing `data:` prefix"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AppError::encoding("missing `,` after header"))?;
        let mime_type = header
            .strip_suffix(BASE64_MARKER)
            .ok_or_else(|| AppError::encoding("only base64 data URLs are supported"))?;

        if mime_type.is_empty() {
            return Err(AppError::encoding("missing MIME type"));
        }

        Self::from_base64(mime_type, payload)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 body with the data-URL header stripped.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Decodes the payload back to raw bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.payload.as_bytes())
            .map_err(|e| AppError::encoding(format!("payload is not valid base64: {}", e)))
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{},{}",
            DATA_URL_PREFIX, self.mime_type, BASE64_MARKER, self.payload
        )
    }
}

// Payloads are megabytes long; keep logs readable.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl FromStr for EncodedImage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_data_url(s)
    }
}

/// Width and height of an image as it is currently displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Reads an image file fully into memory and encodes it as a data URL.
///
/// # Errors
///
/// Returns [`AppError::Read`] if the file cannot be read or is not a
/// decodable image.
pub fn encode_file(path: impl AsRef<Path>) -> Result<EncodedImage> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| AppError::read(format!("{}: {}", path.display(), e)))?;
    encode_bytes(&bytes)
}

/// Encodes in-memory file contents as a data URL.
///
/// The format is detected from the bytes, and the image is decoded once to
/// make sure it is usable. The payload is the original bytes, untouched.
pub fn encode_bytes(bytes: &[u8]) -> Result<EncodedImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| AppError::read(format!("unrecognized image format: {}", e)))?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| AppError::read(format!("failed to decode image: {}", e)))?;

    Ok(EncodedImage::from_bytes(format.to_mime_type(), bytes))
}

/// Decodes an encoded image into pixels.
pub fn decode_image(image: &EncodedImage) -> Result<DynamicImage> {
    let bytes = image.decode_bytes()?;
    image::load_from_memory(&bytes)
        .map_err(|e| AppError::encoding(format!("failed to decode image: {}", e)))
}

/// Reads the native pixel size of an encoded image without decoding pixels.
pub fn native_size(image: &EncodedImage) -> Result<DisplaySize> {
    let bytes = image.decode_bytes()?;
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| AppError::read(format!("failed to read image dimensions: {}", e)))?;
    Ok(DisplaySize::new(width as f32, height as f32))
}

/// Crops `rect` (in display coordinates) out of `source` and re-encodes it as PNG.
///
/// The rectangle is scaled by `native / display` on each axis, then both
/// corners are clamped to the image, so selections running past an edge
/// are trimmed rather than rejected.
///
/// # Errors
///
/// Returns [`AppError::Extraction`] if the rectangle is degenerate (10 display
/// pixels or less on either axis), the display size is empty, the source
/// cannot be decoded, or nothing remains after clamping.
pub fn extract_region(
    source: &EncodedImage,
    display: DisplaySize,
    rect: SelectionRect,
) -> Result<EncodedImage> {
    if rect.is_degenerate() {
        return Err(AppError::extraction(format!("selection {:?} is too small", rect)));
    }
    if display.is_empty() {
        return Err(AppError::extraction("display size is empty"));
    }

    let bytes = source.decode_bytes()?;
    let original = image::load_from_memory(&bytes)
        .map_err(|e| AppError::extraction(format!("failed to decode source: {}", e)))?;

    // Calculate scaling factors between display and image coordinates
    let scale_x = original.width() as f32 / display.width;
    let scale_y = original.height() as f32 / display.height;

    let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
    let x0 = clamp(rect.x * scale_x, original.width());
    let y0 = clamp(rect.y * scale_y, original.height());
    let x1 = clamp((rect.x + rect.width) * scale_x, original.width());
    let y1 = clamp((rect.y + rect.height) * scale_y, original.height());

    let width = x1.saturating_sub(x0);
    let height = y1.saturating_sub(y0);
    if width == 0 || height == 0 {
        return Err(AppError::extraction(format!(
            "selection {:?} is empty inside a {}x{} image",
            rect,
            original.width(),
            original.height()
        )));
    }

    let cropped = original.crop_imm(x0, y0, width, height);
    encode_png(&cropped)
}

/// Encodes a DynamicImage as a PNG data URL.
fn encode_png(image: &DynamicImage) -> Result<EncodedImage> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| AppError::extraction(format!("Failed to encode image: {}", e)))?;

    Ok(EncodedImage::from_bytes(ImageFormat::Png.to_mime_type(), &buffer))
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 0x80, 0xff])
    }));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

#[cfg(test)]
pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([240, 240, 240]),
    ));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .unwrap();
    buffer
}
