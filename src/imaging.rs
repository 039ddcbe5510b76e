//! In-memory image handoff: base64 payload → decoded image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::DynamicImage;

use crate::error::{MeasureError, MeasureResult};

/// Image decoded once per request and lent to every backend that needs it.
///
/// Keeps the original encoded bytes so remote backends can forward them without
/// re-encoding.
#[derive(Debug)]
pub struct DecodedImage {
    encoded: Bytes,
    pixels: DynamicImage,
}

impl DecodedImage {
    pub fn from_bytes(encoded: impl Into<Bytes>) -> MeasureResult<Self> {
        let encoded = encoded.into();
        let pixels = image::load_from_memory(&encoded)
            .map_err(|e| MeasureError::DecodeFailure(e.to_string()))?;
        Ok(Self { encoded, pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }
}

/// Decode a request image field.
///
/// Absent or blank fields are `MissingImageData`; a `data:image/...;base64,` prefix is accepted.
pub fn decode_base64(field: Option<&str>) -> MeasureResult<DecodedImage> {
    let payload = field.map(str::trim).unwrap_or_default();
    let payload = match payload.split_once(";base64,") {
        Some((scheme, data)) if scheme.starts_with("data:") => data,
        _ => payload,
    };
    if payload.is_empty() {
        return Err(MeasureError::MissingImageData);
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| MeasureError::DecodeFailure(format!("invalid base64: {}", e)))?;
    DecodedImage::from_bytes(bytes)
}

/// Base64 form used on the wire
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
