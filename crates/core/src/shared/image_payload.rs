use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::DetectionError;
use crate::shared::frame::Frame;

const BASE64_MARKER: &str = "base64,";

/// Removes a `data:<mime>;base64,` prefix, i.e. everything up to and
/// including the first `base64,`. Payloads without the marker are returned
/// unchanged.
pub fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.find(BASE64_MARKER) {
        Some(pos) => &payload[pos + BASE64_MARKER.len()..],
        None => payload,
    }
}

/// Decodes a base64 (optionally data-URL) image payload into an RGB frame.
///
/// Any format the `image` crate can sniff is accepted; alpha and palette
/// images are converted to 3-channel RGB. Line breaks inside the base64 text
/// are ignored.
pub fn decode_image_payload(payload: &str) -> Result<Frame, DetectionError> {
    let encoded: String = strip_data_url_prefix(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = BASE64.decode(encoded)?;
    let image = image::load_from_memory(&bytes)?;
    let frame = Frame::from_rgb_image(image.to_rgb8());
    if frame.is_empty() {
        return Err(DetectionError::EmptyImage);
    }
    log::debug!("Decoded {}x{} image", frame.width(), frame.height());
    Ok(frame)
}

#[cfg(test)]
pub(crate) const WHITE_PIXEL_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";
