use thiserror::Error;

/// Whole-request detection failures.
///
/// Every variant is caught by the detection use case and reported as a
/// `success: false` result; none of them reach the transport layer.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("cannot decode image: {0}")]
    UndecodableImage(#[from] image::ImageError),

    #[error("image has no pixels")]
    EmptyImage,

    #[error("face locator failed: {0}")]
    Locator(String),

    #[error("Face detection backend unavailable: {0}")]
    BackendUnavailable(String),
}
