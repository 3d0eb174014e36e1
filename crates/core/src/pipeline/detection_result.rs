use std::fmt::Display;

use serde::Serialize;

use crate::error::DetectionError;
use crate::expression::domain::expression_vector::ExpressionVector;
use crate::shared::face_box::FaceBox;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub face_box: FaceBox,
    pub confidence: f64,
    pub expressions: ExpressionVector,
}

/// Outcome of one detection request.
///
/// `face_count` is only present on success and `error` only on failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub faces: Vec<DetectedFace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<usize>,
}

impl DetectionResult {
    pub fn success(faces: Vec<DetectedFace>) -> Self {
        let count = faces.len();
        Self {
            success: true,
            error: None,
            faces,
            face_count: Some(count),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            faces: Vec::new(),
            face_count: None,
        }
    }

    /// Failure caught while processing the image.
    pub fn detection_failed(reason: impl Display) -> Self {
        Self::failure(format!("Face detection failed: {reason}"))
    }
}

impl From<DetectionError> for DetectionResult {
    fn from(e: DetectionError) -> Self {
        match e {
            // Already carries its own user-facing prefix
            DetectionError::BackendUnavailable(_) => Self::failure(e.to_string()),
            other => Self::detection_failed(other),
        }
    }
}
