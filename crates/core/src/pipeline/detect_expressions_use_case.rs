use std::time::Instant;

use crate::detection::infrastructure::detection_backend::DetectionBackend;
use crate::error::DetectionError;
use crate::expression::domain::expression_vector::ExpressionVector;
use crate::expression::domain::happiness_estimator::HappinessEstimator;
use crate::pipeline::detection_result::{DetectedFace, DetectionResult};
use crate::shared::constants::REPORTED_FACE_CONFIDENCE;
use crate::shared::image_payload::decode_image_payload;

/// Single-image pipeline: decode → locate → crop → score → expression vector.
///
/// Never fails as a whole: request-level errors become a `success: false`
/// result and per-face scoring errors degrade to the neutral score.
pub struct DetectExpressionsUseCase<'a> {
    backend: &'a DetectionBackend,
    estimator: HappinessEstimator,
}

impl<'a> DetectExpressionsUseCase<'a> {
    pub fn new(backend: &'a DetectionBackend, estimator: HappinessEstimator) -> Self {
        Self { backend, estimator }
    }

    /// Runs detection on a base64 (optionally data-URL) encoded image.
    pub fn execute(&self, payload: &str) -> DetectionResult {
        match self.detect(payload) {
            Ok(faces) => DetectionResult::success(faces),
            Err(e) => {
                log::warn!("Face detection failed: {e}");
                e.into()
            }
        }
    }

    /// Result for a payload that cannot be processed at all.
    ///
    /// An unavailable backend is still reported first.
    pub fn reject(&self, reason: &str) -> DetectionResult {
        match self.backend.check_ready() {
            Err(e) => e.into(),
            Ok(()) => DetectionResult::detection_failed(reason),
        }
    }

    fn detect(&self, payload: &str) -> Result<Vec<DetectedFace>, DetectionError> {
        self.backend.check_ready()?;

        let start = Instant::now();
        let frame = decode_image_payload(payload)?;
        let decoded = start.elapsed();

        let located = self.backend.locate_faces(&frame)?;
        let after_locate = start.elapsed();
        log::debug!(
            "Decode {:.1}ms, locate {:.1}ms ({} faces)",
            decoded.as_secs_f64() * 1000.0,
            (after_locate - decoded).as_secs_f64() * 1000.0,
            located.len()
        );

        let faces: Vec<DetectedFace> = located
            .iter()
            .map(|face| {
                let b = face.face_box;
                let crop = frame.crop(&b);
                let happiness = self.estimator.estimate(&crop, b.width, b.height);
                DetectedFace {
                    face_box: b,
                    confidence: REPORTED_FACE_CONFIDENCE,
                    expressions: ExpressionVector::from_happiness(happiness),
                }
            })
            .collect();

        log::info!(
            "Detected {} face(s) in {}x{} image in {:.1}ms",
            faces.len(),
            frame.width(),
            frame.height(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(faces)
    }
}
