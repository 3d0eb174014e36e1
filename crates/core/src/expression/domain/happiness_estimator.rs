use ndarray::ArrayView2;

use crate::expression::domain::intensity::{mean_and_variance, mouth_region, to_grayscale};
use crate::expression::domain::smile_detector::SmileDetectorSource;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Score returned when nothing better can be said about a face.
pub const NEUTRAL_HAPPINESS: f64 = 0.4;

pub const MIN_HAPPINESS: f64 = 0.1;
pub const MAX_HAPPINESS: f64 = 1.0;

/// Happiness assigned to any face with a detected smile, before the size bonus.
const SMILE_BASE: f64 = 0.7;

/// Upper bound on smile area relative to face area.
const MAX_SMILE_RATIO: f64 = 0.3;

const BRIGHTNESS_BASE: f64 = 0.3;
const VARIANCE_DIVISOR: f64 = 10_000.0;
const MEAN_DIVISOR: f64 = 512.0;

/// Two-tier happiness heuristic for a single cropped face.
///
/// 1. If a smile detector is installed and finds a match, the score is
///    `0.7 + min(largest_smile_area / face_area, 0.3)`.
/// 2. Otherwise the mouth region's brightness statistics are used:
///    `0.3 + variance / 10000 + mean / 512`.
///
/// Every result is clamped to [0.1, 1.0]. Failures never propagate; they
/// are logged and reported as [`NEUTRAL_HAPPINESS`].
pub struct HappinessEstimator {
    smiles: Box<dyn SmileDetectorSource>,
}

impl HappinessEstimator {
    pub fn new(smiles: Box<dyn SmileDetectorSource>) -> Self {
        Self { smiles }
    }

    /// Scores `face`, a crop whose bounding box was `face_width x face_height`.
    pub fn estimate(&self, face: &Frame, face_width: i32, face_height: i32) -> f64 {
        match self.try_estimate(face, face_width, face_height) {
            Ok(happiness) => happiness,
            Err(e) => {
                log::warn!("Error in happiness estimation: {e}");
                NEUTRAL_HAPPINESS
            }
        }
    }

    fn try_estimate(
        &self,
        face: &Frame,
        face_width: i32,
        face_height: i32,
    ) -> Result<f64, Box<dyn std::error::Error>> {
        let gray = to_grayscale(face)?;

        if let Some(detector) = self.smiles.load()? {
            let smiles = detector.detect_smiles(gray.view())?;
            if let Some(happiness) = smile_happiness(&smiles, face_width, face_height)? {
                log::debug!("Smile match: happiness {happiness:.3}");
                return Ok(happiness);
            }
            log::debug!("No smile match; using brightness heuristic");
        }

        Ok(brightness_happiness(mouth_region(
            gray.view(),
            face_width,
            face_height,
        )))
    }
}

/// Happiness from the largest smile match, or `None` when there is none.
fn smile_happiness(
    smiles: &[FaceBox],
    face_width: i32,
    face_height: i32,
) -> Result<Option<f64>, Box<dyn std::error::Error>> {
    let Some(largest) = smiles.iter().max_by_key(|s| s.area()) else {
        return Ok(None);
    };
    let face_area = face_width as i64 * face_height as i64;
    if face_area <= 0 {
        return Err(format!("face has no area ({face_width}x{face_height})").into());
    }
    let ratio = (largest.area() as f64 / face_area as f64).min(MAX_SMILE_RATIO);
    Ok(Some(clamp_happiness(SMILE_BASE + ratio)))
}

fn brightness_happiness(mouth: ArrayView2<'_, u8>) -> f64 {
    match mean_and_variance(mouth) {
        Some((mean, variance)) => {
            clamp_happiness(BRIGHTNESS_BASE + variance / VARIANCE_DIVISOR + mean / MEAN_DIVISOR)
        }
        None => NEUTRAL_HAPPINESS,
    }
}

pub fn clamp_happiness(happiness: f64) -> f64 {
    happiness.clamp(MIN_HAPPINESS, MAX_HAPPINESS)
}
