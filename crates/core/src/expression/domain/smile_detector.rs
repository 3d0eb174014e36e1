use ndarray::ArrayView2;

use crate::shared::face_box::FaceBox;

/// Finds smile-shaped regions in a grayscale face crop.
///
/// Returned rectangles are in crop coordinates.
pub trait SmileDetector {
    fn detect_smiles(
        &self,
        gray: ArrayView2<'_, u8>,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}

/// Supplies a freshly loaded smile detector for one estimation.
///
/// `Ok(None)` means no detector resource is installed and the caller should
/// use its fallback; `Err` means a resource exists but could not be loaded.
pub trait SmileDetectorSource: Send + Sync {
    fn load(&self) -> Result<Option<Box<dyn SmileDetector>>, Box<dyn std::error::Error>>;
}
