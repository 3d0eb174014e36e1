use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// A face found in an image together with its feature encoding.
///
/// `encoding` is empty when the backend was configured without an encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatedFace {
    pub face_box: FaceBox,
    pub encoding: Vec<f32>,
}

/// Capability interface consumed by the expression pipeline.
///
/// Any backend that can turn an RGB frame into boxes and encodings can be
/// swapped in without touching the estimator. No ordering is guaranteed.
pub trait FaceLocator: Send {
    fn locate_faces(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<LocatedFace>, Box<dyn std::error::Error>>;
}
