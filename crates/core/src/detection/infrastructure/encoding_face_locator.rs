use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::detection::domain::face_locator::{FaceLocator, LocatedFace};
use crate::shared::frame::Frame;

/// Locator composed of a box detector and an optional encoder.
///
/// Each detected box is cropped from the frame and encoded independently.
/// Without an encoder, faces carry an empty encoding.
pub struct EncodingFaceLocator {
    detector: Box<dyn FaceDetector>,
    encoder: Option<Box<dyn FaceEncoder>>,
}

impl EncodingFaceLocator {
    pub fn new(detector: Box<dyn FaceDetector>, encoder: Option<Box<dyn FaceEncoder>>) -> Self {
        Self { detector, encoder }
    }
}

impl FaceLocator for EncodingFaceLocator {
    fn locate_faces(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<LocatedFace>, Box<dyn std::error::Error>> {
        let boxes = self.detector.detect(frame)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for face_box in boxes {
            let encoding = match self.encoder.as_mut() {
                Some(encoder) => encoder.encode(&frame.crop(&face_box))?,
                None => Vec::new(),
            };
            faces.push(LocatedFace { face_box, encoding });
        }
        Ok(faces)
    }
}
