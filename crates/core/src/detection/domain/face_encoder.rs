use crate::shared::frame::Frame;

/// Domain interface for turning a cropped face into a fixed-length
/// feature vector.
pub trait FaceEncoder: Send {
    fn encode(&mut self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
