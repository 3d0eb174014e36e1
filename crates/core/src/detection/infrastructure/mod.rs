pub mod detection_backend;
pub mod encoding_face_locator;
pub mod execution_provider;
pub mod math;
pub mod model_resolver;
pub mod onnx_arcface_encoder;
pub mod onnx_yolo_detector;
