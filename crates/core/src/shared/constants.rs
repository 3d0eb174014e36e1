pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Application directory name under the platform cache/config directories.
pub const APP_DIR_NAME: &str = "FaceMood";

/// Confidence reported for every located face, independent of the backend score.
pub const REPORTED_FACE_CONFIDENCE: f64 = 0.95;

pub const SMILE_CASCADE_FILENAME: &str = "haarcascade_smile.xml";
pub const SMILE_CASCADE_ENV: &str = "FACEMOOD_SMILE_CASCADE";

/// Where OpenCV distributions usually install their Haar cascades.
pub const OPENCV_CASCADE_DIRS: &[&str] = &[
    "/usr/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/local/share/opencv/haarcascades",
    "/opt/homebrew/share/opencv4/haarcascades",
    "C:\\opencv\\build\\etc\\haarcascades",
];

pub const SMILE_SCALE_FACTOR: f64 = 1.8;
pub const SMILE_MIN_NEIGHBORS: usize = 20;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
