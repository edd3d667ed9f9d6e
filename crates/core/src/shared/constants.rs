pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "face_recognition_sface_2021dec.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/opencv/opencv_zoo/raw/main/models/face_recognition_sface/face_recognition_sface_2021dec.onnx";

/// Exported with `yolo export model=yolov8n.pt format=onnx`; never downloaded.
pub const OBJECT_MODEL_NAME: &str = "yolov8n.onnx";

/// Length of every face embedding.
pub const EMBEDDING_DIM: usize = 128;

/// Max detection cycles an object track can be lost before removal.
pub const TRACKER_MAX_LOST: usize = 30;

pub const SNAPSHOT_EXTENSION: &str = "jpg";

/// Multipart boundary shared by both MJPEG streams.
pub const STREAM_BOUNDARY: &str = "frame";

/// File extensions a `--device` argument is treated as a still image for.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
