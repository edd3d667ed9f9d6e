pub mod bytetrack_tracker;
pub mod coco_labels;
pub mod execution_provider;
pub mod math;
pub mod onnx_sface_encoder;
pub mod onnx_yolo_face_locator;
pub mod onnx_yolo_object_tracker;
