/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS post-processing.
/// Keypoint columns of pose-style face models are ignored.
use std::path::Path;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::execution_provider::{declared_input_size, load_session};
use super::math::{letterbox, nms, yolo_rows, Candidate};

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.25;

const NMS_IOU_THRESH: f64 = 0.45;

pub struct OnnxYoloFaceLocator {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloFaceLocator {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!("Face locator input {input_size}x{input_size}");
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceLocator for OnnxYoloFaceLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let (input_tensor, lb) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(DetectionError::NoOutput.into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or(DetectionError::NonContiguous)?;
        let rows = yolo_rows(&shape, data).ok_or(DetectionError::UnexpectedShape(shape))?;

        // row format: [cx, cy, w, h, conf, keypoints...]
        let candidates = rows
            .iter()
            .filter(|row| row.len() >= 5 && row[4] as f64 >= self.confidence)
            .map(|row| Candidate {
                bbox: lb.unmap_cxcywh(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                score: row[4] as f64,
                class_id: 0,
            })
            .collect();

        Ok(decoded_to_regions(
            nms(candidates, NMS_IOU_THRESH, false),
            frame.width(),
            frame.height(),
        ))
    }
}

fn decoded_to_regions(kept: Vec<Candidate>, width: u32, height: u32) -> Vec<Region> {
    kept.iter()
        .filter_map(|c| Region::from_xyxy(&c.bbox).clamped(width, height))
        .collect()
}
