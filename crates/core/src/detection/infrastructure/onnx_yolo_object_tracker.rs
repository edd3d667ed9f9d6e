/// Multi-class YOLOv8 detector with ByteTrack ids, using ONNX Runtime.
///
/// Output rows are `[cx, cy, w, h, score_0 .. score_n]`; each box takes its
/// best-scoring class. Suppression is per class and tracking never crosses
/// classes.
use std::path::Path;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::object_tracker::{Detection, ObjectTracker, TrackOptions};
use crate::shared::constants::TRACKER_MAX_LOST;
use crate::shared::frame::Frame;

use super::bytetrack_tracker::{self, ByteTracker};
use super::execution_provider::{declared_input_size, load_session};
use super::math::{letterbox, nms, yolo_rows, Candidate, Letterbox};

const DEFAULT_INPUT_SIZE: u32 = 640;

pub struct OnnxYoloObjectTracker {
    session: ort::session::Session,
    tracker: ByteTracker,
    labels: Vec<String>,
    input_size: u32,
}

impl OnnxYoloObjectTracker {
    pub fn new(model_path: &Path, labels: Vec<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!(
            "Object model input {input_size}x{input_size}, {} labels",
            labels.len()
        );
        Ok(Self {
            session,
            tracker: ByteTracker::new(TRACKER_MAX_LOST),
            labels,
            input_size,
        })
    }
}

impl ObjectTracker for OnnxYoloObjectTracker {
    fn detect_and_track(
        &mut self,
        frame: &Frame,
        options: TrackOptions,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
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

        let kept = nms(
            decode_rows(&rows, &lb, options.confidence),
            options.overlap,
            true,
        );

        if !options.persist_tracks {
            self.tracker.reset();
        }
        Ok(assign_tracks(&mut self.tracker, kept))
    }

    fn class_labels(&self) -> &[String] {
        &self.labels
    }
}

fn decode_rows(rows: &[Vec<f32>], lb: &Letterbox, confidence: f64) -> Vec<Candidate> {
    rows.iter()
        .filter(|row| row.len() > 4)
        .filter_map(|row| {
            let (class_id, score) = row[4..]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let score = *score as f64;
            if score < confidence {
                return None;
            }
            Some(Candidate {
                bbox: lb.unmap_cxcywh(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                score,
                class_id,
            })
        })
        .collect()
}

/// Runs the tracker over the kept boxes and attaches each matched track's id.
fn assign_tracks(tracker: &mut ByteTracker, kept: Vec<Candidate>) -> Vec<Detection> {
    let tracker_dets: Vec<bytetrack_tracker::Detection> = kept
        .iter()
        .map(|c| bytetrack_tracker::Detection {
            bbox: c.bbox,
            score: c.score,
            class_id: c.class_id,
        })
        .collect();
    let tracks = tracker.update(&tracker_dets);

    kept.into_iter()
        .enumerate()
        .map(|(i, c)| Detection {
            bbox: c.bbox,
            class_id: c.class_id,
            confidence: c.score,
            track_id: tracks
                .iter()
                .find(|t| t.det_index == Some(i))
                .map(|t| t.id),
        })
        .collect()
}
