//! Shared math utilities for the ONNX detection backends.
//!
//! Letterbox preprocessing, greedy NMS and box IoU for the YOLO decoders,
//! and vector normalisation for the face encoder.

use crate::shared::frame::Frame;

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// A decoded box before suppression.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: [f64; 4],
    pub score: f64,
    pub class_id: usize,
}

/// Greedy NMS: sort by score descending, suppress boxes overlapping a kept
/// one by more than `iou_thresh`. With `per_class`, boxes of different
/// classes never suppress each other.
pub fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64, per_class: bool) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = keep.iter().any(|k| {
            (!per_class || k.class_id == cand.class_id) && bbox_iou(&k.bbox, &cand.bbox) > iou_thresh
        });
        if !suppressed {
            keep.push(cand);
        }
    }
    keep
}

/// Maps between a source frame and its letterboxed model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Converts a centre-format box in model input space to `[x1, y1, x2, y2]`
    /// in source frame space.
    pub fn unmap_cxcywh(&self, cx: f64, cy: f64, w: f64, h: f64) -> [f64; 4] {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        [
            ((cx - w / 2.0) - px) / self.scale,
            ((cy - h / 2.0) - py) / self.scale,
            ((cx + w / 2.0) - px) / self.scale,
            ((cy + h / 2.0) - py) / self.scale,
        ]
    }
}

/// Letterbox-resize a frame to `target_size` x `target_size`, normalised to
/// `[0, 1]` in NCHW layout with YOLO's 114 grey padding.
pub fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resample into the padded area
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// Reads a YOLO output tensor as rows of features regardless of whether the
/// model emits `[1, features, boxes]` or `[1, boxes, features]`.
pub fn yolo_rows(shape: &[usize], data: &[f32]) -> Option<Vec<Vec<f32>>> {
    if shape.len() != 3 {
        return None;
    }
    let transposed = shape[1] < shape[2];
    let (num_boxes, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_boxes * num_feats {
        return None;
    }

    let rows = (0..num_boxes)
        .map(|i| {
            if transposed {
                (0..num_feats).map(|f| data[f * num_boxes + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            }
        })
        .collect();
    Some(rows)
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
