/// SFace face recogniser using ONNX Runtime.
///
/// Crops the face box, resizes it to 112x112 and produces a 128-d embedding,
/// L2-normalised so distances between embeddings stay in `[0, 2]`.
use std::path::Path;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::face_encoder::{Embedding, FaceEncoder};
use crate::shared::constants::EMBEDDING_DIM;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::execution_provider::load_session;
use super::math::l2_normalize;

const INPUT_SIZE: u32 = 112;

pub struct OnnxSfaceEncoder {
    session: ort::session::Session,
}

impl OnnxSfaceEncoder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }
}

impl FaceEncoder for OnnxSfaceEncoder {
    fn encode(
        &mut self,
        frame: &Frame,
        face: &Region,
    ) -> Result<Embedding, Box<dyn std::error::Error>> {
        let crop = frame.crop(face).ok_or(DetectionError::EmptyCrop)?;
        let input_value = ort::value::Tensor::from_array(preprocess(&crop))?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(DetectionError::NoOutput.into());
        }
        let array = outputs[0].try_extract_array::<f32>()?;
        let slice = array.as_slice().ok_or(DetectionError::NonContiguous)?;
        if slice.len() != EMBEDDING_DIM {
            return Err(DetectionError::EmbeddingSize {
                expected: EMBEDDING_DIM,
                actual: slice.len(),
            }
            .into());
        }

        let mut values = slice.to_vec();
        l2_normalize(&mut values);
        Ok(Embedding::new(values))
    }
}

/// Resize to 112x112 and lay out as NCHW in BGR order with raw 0-255 values,
/// which is what the SFace export expects.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let face = crop.resized(INPUT_SIZE, INPUT_SIZE);
    let src = face.as_ndarray();
    let n = INPUT_SIZE as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, n, n));
    for y in 0..n {
        for x in 0..n {
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[y, x, 2 - c]] as f32;
            }
        }
    }
    tensor
}
