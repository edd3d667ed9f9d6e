use thiserror::Error;

/// Failures raised by the inference backends themselves.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("model produced no outputs")]
    NoOutput,
    #[error("unexpected output shape {0:?}")]
    UnexpectedShape(Vec<usize>),
    #[error("output tensor is not contiguous")]
    NonContiguous,
    #[error("face region is empty after clamping to the frame")]
    EmptyCrop,
    #[error("embedding has {actual} values, expected {expected}")]
    EmbeddingSize { expected: usize, actual: usize },
}
