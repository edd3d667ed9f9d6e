use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open capture device {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("capture device has been released")]
    Released,
    #[error("failed to read from capture device: {0}")]
    Read(String),
    #[error("failed to decode captured frame: {0}")]
    Decode(String),
}

/// Owns a capture device and produces one frame per call.
///
/// A failed `capture` means "no frame this cycle"; callers retry on the next
/// cycle. `release` must be safe to call more than once.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    fn release(&mut self);

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// The one capture device every stream and the registration action read from.
///
/// Each caller captures its own frame; nothing is cached between callers.
#[derive(Clone)]
pub struct SharedCamera {
    source: Arc<Mutex<Box<dyn FrameSource>>>,
}

impl SharedCamera {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
        }
    }

    pub fn capture(&self) -> Result<Frame, CaptureError> {
        self.lock().capture()
    }

    pub fn release(&self) {
        self.lock().release();
    }

    pub fn describe(&self) -> String {
        self.lock().describe()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn FrameSource>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
