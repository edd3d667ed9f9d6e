use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::Frame;

/// Serves the same decoded image on every capture.
///
/// Stands in for a camera when replaying a still scene or running without
/// hardware.
pub struct StillImageSource {
    path: PathBuf,
    frame: Option<Frame>,
    frame_index: usize,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let image = image::open(path).map_err(|e| CaptureError::Open {
            device: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            frame: Some(Frame::from_rgb_image(image.to_rgb8(), 0)),
            frame_index: 0,
        })
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let template = self.frame.as_ref().ok_or(CaptureError::Released)?;
        let frame = Frame::new(
            template.data().to_vec(),
            template.width(),
            template.height(),
            template.channels(),
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.frame = None;
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}
