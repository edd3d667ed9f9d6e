use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::settings::StreamSettings;
use crate::stream::jpeg::{encode_jpeg, multipart_part};

/// Produces the next annotated frame of one logical stream.
pub trait AnnotatedFrameProducer: Send {
    /// `None` means no frame this cycle; the caller retries.
    fn pull(&mut self) -> Option<Frame>;

    /// Called once when the stream shuts down. Default: no-op.
    fn finish(&mut self) {}
}

/// One MJPEG stream over a shared producer.
///
/// Every viewer pulls through the same producer, so concurrent viewers each
/// drive their own capture and inference cycle and split the frames between
/// them.
#[derive(Clone)]
pub struct MjpegStream {
    name: String,
    producer: Arc<Mutex<Box<dyn AnnotatedFrameProducer>>>,
    quality: u8,
    backoff: Duration,
}

impl MjpegStream {
    pub fn new(name: &str, producer: Box<dyn AnnotatedFrameProducer>, settings: &StreamSettings) -> Self {
        Self {
            name: name.to_string(),
            producer: Arc::new(Mutex::new(producer)),
            quality: settings.jpeg_quality,
            backoff: Duration::from_millis(settings.empty_pull_backoff_ms),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long to wait after an empty pull before pulling again.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Pulls one frame and returns it as a multipart chunk.
    ///
    /// The producer lock covers only the pull; JPEG encoding runs after it
    /// is released. Blocks for a full capture and inference cycle.
    pub fn next_part(&self) -> Option<Vec<u8>> {
        let frame = self.lock().pull()?;
        match encode_jpeg(&frame, self.quality) {
            Ok(jpeg) => Some(multipart_part(&jpeg)),
            Err(e) => {
                log::warn!("{} stream: dropping frame {}: {e}", self.name, frame.index());
                None
            }
        }
    }

    pub fn finish(&self) {
        self.lock().finish();
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn AnnotatedFrameProducer>> {
        self.producer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
