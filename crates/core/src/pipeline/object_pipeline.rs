use std::sync::Arc;
use std::time::Instant;

use crate::capture::domain::frame_source::SharedCamera;
use crate::detection::domain::object_tracker::{Detection, ObjectTracker, TrackOptions};
use crate::pipeline::annotation::{draw_annotations, draw_count_overlay, object_label, BoxAnnotation};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::status::ObjectCounts;
use crate::pipeline::throttle::ThrottleGate;
use crate::shared::frame::Frame;
use crate::shared::guarded_cell::GuardedCell;
use crate::shared::region::Region;
use crate::shared::settings::{ConfigError, ObjectSettings};
use crate::stream::mjpeg_stream::AnnotatedFrameProducer;

/// Mirrors each captured frame, detects and tracks objects on throttled
/// cycles, and keeps the per-class count table of the latest cycle.
pub struct ObjectPipeline {
    camera: SharedCamera,
    tracker: Box<dyn ObjectTracker>,
    gate: ThrottleGate,
    input_size: u32,
    options: TrackOptions,
    counts: Arc<GuardedCell<ObjectCounts>>,
    annotations: Vec<BoxAnnotation>,
    logger: Box<dyn PipelineLogger>,
}

impl ObjectPipeline {
    pub fn new(
        camera: SharedCamera,
        tracker: Box<dyn ObjectTracker>,
        settings: &ObjectSettings,
    ) -> Result<Self, ConfigError> {
        if settings.input_size == 0 {
            return Err(ConfigError::Invalid("object input size must be > 0".to_string()));
        }
        Ok(Self {
            camera,
            tracker,
            gate: ThrottleGate::every(settings.min_interval()),
            input_size: settings.input_size,
            options: TrackOptions {
                confidence: settings.confidence,
                overlap: settings.overlap,
                persist_tracks: settings.persist_tracks,
            },
            counts: Arc::new(GuardedCell::new(ObjectCounts::new())),
            annotations: Vec::new(),
            logger: Box::new(NullPipelineLogger),
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn counts(&self) -> Arc<GuardedCell<ObjectCounts>> {
        self.counts.clone()
    }

    /// One capture cycle as if the clock read `now`.
    pub fn process_at(&mut self, now: Instant) -> Option<Frame> {
        let t0 = Instant::now();
        let mut frame = match self.camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Object stream: no frame this cycle ({e})");
                return None;
            }
        };
        self.logger.timing("capture", elapsed_ms(t0));
        frame.flip_horizontal();

        if self.gate.try_open(now) {
            let t1 = Instant::now();
            self.annotations = self.detect(&frame);
            self.logger.timing("detect", elapsed_ms(t1));
        }

        draw_annotations(&mut frame, &self.annotations);
        let counts = self.counts.get();
        draw_count_overlay(&mut frame, &counts);
        self.logger.cycle_complete();
        Some(frame)
    }

    /// Runs the tracker on the square model input, replaces the count table
    /// with this cycle's detections and returns their boxes in frame
    /// coordinates.
    fn detect(&mut self, frame: &Frame) -> Vec<BoxAnnotation> {
        let input = frame.resized(self.input_size, self.input_size);
        let detections = match self.tracker.detect_and_track(&input, self.options) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("Object detection failed: {e}");
                Vec::new()
            }
        };
        self.logger.metric("detections", detections.len() as f64);

        let labels: Vec<String> = detections.iter().map(|d| self.label_for(d)).collect();
        self.counts.update(|table| {
            table.clear();
            for label in &labels {
                *table.entry(label.clone()).or_insert(0) += 1;
            }
        });

        let sx = frame.width() as f64 / self.input_size as f64;
        let sy = frame.height() as f64 / self.input_size as f64;
        detections
            .iter()
            .zip(labels)
            .map(|(d, label)| {
                let region = Region::from_scaled_xyxy(&d.bbox, sx, sy);
                BoxAnnotation::object(region, object_label(&label, d.confidence as f32, d.track_id))
            })
            .collect()
    }

    fn label_for(&self, detection: &Detection) -> String {
        self.tracker
            .class_label(detection.class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class {}", detection.class_id))
    }
}

impl AnnotatedFrameProducer for ObjectPipeline {
    fn pull(&mut self) -> Option<Frame> {
        self.process_at(Instant::now())
    }

    fn finish(&mut self) {
        self.logger.summary();
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
