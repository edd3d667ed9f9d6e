use std::sync::Arc;
use std::time::Instant;

use crate::capture::domain::frame_source::SharedCamera;
use crate::detection::domain::face_encoder::{Embedding, FaceEncoder};
use crate::detection::domain::face_locator::FaceLocator;
use crate::identity::domain::identity::IdentityMatch;
use crate::identity::domain::identity_matcher::IdentityMatcher;
use crate::identity::domain::snapshot_store::{SnapshotKey, SnapshotStore};
use crate::pipeline::annotation::{draw_annotations, BoxAnnotation};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::status::FaceStatus;
use crate::pipeline::throttle::ThrottleGate;
use crate::shared::frame::Frame;
use crate::shared::guarded_cell::GuardedCell;
use crate::shared::region::Region;
use crate::shared::settings::{ConfigError, FaceSettings};
use crate::stream::mjpeg_stream::AnnotatedFrameProducer;

/// Face stream state read outside the capture loop.
#[derive(Debug, Default)]
pub struct FaceState {
    pub status: GuardedCell<FaceStatus>,
    /// Most recent embedding computed by any face in any cycle.
    pub last_embedding: GuardedCell<Option<Embedding>>,
}

/// Mirrors each captured frame, recognises faces on throttled cycles and
/// draws the latest recognition result.
pub struct FacePipeline {
    camera: SharedCamera,
    locator: Box<dyn FaceLocator>,
    encoder: Box<dyn FaceEncoder>,
    matcher: Arc<dyn IdentityMatcher>,
    snapshots: Arc<dyn SnapshotStore>,
    gate: ThrottleGate,
    downscale: f64,
    state: Arc<FaceState>,
    annotations: Vec<BoxAnnotation>,
    logger: Box<dyn PipelineLogger>,
}

impl FacePipeline {
    pub fn new(
        camera: SharedCamera,
        locator: Box<dyn FaceLocator>,
        encoder: Box<dyn FaceEncoder>,
        matcher: Arc<dyn IdentityMatcher>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: &FaceSettings,
    ) -> Result<Self, ConfigError> {
        if !(settings.downscale > 0.0 && settings.downscale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "face downscale must be in (0, 1], got {}",
                settings.downscale
            )));
        }
        Ok(Self {
            camera,
            locator,
            encoder,
            matcher,
            snapshots,
            gate: ThrottleGate::new(settings.skip_frames, settings.min_interval())?,
            downscale: settings.downscale,
            state: Arc::new(FaceState::default()),
            annotations: Vec::new(),
            logger: Box::new(NullPipelineLogger),
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> Arc<FaceState> {
        self.state.clone()
    }

    /// One capture cycle as if the clock read `now`.
    ///
    /// Returns `None` only when capture failed.
    pub fn process_at(&mut self, now: Instant) -> Option<Frame> {
        let t0 = Instant::now();
        let mut frame = match self.camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Face stream: no frame this cycle ({e})");
                return None;
            }
        };
        self.logger.timing("capture", elapsed_ms(t0));
        frame.flip_horizontal();

        if self.gate.try_open(now) {
            let t1 = Instant::now();
            if let Some(annotations) = self.recognize(&frame) {
                self.annotations = annotations;
            }
            self.logger.timing("detect", elapsed_ms(t1));
        }

        draw_annotations(&mut frame, &self.annotations);
        self.logger.cycle_complete();
        Some(frame)
    }

    /// Locates, encodes and matches every face, then publishes the status.
    ///
    /// Returns `None` if location failed, leaving status and annotations as
    /// they were.
    fn recognize(&mut self, frame: &Frame) -> Option<Vec<BoxAnnotation>> {
        let small = frame.scaled(self.downscale);
        let faces = match self.locator.locate(&small) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Face location failed: {e}");
                return None;
            }
        };
        self.logger.metric("faces", faces.len() as f64);

        let t0 = Instant::now();
        let mut status = if faces.is_empty() {
            FaceStatus::no_face()
        } else {
            FaceStatus::unknown()
        };
        let mut last_embedding = None;
        let mut annotations = Vec::with_capacity(faces.len());

        for face in &faces {
            let embedding = match self.encoder.encode(&small, face) {
                Ok(embedding) => embedding,
                Err(e) => {
                    log::debug!("Skipping face at {face:?}: {e}");
                    continue;
                }
            };
            let found = self.matcher.find_match(&embedding);
            last_embedding = Some(embedding);

            let region = face.upscale(self.downscale);
            match found {
                Ok(Some(identity)) => {
                    self.persist_first_snapshot(frame, &region, &identity);
                    status = FaceStatus::recognized(&identity);
                    annotations.push(BoxAnnotation::recognized_face(region, identity.display_name()));
                }
                Ok(None) => annotations.push(BoxAnnotation::unknown_face(region)),
                Err(e) => log::warn!("Identity lookup failed for face at {region:?}: {e}"),
            }
        }
        self.logger.timing("encode", elapsed_ms(t0));

        self.state.status.set(status);
        if last_embedding.is_some() {
            self.state.last_embedding.set(last_embedding);
        }
        Some(annotations)
    }

    fn persist_first_snapshot(&self, frame: &Frame, region: &Region, identity: &IdentityMatch) {
        let key = SnapshotKey {
            name: &identity.name,
            roll_no: &identity.roll_no,
        };
        if self.snapshots.find(key).is_some() {
            return;
        }
        let Some(crop) = frame.crop(region) else {
            return;
        };
        match self.snapshots.save(&crop, key) {
            Ok(reference) => {
                if let Err(e) = self.matcher.attach_snapshot(&identity.roll_no, &reference) {
                    log::warn!("Could not link snapshot to {}: {e}", identity.display_name());
                }
            }
            Err(e) => log::warn!("Failed to save snapshot for {}: {e}", identity.display_name()),
        }
    }
}

impl AnnotatedFrameProducer for FacePipeline {
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
