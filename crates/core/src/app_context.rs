use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::domain::frame_source::{FrameSource, SharedCamera};
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::detection::domain::face_locator::FaceLocator;
use crate::detection::domain::object_tracker::ObjectTracker;
use crate::identity::domain::identity::IdentityRecord;
use crate::identity::domain::identity_matcher::{IdentityMatcher, IdentityStoreError};
use crate::identity::domain::snapshot_store::SnapshotStore;
use crate::pipeline::delete_face_use_case::DeleteFaceUseCase;
use crate::pipeline::face_pipeline::{FacePipeline, FaceState};
use crate::pipeline::object_pipeline::ObjectPipeline;
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::pipeline::register_face_use_case::{RegisterError, RegisterFaceUseCase};
use crate::pipeline::status::{FaceStatus, ObjectCounts};
use crate::shared::guarded_cell::GuardedCell;
use crate::shared::settings::{ConfigError, Settings};
use crate::stream::mjpeg_stream::MjpegStream;

/// Cycles between debug-level pipeline summaries.
const SUMMARY_EVERY: usize = 300;

/// The concrete backends the application runs on.
pub struct Collaborators {
    pub camera: Box<dyn FrameSource>,
    pub face_locator: Box<dyn FaceLocator>,
    pub face_encoder: Box<dyn FaceEncoder>,
    pub object_tracker: Box<dyn ObjectTracker>,
    pub matcher: Arc<dyn IdentityMatcher>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

/// Everything the HTTP surface needs, built once at startup.
pub struct AppContext {
    camera: SharedCamera,
    face_stream: MjpegStream,
    object_stream: MjpegStream,
    face_state: Arc<FaceState>,
    object_counts: Arc<GuardedCell<ObjectCounts>>,
    matcher: Arc<dyn IdentityMatcher>,
    register: RegisterFaceUseCase,
    delete: DeleteFaceUseCase,
    shut_down: AtomicBool,
}

impl AppContext {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let Collaborators {
            camera,
            face_locator,
            face_encoder,
            object_tracker,
            matcher,
            snapshots,
        } = collaborators;
        let camera = SharedCamera::new(camera);

        let face = FacePipeline::new(
            camera.clone(),
            face_locator,
            face_encoder,
            matcher.clone(),
            snapshots.clone(),
            &settings.face,
        )?
        .with_logger(Box::new(LogPipelineLogger::new("face", SUMMARY_EVERY)));
        let face_state = face.state();

        let object = ObjectPipeline::new(camera.clone(), object_tracker, &settings.object)?
            .with_logger(Box::new(LogPipelineLogger::new("object", SUMMARY_EVERY)));
        let object_counts = object.counts();

        let register = RegisterFaceUseCase::new(
            camera.clone(),
            face_state.clone(),
            matcher.clone(),
            snapshots.clone(),
        );
        let delete = DeleteFaceUseCase::new(matcher.clone(), snapshots);

        log::info!("Capturing from {}", camera.describe());
        Ok(Self {
            face_stream: MjpegStream::new("face", Box::new(face), &settings.stream),
            object_stream: MjpegStream::new("object", Box::new(object), &settings.stream),
            camera,
            face_state,
            object_counts,
            matcher,
            register,
            delete,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn face_stream(&self) -> &MjpegStream {
        &self.face_stream
    }

    pub fn object_stream(&self) -> &MjpegStream {
        &self.object_stream
    }

    pub fn current_face_status(&self) -> FaceStatus {
        self.face_state.status.get()
    }

    pub fn current_object_counts(&self) -> ObjectCounts {
        self.object_counts.get()
    }

    pub fn register_face(&self, name: &str, roll_no: &str) -> Result<IdentityRecord, RegisterError> {
        self.register.execute(name, roll_no)
    }

    pub fn delete_face(&self, roll_no: &str) -> Result<bool, IdentityStoreError> {
        self.delete.execute(roll_no)
    }

    pub fn face_count(&self) -> Result<usize, IdentityStoreError> {
        self.matcher.count()
    }

    pub fn list_faces(&self) -> Result<Vec<IdentityRecord>, IdentityStoreError> {
        self.matcher.list()
    }

    /// Emits the pipeline summaries and releases the camera. Only the first
    /// call has any effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.face_stream.finish();
        self.object_stream.finish();
        self.camera.release();
        log::info!("Capture device released");
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::infrastructure::fs_snapshot_store::FsSnapshotStore;
    use crate::identity::infrastructure::sqlite_identity_store::SqliteIdentityStore;
    use crate::shared::region::Region;
    use crate::testing::{
        axis_embedding, detection, FakeEncoder, FakeLocator, FakeObjectTracker, ScriptedSource,
    };
    use tempfile::TempDir;

    fn context(source: ScriptedSource, tmp: &TempDir) -> AppContext {
        let collaborators = Collaborators {
            camera: Box::new(source),
            face_locator: Box::new(FakeLocator::returning(vec![Region::new(10, 10, 20, 22)])),
            face_encoder: Box::new(FakeEncoder::constant(axis_embedding(4))),
            object_tracker: Box::new(FakeObjectTracker::returning(
                &["person", "dog"],
                vec![
                    detection([0.0, 100.0, 50.0, 200.0], 0, 0.9, Some(1)),
                    detection([60.0, 100.0, 120.0, 200.0], 0, 0.8, Some(2)),
                    detection([150.0, 150.0, 250.0, 250.0], 1, 0.7, Some(3)),
                ],
            )),
            matcher: Arc::new(SqliteIdentityStore::open_in_memory(0.6).unwrap()),
            snapshots: Arc::new(FsSnapshotStore::open(tmp.path()).unwrap()),
        };
        AppContext::new(collaborators, &Settings::default()).unwrap()
    }

    #[test]
    fn test_streams_update_status_snapshots() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(ScriptedSource::always(160, 120), &tmp);

        assert_eq!(ctx.current_face_status(), FaceStatus::no_face());
        assert!(ctx.face_stream().next_part().is_some());
        assert!(ctx.object_stream().next_part().is_some());

        assert_eq!(ctx.current_face_status(), FaceStatus::unknown());
        let counts = ctx.current_object_counts();
        assert_eq!(counts.get("person"), Some(&2));
        assert_eq!(counts.get("dog"), Some(&1));
    }

    #[test]
    fn test_register_then_recognize() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(ScriptedSource::always(160, 120), &tmp);
        assert!(matches!(
            ctx.register_face("Alice", "A1"),
            Err(RegisterError::NoFaceObserved)
        ));

        ctx.face_stream().next_part().unwrap();
        ctx.register_face("Alice", "A1").unwrap();
        assert_eq!(ctx.face_count().unwrap(), 1);

        // Skip factor 2: the next detection cycle is two pulls later
        std::thread::sleep(std::time::Duration::from_millis(110));
        ctx.face_stream().next_part().unwrap();
        ctx.face_stream().next_part().unwrap();
        assert_eq!(ctx.current_face_status().name.as_deref(), Some("Alice (A1)"));

        assert!(ctx.delete_face("A1").unwrap());
        assert_eq!(ctx.face_count().unwrap(), 0);
        assert!(ctx.list_faces().unwrap().is_empty());
    }

    #[test]
    fn test_failed_captures_yield_empty_pulls() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(ScriptedSource::failing(), &tmp);
        for _ in 0..10 {
            assert!(ctx.face_stream().next_part().is_none());
            assert!(ctx.object_stream().next_part().is_none());
        }
        assert_eq!(ctx.current_face_status(), FaceStatus::no_face());
        assert!(ctx.current_object_counts().is_empty());
    }

    #[test]
    fn test_camera_released_once() {
        let tmp = TempDir::new().unwrap();
        let source = ScriptedSource::always(32, 32);
        let releases = source.release_counter();
        let ctx = context(source, &tmp);

        ctx.shutdown();
        ctx.shutdown();
        drop(ctx);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_drop() {
        let tmp = TempDir::new().unwrap();
        let source = ScriptedSource::always(32, 32);
        let releases = source.release_counter();
        drop(context(source, &tmp));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.face.skip_frames = 0;
        let collaborators = Collaborators {
            camera: Box::new(ScriptedSource::always(8, 8)),
            face_locator: Box::new(FakeLocator::none()),
            face_encoder: Box::new(FakeEncoder::constant(axis_embedding(0))),
            object_tracker: Box::new(FakeObjectTracker::returning(&["person"], Vec::new())),
            matcher: Arc::new(SqliteIdentityStore::open_in_memory(0.6).unwrap()),
            snapshots: Arc::new(FsSnapshotStore::open(tmp.path()).unwrap()),
        };
        assert!(AppContext::new(collaborators, &settings).is_err());
    }
}
