use std::sync::Arc;

use thiserror::Error;

use crate::capture::domain::frame_source::{CaptureError, SharedCamera};
use crate::identity::domain::identity::{Identity, IdentityRecord};
use crate::identity::domain::identity_matcher::{IdentityMatcher, IdentityStoreError};
use crate::identity::domain::snapshot_store::{SnapshotKey, SnapshotStore};
use crate::pipeline::face_pipeline::FaceState;

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("name and roll number are required")]
    MissingField,
    #[error("no face has been seen yet")]
    NoFaceObserved,
    #[error("could not capture a snapshot frame: {0}")]
    Capture(#[from] CaptureError),
    #[error("roll number {0} is already registered")]
    DuplicateId(String),
    #[error(transparent)]
    Store(IdentityStoreError),
}

impl From<IdentityStoreError> for RegisterError {
    fn from(e: IdentityStoreError) -> Self {
        match e {
            IdentityStoreError::DuplicateId(id) => RegisterError::DuplicateId(id),
            other => RegisterError::Store(other),
        }
    }
}

/// Enrolls the face most recently seen by the face stream under a new
/// name and roll number.
pub struct RegisterFaceUseCase {
    camera: SharedCamera,
    face_state: Arc<FaceState>,
    matcher: Arc<dyn IdentityMatcher>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl RegisterFaceUseCase {
    pub fn new(
        camera: SharedCamera,
        face_state: Arc<FaceState>,
        matcher: Arc<dyn IdentityMatcher>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            camera,
            face_state,
            matcher,
            snapshots,
        }
    }

    /// Captures a fresh frame as the snapshot and stores the identity.
    ///
    /// A snapshot that cannot be written does not stop the registration.
    pub fn execute(&self, name: &str, roll_no: &str) -> Result<IdentityRecord, RegisterError> {
        let (name, roll_no) = (name.trim(), roll_no.trim());
        if name.is_empty() || roll_no.is_empty() {
            return Err(RegisterError::MissingField);
        }
        let embedding = self
            .face_state
            .last_embedding
            .get()
            .ok_or(RegisterError::NoFaceObserved)?;
        if self.matcher.contains(roll_no)? {
            return Err(RegisterError::DuplicateId(roll_no.to_string()));
        }

        let frame = self.camera.capture()?;
        let key = SnapshotKey { name, roll_no };
        let snapshot_ref = match self.snapshots.save(&frame, key) {
            Ok(reference) => Some(reference),
            Err(e) => {
                log::warn!("Registering {name} ({roll_no}) without a snapshot: {e}");
                None
            }
        };

        let enrolled = self.matcher.enroll(Identity {
            name: name.to_string(),
            roll_no: roll_no.to_string(),
            embedding,
            snapshot_ref: snapshot_ref.clone(),
        });
        if let Err(e) = enrolled {
            if snapshot_ref.is_some() {
                if let Err(cleanup) = self.snapshots.delete(key) {
                    log::warn!("Could not remove snapshot of failed registration: {cleanup}");
                }
            }
            return Err(e.into());
        }

        log::info!("Registered {name} ({roll_no})");
        Ok(IdentityRecord {
            name: name.to_string(),
            roll_no: roll_no.to_string(),
            snapshot_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::infrastructure::fs_snapshot_store::FsSnapshotStore;
    use crate::identity::infrastructure::sqlite_identity_store::SqliteIdentityStore;
    use crate::pipeline::delete_face_use_case::DeleteFaceUseCase;
    use crate::testing::{axis_embedding, FailingSnapshotStore, ScriptedSource};
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        use_case: RegisterFaceUseCase,
        state: Arc<FaceState>,
        store: Arc<SqliteIdentityStore>,
        snapshots: Arc<dyn SnapshotStore>,
        tmp: TempDir,
    }

    fn harness_with(source: ScriptedSource, failing_snapshots: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteIdentityStore::open_in_memory(0.6).unwrap());
        let snapshots: Arc<dyn SnapshotStore> = if failing_snapshots {
            Arc::new(FailingSnapshotStore)
        } else {
            Arc::new(FsSnapshotStore::open(tmp.path()).unwrap())
        };
        let state = Arc::new(FaceState::default());
        let use_case = RegisterFaceUseCase::new(
            SharedCamera::new(Box::new(source)),
            state.clone(),
            store.clone(),
            snapshots.clone(),
        );
        Harness {
            use_case,
            state,
            store,
            snapshots,
            tmp,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedSource::always(64, 48), false)
    }

    fn jpg_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_register_without_observed_face_fails() {
        let h = harness();
        let result = h.use_case.execute("Alice", "A1");
        assert!(matches!(result, Err(RegisterError::NoFaceObserved)));
        assert_eq!(h.store.count().unwrap(), 0);
    }

    #[test]
    fn test_register_stores_identity_and_snapshot() {
        let h = harness();
        h.state.last_embedding.set(Some(axis_embedding(2)));

        let record = h.use_case.execute(" Alice ", "A1").unwrap();

        assert_eq!(record.name, "Alice");
        let reference = record.snapshot_ref.unwrap();
        assert!(Path::new(&reference).exists());
        assert_eq!(
            h.store.record("A1").unwrap().unwrap().snapshot_ref,
            Some(reference)
        );
        let found = h.store.find_match(&axis_embedding(2)).unwrap().unwrap();
        assert_eq!(found.display_name(), "Alice (A1)");
    }

    #[test]
    fn test_duplicate_roll_number_rejected() {
        let h = harness();
        h.state.last_embedding.set(Some(axis_embedding(2)));
        h.use_case.execute("Alice", "A1").unwrap();

        let result = h.use_case.execute("Alicia", "A1");

        assert!(matches!(result, Err(RegisterError::DuplicateId(id)) if id == "A1"));
        assert_eq!(h.store.count().unwrap(), 1);
        assert_eq!(jpg_count(h.tmp.path()), 1);
    }

    #[test]
    fn test_reregister_after_delete_succeeds() {
        let h = harness();
        h.state.last_embedding.set(Some(axis_embedding(2)));
        h.use_case.execute("Alice", "A1").unwrap();

        let delete = DeleteFaceUseCase::new(h.store.clone(), h.snapshots.clone());
        assert!(delete.execute("A1").unwrap());

        assert!(h.use_case.execute("Alice", "A1").is_ok());
        assert_eq!(h.store.count().unwrap(), 1);
    }

    #[test]
    fn test_capture_failure_registers_nothing() {
        let h = harness_with(ScriptedSource::failing(), false);
        h.state.last_embedding.set(Some(axis_embedding(2)));

        let result = h.use_case.execute("Alice", "A1");

        assert!(matches!(result, Err(RegisterError::Capture(_))));
        assert!(!h.store.contains("A1").unwrap());
    }

    #[test]
    fn test_snapshot_failure_still_registers() {
        let h = harness_with(ScriptedSource::always(64, 48), true);
        h.state.last_embedding.set(Some(axis_embedding(2)));

        let record = h.use_case.execute("Alice", "A1").unwrap();

        assert_eq!(record.snapshot_ref, None);
        assert!(h.store.contains("A1").unwrap());
    }

    #[test]
    fn test_blank_fields_rejected() {
        let h = harness();
        h.state.last_embedding.set(Some(axis_embedding(2)));
        assert!(matches!(
            h.use_case.execute("  ", "A1"),
            Err(RegisterError::MissingField)
        ));
        assert!(matches!(
            h.use_case.execute("Alice", ""),
            Err(RegisterError::MissingField)
        ));
    }
}
