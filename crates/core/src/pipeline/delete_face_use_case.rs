use std::sync::Arc;

use crate::identity::domain::identity_matcher::{IdentityMatcher, IdentityStoreError};
use crate::identity::domain::snapshot_store::{SnapshotKey, SnapshotStore};

/// Removes an identity together with its snapshot file and marker.
pub struct DeleteFaceUseCase {
    matcher: Arc<dyn IdentityMatcher>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl DeleteFaceUseCase {
    pub fn new(matcher: Arc<dyn IdentityMatcher>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { matcher, snapshots }
    }

    /// Returns whether a record was removed. A snapshot that cannot be
    /// deleted is logged and left behind.
    pub fn execute(&self, roll_no: &str) -> Result<bool, IdentityStoreError> {
        let Some(record) = self.matcher.record(roll_no)? else {
            return Ok(false);
        };
        let removed = self.matcher.remove(roll_no)?;

        let key = SnapshotKey {
            name: &record.name,
            roll_no: &record.roll_no,
        };
        match self.snapshots.delete(key) {
            Ok(true) => log::info!("Removed {} ({}) and its snapshot", record.name, roll_no),
            Ok(false) => log::info!("Removed {} ({})", record.name, roll_no),
            Err(e) => log::warn!("Removed {roll_no} but its snapshot remains: {e}"),
        }
        Ok(removed)
    }
}
