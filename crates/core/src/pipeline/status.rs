use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::domain::identity::IdentityMatch;

/// Outcome of the most recent face detection cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceStatus {
    pub face_detected: bool,
    pub recognized: bool,
    pub name: Option<String>,
}

impl FaceStatus {
    pub fn no_face() -> Self {
        Self::default()
    }

    pub fn unknown() -> Self {
        Self {
            face_detected: true,
            recognized: false,
            name: None,
        }
    }

    pub fn recognized(identity: &IdentityMatch) -> Self {
        Self {
            face_detected: true,
            recognized: true,
            name: Some(identity.display_name()),
        }
    }
}

/// Class label -> number of detections in the latest object cycle.
pub type ObjectCounts = BTreeMap<String, usize>;

pub fn total_count(counts: &ObjectCounts) -> usize {
    counts.values().sum()
}
