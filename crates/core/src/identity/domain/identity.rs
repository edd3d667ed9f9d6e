use serde::Serialize;

use crate::detection::domain::face_encoder::Embedding;

/// A registered person. The embedding never changes after enrollment.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub name: String,
    /// Unique across the store.
    pub roll_no: String,
    pub embedding: Embedding,
    pub snapshot_ref: Option<String>,
}

/// The part of an identity a successful match reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityMatch {
    pub name: String,
    pub roll_no: String,
}

impl IdentityMatch {
    /// `"<name> (<roll_no>)"`, as shown in status and on the overlay.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.roll_no)
    }
}

/// Listing entry without the embedding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub name: String,
    pub roll_no: String,
    pub snapshot_ref: Option<String>,
}
