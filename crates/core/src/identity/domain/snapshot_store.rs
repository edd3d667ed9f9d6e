use std::collections::HashSet;

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] image::ImageError),
    #[error("snapshot image is empty")]
    EmptyImage,
}

/// Which identity a snapshot belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotKey<'a> {
    pub name: &'a str,
    pub roll_no: &'a str,
}

impl SnapshotKey<'_> {
    /// `"<name>_<roll_no>"`, the file-name prefix of the identity's snapshot.
    ///
    /// The roll number is escaped so it never contains `_`, which keeps it
    /// recoverable from the file name with [`unescape_roll`].
    pub fn file_stem(&self) -> String {
        format!("{}_{}", sanitize(self.name), escape_roll(self.roll_no))
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Percent-escapes every byte of `roll_no` outside `[A-Za-z0-9 .-]`,
/// including `_` and `%`. Distinct roll numbers stay distinct.
pub fn escape_roll(roll_no: &str) -> String {
    let mut escaped = String::with_capacity(roll_no.len());
    for &b in roll_no.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b' ' | b'.') {
            escaped.push(b as char);
        } else {
            escaped.push_str(&format!("%{b:02X}"));
        }
    }
    escaped
}

/// Inverse of [`escape_roll`]. `None` for text `escape_roll` cannot produce.
pub fn unescape_roll(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = escaped.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'_' => return None,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

/// Reference images, one per identity. Identities are told apart by roll
/// number alone.
pub trait SnapshotStore: Send + Sync {
    /// Persists `image` as the identity's snapshot and returns its reference.
    /// If the identity already has one, nothing is written and the existing
    /// reference is returned.
    fn save(&self, image: &Frame, key: SnapshotKey<'_>) -> Result<String, SnapshotError>;

    fn find(&self, key: SnapshotKey<'_>) -> Option<String>;

    /// Removes the identity's snapshot and marker. Returns whether a file was removed.
    fn delete(&self, key: SnapshotKey<'_>) -> Result<bool, SnapshotError>;

    /// Removes every snapshot whose reference is not in `referenced`.
    /// Returns the number of files removed.
    fn prune_orphans(&self, referenced: &HashSet<String>) -> Result<usize, SnapshotError>;
}
