use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::identity::domain::snapshot_store::{
    unescape_roll, SnapshotError, SnapshotKey, SnapshotStore,
};
use crate::shared::constants::SNAPSHOT_EXTENSION;
use crate::shared::frame::Frame;

const TIMESTAMP_LEN: usize = 14;

/// JPEG snapshots named `<name>_<roll_no>_<YYYYmmddHHMMSS>.jpg` in one
/// directory.
///
/// The in-memory marker map (roll number -> file) is rebuilt from the
/// directory on open and consulted before touching the disk. The roll number
/// is escaped in the file name, so the rebuild is unambiguous.
pub struct FsSnapshotStore {
    dir: PathBuf,
    markers: Mutex<HashMap<String, PathBuf>>,
}

impl FsSnapshotStore {
    pub fn open(dir: &Path) -> Result<Self, SnapshotError> {
        fs::create_dir_all(dir)?;
        let mut markers = HashMap::new();
        for path in snapshot_files(dir)? {
            let Some(roll_no) = path.file_name().and_then(|n| n.to_str()).and_then(marker_roll)
            else {
                continue;
            };
            // Keep the newest file when an identity has several
            let newer = markers
                .get(&roll_no)
                .map_or(true, |existing: &PathBuf| &path > existing);
            if newer {
                markers.insert(roll_no, path);
            }
        }
        log::info!("{} snapshots registered in {}", markers.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            markers: Mutex::new(markers),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn markers(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(&self, image: &Frame, key: SnapshotKey<'_>) -> Result<String, SnapshotError> {
        // Held across the write so two callers cannot both create a file
        let mut markers = self.markers();
        if let Some(existing) = markers.get(key.roll_no) {
            if existing.exists() {
                return Ok(existing.display().to_string());
            }
        }

        let img = image.to_rgb_image().ok_or(SnapshotError::EmptyImage)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(SnapshotError::EmptyImage);
        }
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let path = self
            .dir
            .join(format!("{}_{timestamp}.{SNAPSHOT_EXTENSION}", key.file_stem()));
        img.save(&path)?;

        log::info!("Saved snapshot {}", path.display());
        let reference = path.display().to_string();
        markers.insert(key.roll_no.to_string(), path);
        Ok(reference)
    }

    fn find(&self, key: SnapshotKey<'_>) -> Option<String> {
        self.markers()
            .get(key.roll_no)
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
    }

    fn delete(&self, key: SnapshotKey<'_>) -> Result<bool, SnapshotError> {
        let Some(path) = self.markers().remove(key.roll_no) else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn prune_orphans(&self, referenced: &HashSet<String>) -> Result<usize, SnapshotError> {
        let mut markers = self.markers();
        let mut removed = 0;
        for path in snapshot_files(&self.dir)? {
            if referenced.contains(&path.display().to_string()) {
                continue;
            }
            fs::remove_file(&path)?;
            markers.retain(|_, p| p != &path);
            log::info!("Removed orphaned snapshot {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}

fn snapshot_files(dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXTENSION) {
            files.push(path);
        }
    }
    Ok(files)
}

/// `"Alice_B%5FC_20240102030405.jpg"` -> `"B_C"`.
fn marker_roll(file_name: &str) -> Option<String> {
    let base = file_name.strip_suffix(&format!(".{SNAPSHOT_EXTENSION}"))?;
    let (stem, timestamp) = base.rsplit_once('_')?;
    if timestamp.len() != TIMESTAMP_LEN || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (_, roll) = stem.rsplit_once('_')?;
    if roll.is_empty() {
        return None;
    }
    unescape_roll(roll)
}
