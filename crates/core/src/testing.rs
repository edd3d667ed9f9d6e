//! Hand-written fakes shared by the unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::detection::domain::face_encoder::{Embedding, FaceEncoder};
use crate::detection::domain::face_locator::FaceLocator;
use crate::detection::domain::object_tracker::{Detection, ObjectTracker, TrackOptions};
use crate::identity::domain::snapshot_store::{SnapshotError, SnapshotKey, SnapshotStore};
use crate::shared::constants::EMBEDDING_DIM;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const LEFT_HALF: [u8; 3] = [10, 20, 30];
pub const RIGHT_HALF: [u8; 3] = [40, 50, 60];

/// Frame whose left and right halves have different colours, so mirroring
/// is observable.
pub fn two_tone_frame(width: u32, height: u32, index: usize) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..height {
        for x in 0..width {
            let px = if x < width / 2 { LEFT_HALF } else { RIGHT_HALF };
            data.extend_from_slice(&px);
        }
    }
    Frame::new(data, width, height, 3, index)
}

/// Unit vector along `axis`. Distinct axes are sqrt(2) apart.
pub fn axis_embedding(axis: usize) -> Embedding {
    let mut values = vec![0.0; EMBEDDING_DIM];
    values[axis % EMBEDDING_DIM] = 1.0;
    Embedding::new(values)
}

/// Frame source that succeeds or fails according to a script, then falls
/// back to a fixed outcome.
pub struct ScriptedSource {
    width: u32,
    height: u32,
    script: VecDeque<bool>,
    then_ok: bool,
    index: usize,
    released: bool,
    releases: Arc<AtomicUsize>,
    captures: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(width: u32, height: u32, script: VecDeque<bool>, then_ok: bool) -> Self {
        Self {
            width,
            height,
            script,
            then_ok,
            index: 0,
            released: false,
            releases: Arc::new(AtomicUsize::new(0)),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(width: u32, height: u32) -> Self {
        Self::new(width, height, VecDeque::new(), true)
    }

    pub fn failing() -> Self {
        Self::new(0, 0, VecDeque::new(), false)
    }

    pub fn failing_then_ok(failures: usize, width: u32, height: u32) -> Self {
        Self::new(width, height, vec![false; failures].into(), true)
    }

    pub fn ok_then_failing(successes: usize, width: u32, height: u32) -> Self {
        Self::new(width, height, vec![true; successes].into(), false)
    }

    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }

    /// Counts capture attempts, failed ones included.
    pub fn capture_counter(&self) -> Arc<AtomicUsize> {
        self.captures.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.pop_front().unwrap_or(self.then_ok);
        if !ok {
            return Err(CaptureError::Read("scripted failure".to_string()));
        }
        let frame = two_tone_frame(self.width, self.height, self.index);
        self.index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn describe(&self) -> String {
        format!("scripted {}x{}", self.width, self.height)
    }
}

/// Returns the same regions on every call and records the frame sizes it saw.
pub struct FakeLocator {
    faces: Vec<Region>,
    fail: bool,
    seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl FakeLocator {
    pub fn returning(faces: Vec<Region>) -> Self {
        Self {
            faces,
            fail: false,
            seen_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn none() -> Self {
        Self::returning(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::none()
        }
    }

    pub fn seen_sizes(&self) -> Arc<Mutex<Vec<(u32, u32)>>> {
        self.seen_sizes.clone()
    }
}

impl FaceLocator for FakeLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        self.seen_sizes
            .lock()
            .unwrap()
            .push((frame.width(), frame.height()));
        if self.fail {
            return Err("locator failure".into());
        }
        Ok(self.faces.clone())
    }
}

/// Maps regions to embeddings; unlisted regions get the default.
pub struct FakeEncoder {
    default: Embedding,
    overrides: Vec<(Region, Embedding)>,
    failing: Vec<Region>,
    seen: Arc<Mutex<Vec<Region>>>,
}

impl FakeEncoder {
    pub fn constant(default: Embedding) -> Self {
        Self {
            default,
            overrides: Vec::new(),
            failing: Vec::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with(mut self, region: Region, embedding: Embedding) -> Self {
        self.overrides.push((region, embedding));
        self
    }

    pub fn failing_on(mut self, region: Region) -> Self {
        self.failing.push(region);
        self
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<Region>>> {
        self.seen.clone()
    }
}

impl FaceEncoder for FakeEncoder {
    fn encode(
        &mut self,
        _frame: &Frame,
        face: &Region,
    ) -> Result<Embedding, Box<dyn std::error::Error>> {
        self.seen.lock().unwrap().push(*face);
        if self.failing.contains(face) {
            return Err("encoder failure".into());
        }
        Ok(self
            .overrides
            .iter()
            .find(|(r, _)| r == face)
            .map(|(_, e)| e.clone())
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Returns a fixed detection set on every call.
pub struct FakeObjectTracker {
    labels: Vec<String>,
    detections: Vec<Detection>,
    fail: bool,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<((u32, u32), TrackOptions)>>>,
}

impl FakeObjectTracker {
    pub fn returning(labels: &[&str], detections: Vec<Detection>) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            detections,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(labels: &[&str]) -> Self {
        Self {
            fail: true,
            ..Self::returning(labels, Vec::new())
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<((u32, u32), TrackOptions)>>> {
        self.seen.clone()
    }
}

impl ObjectTracker for FakeObjectTracker {
    fn detect_and_track(
        &mut self,
        frame: &Frame,
        options: TrackOptions,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push(((frame.width(), frame.height()), options));
        if self.fail {
            return Err("tracker failure".into());
        }
        Ok(self.detections.clone())
    }

    fn class_labels(&self) -> &[String] {
        &self.labels
    }
}

pub fn detection(bbox: [f64; 4], class_id: usize, confidence: f64, track_id: Option<u32>) -> Detection {
    Detection {
        bbox,
        class_id,
        confidence,
        track_id,
    }
}

/// Snapshot store whose writes always fail.
pub struct FailingSnapshotStore;

impl SnapshotStore for FailingSnapshotStore {
    fn save(&self, _image: &Frame, _key: SnapshotKey<'_>) -> Result<String, SnapshotError> {
        Err(SnapshotError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only snapshot directory",
        )))
    }

    fn find(&self, _key: SnapshotKey<'_>) -> Option<String> {
        None
    }

    fn delete(&self, _key: SnapshotKey<'_>) -> Result<bool, SnapshotError> {
        Ok(false)
    }

    fn prune_orphans(&self, _referenced: &HashSet<String>) -> Result<usize, SnapshotError> {
        Ok(0)
    }
}
