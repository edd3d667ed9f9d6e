/// ByteTrack-style object tracker.
///
/// Detections at or above `HIGH_THRESH` are associated with tracks first and
/// may start new tracks. Weaker detections can only keep an existing,
/// still-unclaimed track alive. Tracks and detections of different classes
/// are never associated.
use super::math::bbox_iou;

#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub score: f64,
    pub class_id: usize,
}

/// A track claimed by a detection in the latest update.
#[derive(Clone, Debug)]
pub struct Track {
    pub id: u32,
    pub bbox: [f64; 4],
    pub class_id: usize,
    /// Index into the detections passed to that update.
    pub det_index: Option<usize>,
}

const HIGH_THRESH: f64 = 0.5;
const MATCH_THRESH: f64 = 0.3;

#[derive(Clone, Debug)]
struct TrackState {
    id: u32,
    bbox: [f64; 4],
    class_id: usize,
    frames_lost: usize,
    /// Set while the current update has assigned a detection.
    det_index: Option<usize>,
}

impl TrackState {
    fn report(&self) -> Track {
        Track {
            id: self.id,
            bbox: self.bbox,
            class_id: self.class_id,
            det_index: self.det_index,
        }
    }
}

pub struct ByteTracker {
    tracks: Vec<TrackState>,
    next_id: u32,
    max_lost: usize,
}

impl ByteTracker {
    pub fn new(max_lost: usize) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
        }
    }

    /// Forgets every track. Ids keep counting up so they are never reused.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    /// Associates one frame's detections and returns the tracks they claimed.
    ///
    /// Unclaimed tracks are kept for up to `max_lost` updates so an object
    /// that drops out briefly gets its old id back.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        for track in &mut self.tracks {
            track.det_index = None;
        }

        let (strong, weak): (Vec<usize>, Vec<usize>) =
            (0..detections.len()).partition(|&i| detections[i].score >= HIGH_THRESH);
        let claimed = self.associate(detections, &strong);
        self.associate(detections, &weak);

        for track in &mut self.tracks {
            if track.det_index.is_none() {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        for &di in strong.iter().filter(|di| !claimed.contains(*di)) {
            self.spawn(&detections[di], di);
        }

        self.tracks
            .iter()
            .filter(|t| t.det_index.is_some())
            .map(TrackState::report)
            .collect()
    }

    /// Greedy IoU assignment of `candidates` to tracks not yet claimed this
    /// update, best overlap first. Returns the detections that were taken.
    fn associate(&mut self, detections: &[Detection], candidates: &[usize]) -> Vec<usize> {
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            if track.det_index.is_some() {
                continue;
            }
            for &di in candidates {
                let det = &detections[di];
                if det.class_id != track.class_id {
                    continue;
                }
                let overlap = bbox_iou(&track.bbox, &det.bbox);
                if overlap >= MATCH_THRESH {
                    pairs.push((overlap, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut taken = Vec::new();
        for (_, ti, di) in pairs {
            let track = &mut self.tracks[ti];
            if track.det_index.is_some() || taken.contains(&di) {
                continue;
            }
            track.bbox = detections[di].bbox;
            track.frames_lost = 0;
            track.det_index = Some(di);
            taken.push(di);
        }
        taken
    }

    fn spawn(&mut self, detection: &Detection, det_index: usize) {
        self.tracks.push(TrackState {
            id: self.next_id,
            bbox: detection.bbox,
            class_id: detection.class_id,
            frames_lost: 0,
            det_index: Some(det_index),
        });
        self.next_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> Detection {
        det_of(0, [x1, y1, x2, y2], score)
    }

    fn det_of(class_id: usize, bbox: [f64; 4], score: f64) -> Detection {
        Detection {
            bbox,
            score,
            class_id,
        }
    }

    #[test]
    fn test_new_detections_get_unique_ids() {
        let mut tracker = ByteTracker::new(5);
        let tracks = tracker.update(&[
            det(0.0, 0.0, 50.0, 50.0, 0.9),
            det(100.0, 100.0, 150.0, 150.0, 0.8),
        ]);
        assert_eq!(tracks.len(), 2);
        assert_ne!(tracks[0].id, tracks[1].id);
    }

    #[test]
    fn test_consistent_id_across_frames() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)])[0].id;

        let t2 = tracker.update(&[det(12.0, 12.0, 62.0, 62.0, 0.9)]);
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].id, id);
        assert_eq!(t2[0].det_index, Some(0));
    }

    #[test]
    fn test_lost_track_removal() {
        let mut tracker = ByteTracker::new(2);
        tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)]);
        tracker.update(&[]);
        tracker.update(&[]);
        tracker.update(&[]);

        let again = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)]);
        assert_eq!(again[0].id, 2);
    }

    #[test]
    fn test_track_survives_within_max_lost() {
        let mut tracker = ByteTracker::new(3);
        let id = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)])[0].id;

        tracker.update(&[]);
        tracker.update(&[]);

        let t2 = tracker.update(&[det(12.0, 12.0, 62.0, 62.0, 0.9)]);
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].id, id);
    }

    #[test]
    fn test_low_confidence_matches_existing_track() {
        let mut tracker = ByteTracker::new(5);
        let id = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)])[0].id;

        let t2 = tracker.update(&[det(12.0, 12.0, 62.0, 62.0, 0.3)]);
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].id, id);
    }

    #[test]
    fn test_low_confidence_does_not_start_new_track() {
        let mut tracker = ByteTracker::new(5);
        assert!(tracker
            .update(&[det(10.0, 10.0, 60.0, 60.0, 0.3)])
            .is_empty());
    }

    #[test]
    fn test_tracks_do_not_cross_classes() {
        let mut tracker = ByteTracker::new(5);
        let person = tracker.update(&[det_of(0, [10.0, 10.0, 60.0, 60.0], 0.9)])[0].id;

        // A dog in the same place is a new object, and the person is lost
        let t2 = tracker.update(&[det_of(16, [10.0, 10.0, 60.0, 60.0], 0.9)]);
        assert_eq!(t2.len(), 1);
        assert_ne!(t2[0].id, person);
        assert_eq!(t2[0].class_id, 16);
    }

    #[test]
    fn test_reset_forgets_tracks_without_reusing_ids() {
        let mut tracker = ByteTracker::new(5);
        let first = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)])[0].id;
        tracker.reset();
        let second = tracker.update(&[det(10.0, 10.0, 60.0, 60.0, 0.9)])[0].id;
        assert_ne!(first, second);
    }

    #[test]
    fn test_multiple_tracks_independent() {
        let mut tracker = ByteTracker::new(5);
        let t1 = tracker.update(&[
            det(0.0, 0.0, 50.0, 50.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.9),
        ]);
        let (id_a, id_b) = (t1[0].id, t1[1].id);

        let t2 = tracker.update(&[
            det(2.0, 2.0, 52.0, 52.0, 0.9),
            det(202.0, 202.0, 252.0, 252.0, 0.9),
        ]);
        let ids: Vec<u32> = t2.iter().map(|t| t.id).collect();
        assert!(ids.contains(&id_a));
        assert!(ids.contains(&id_b));
    }
}
