use crate::shared::frame::Frame;

/// One detected object, in the coordinates of the frame handed to the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
    pub class_id: usize,
    pub confidence: f64,
    /// Stable across calls while tracking state persists.
    pub track_id: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackOptions {
    pub confidence: f64,
    /// IoU above which overlapping boxes of one class are suppressed.
    pub overlap: f64,
    /// Keep tracker state between calls so ids stay stable.
    pub persist_tracks: bool,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            overlap: 0.45,
            persist_tracks: true,
        }
    }
}

/// Detects and tracks objects of a fixed class vocabulary.
pub trait ObjectTracker: Send {
    fn detect_and_track(
        &mut self,
        frame: &Frame,
        options: TrackOptions,
    ) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;

    /// The vocabulary loaded with the model, indexed by class id.
    fn class_labels(&self) -> &[String];

    fn class_label(&self, class_id: usize) -> Option<&str> {
        self.class_labels().get(class_id).map(String::as_str)
    }
}
