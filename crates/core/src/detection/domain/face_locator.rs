use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Finds faces in a frame.
///
/// Returned regions are in the coordinates of the frame passed in.
/// Implementations may hold inference sessions, hence `&mut self`.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
