/// Axis-aligned pixel box, half-open on the right and bottom edges.
///
/// Faces are reported as `(top, right, bottom, left)` by the locator; object
/// detections arrive as `[x1, y1, x2, y2]` floats and are truncated here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Region {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Truncating conversion from an `[x1, y1, x2, y2]` float box.
    pub fn from_xyxy(bbox: &[f64; 4]) -> Self {
        Self::new(
            bbox[0] as i32,
            bbox[1] as i32,
            bbox[2] as i32,
            bbox[3] as i32,
        )
    }

    /// Maps a float box from one coordinate space into another, scaling each
    /// axis independently (`sx = dst_w / src_w`, `sy = dst_h / src_h`).
    pub fn from_scaled_xyxy(bbox: &[f64; 4], sx: f64, sy: f64) -> Self {
        Self::from_xyxy(&[bbox[0] * sx, bbox[1] * sy, bbox[2] * sx, bbox[3] * sy])
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Undoes a downscale by `factor`: every corner becomes `v / factor`,
    /// rounded to the nearest pixel.
    pub fn upscale(&self, factor: f64) -> Region {
        let up = |v: i32| (v as f64 / factor).round() as i32;
        Region::new(up(self.left), up(self.top), up(self.right), up(self.bottom))
    }

    /// Intersection with `[0, width) x [0, height)`, or `None` if empty.
    pub fn clamped(&self, width: u32, height: u32) -> Option<Region> {
        let r = Region::new(
            self.left.clamp(0, width as i32),
            self.top.clamp(0, height as i32),
            self.right.clamp(0, width as i32),
            self.bottom.clamp(0, height as i32),
        );
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width() as f64 * self.height() as f64;
        let area_b = other.width() as f64 * other.height() as f64;
        inter / (area_a + area_b - inter)
    }
}
