use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::pipeline::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::pipeline::status::{total_count, ObjectCounts};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Font pixels are drawn as `TEXT_SCALE x TEXT_SCALE` squares.
pub const TEXT_SCALE: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const LABEL_BAND_HEIGHT: i32 = 30;
const LABEL_BASELINE_OFFSET: i32 = 8;
const LABEL_PADDING: i32 = 2;
pub(crate) const OVERLAY_X: i32 = 10;
pub(crate) const OVERLAY_LINE_SPACING: i32 = 30;

pub(crate) type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// A labelled box to draw on a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxAnnotation {
    pub region: Region,
    pub label: String,
    pub box_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
}

impl BoxAnnotation {
    pub fn recognized_face(region: Region, label: String) -> Self {
        Self {
            region,
            label,
            box_color: GREEN,
            text_color: WHITE,
        }
    }

    pub fn unknown_face(region: Region) -> Self {
        Self {
            region,
            label: "Unknown".to_string(),
            box_color: RED,
            text_color: WHITE,
        }
    }

    pub fn object(region: Region, label: String) -> Self {
        Self {
            region,
            label,
            box_color: GREEN,
            text_color: BLACK,
        }
    }
}

/// `"person 0.87"`, or `"person 0.87 ID:4"` for a tracked detection.
pub fn object_label(class: &str, confidence: f32, track_id: Option<u32>) -> String {
    match track_id {
        Some(id) => format!("{class} {confidence:.2} ID:{id}"),
        None => format!("{class} {confidence:.2}"),
    }
}

/// Rendered width of `text` in frame pixels.
pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * TEXT_SCALE
}

/// Draws each box with a filled label band above its top edge.
pub fn draw_annotations(frame: &mut Frame, annotations: &[BoxAnnotation]) {
    let Some(mut canvas) = canvas(frame) else {
        return;
    };
    for annotation in annotations {
        draw_box(&mut canvas, &annotation.region, annotation.box_color);
        draw_label(&mut canvas, annotation);
    }
}

/// Writes `"Total: N"` followed by one `"<class>: <count>"` line per class.
pub fn draw_count_overlay(frame: &mut Frame, counts: &ObjectCounts) {
    let Some(mut canvas) = canvas(frame) else {
        return;
    };
    let total = format!("Total: {}", total_count(counts));
    draw_text(&mut canvas, OVERLAY_X, OVERLAY_LINE_SPACING, &total, GREEN);
    for (i, (class, count)) in counts.iter().enumerate() {
        let baseline = OVERLAY_LINE_SPACING * (i as i32 + 2);
        draw_text(&mut canvas, OVERLAY_X, baseline, &format!("{class}: {count}"), GREEN);
    }
}

// Borrowed view over the frame's pixels; None for non-RGB frames.
pub(crate) fn canvas(frame: &mut Frame) -> Option<Canvas<'_>> {
    if frame.channels() != 3 {
        return None;
    }
    let (width, height) = (frame.width(), frame.height());
    ImageBuffer::from_raw(width, height, frame.data_mut())
}

fn draw_box(canvas: &mut Canvas<'_>, region: &Region, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = region.width() - 2 * inset;
        let h = region.height() - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(region.left + inset, region.top + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn draw_label(canvas: &mut Canvas<'_>, annotation: &BoxAnnotation) {
    let region = &annotation.region;
    let band_width = text_width(&annotation.label) + 2 * LABEL_PADDING;
    let band = Rect::at(region.left, region.top - LABEL_BAND_HEIGHT)
        .of_size(band_width.max(1) as u32, LABEL_BAND_HEIGHT as u32);
    draw_filled_rect_mut(canvas, band, annotation.box_color);
    draw_text(
        canvas,
        region.left + LABEL_PADDING,
        region.top - LABEL_BASELINE_OFFSET,
        &annotation.label,
        annotation.text_color,
    );
}

/// Draws `text` with its bottom edge on `baseline`. Pixels outside the canvas
/// are skipped.
pub(crate) fn draw_text(canvas: &mut Canvas<'_>, x: i32, baseline: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let top = baseline - GLYPH_HEIGHT * TEXT_SCALE;
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as i32 * GLYPH_ADVANCE * TEXT_SCALE;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..TEXT_SCALE {
                    for dx in 0..TEXT_SCALE {
                        let px = origin_x + col * TEXT_SCALE + dx;
                        let py = top + row as i32 * TEXT_SCALE + dy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            canvas.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}
