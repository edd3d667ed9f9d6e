use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

use crate::shared::constants::STREAM_BOUNDARY;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode a {0}-channel frame as JPEG")]
    NotRgb(u8),
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if frame.channels() != 3 {
        return Err(EncodeError::NotRgb(frame.channels()));
    }
    let mut buffer = Vec::with_capacity(frame.data().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

/// `Content-Type` of a response carrying [`multipart_part`] chunks.
pub fn multipart_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={STREAM_BOUNDARY}")
}

/// Wraps one JPEG as a part of a `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{STREAM_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut payload = Vec::with_capacity(header.len() + jpeg.len() + 2);
    payload.extend_from_slice(header.as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    payload
}
