use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::Frame;
use crate::shared::settings::CameraSettings;

/// Packets read per `capture` before giving up on the cycle.
const MAX_PACKETS_PER_CAPTURE: usize = 16;

/// Live camera capture through libavdevice (V4L2, AVFoundation, DirectShow).
///
/// Resolution and frame rate are passed to the device as hints. A device that
/// rejects them is reopened with its own defaults. Every frame is converted to
/// packed RGB24.
pub struct FfmpegCameraSource {
    device: String,
    open: Option<OpenDevice>,
    frame_index: usize,
}

struct OpenDevice {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: the source is only touched through `SharedCamera`'s mutex, so the
// raw ffmpeg pointers are never used from two threads at once.
unsafe impl Send for FfmpegCameraSource {}

impl FfmpegCameraSource {
    pub fn open(settings: &CameraSettings) -> Result<Self, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            device: settings.device.clone(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == settings.format)
            .ok_or_else(|| open_err(format!("input format {} is not available", settings.format)))?;

        let mut hints = ffmpeg_next::Dictionary::new();
        hints.set(
            "video_size",
            &format!("{}x{}", settings.width, settings.height),
        );
        hints.set("framerate", &settings.fps.to_string());

        let input = match ffmpeg_next::format::open_with(&settings.device, &format, hints) {
            Ok(ctx) => ctx.input(),
            Err(e) => {
                log::warn!(
                    "{} rejected {}x{} @ {} fps ({e}); using device defaults",
                    settings.device,
                    settings.width,
                    settings.height,
                    settings.fps
                );
                ffmpeg_next::format::open_with(
                    &settings.device,
                    &format,
                    ffmpeg_next::Dictionary::new(),
                )
                .map_err(|e| open_err(e.to_string()))?
                .input()
            }
        };

        let opened = OpenDevice::new(input).map_err(|e| open_err(e.to_string()))?;
        if (opened.width, opened.height) != (settings.width, settings.height) {
            log::warn!(
                "{} delivers {}x{} instead of the requested {}x{}",
                settings.device,
                opened.width,
                opened.height,
                settings.width,
                settings.height
            );
        }
        log::info!(
            "Opened {} ({}) at {}x{}",
            settings.device,
            settings.format,
            opened.width,
            opened.height
        );

        Ok(Self {
            device: settings.device.clone(),
            open: Some(opened),
            frame_index: 0,
        })
    }
}

impl OpenDevice {
    fn new(input: Input) -> Result<Self, ffmpeg_next::Error> {
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        Ok(Some(extract_rgb_pixels(&rgb, self.width, self.height)))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        if let Some(pixels) = self.try_receive()? {
            return Ok(pixels);
        }
        for _ in 0..MAX_PACKETS_PER_CAPTURE {
            let mut packet = ffmpeg_next::Packet::empty();
            packet
                .read(&mut self.input)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            if packet.stream() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Decode(e.to_string()))?;
            if let Some(pixels) = self.try_receive()? {
                return Ok(pixels);
            }
        }
        Err(CaptureError::Read(format!(
            "no frame after {MAX_PACKETS_PER_CAPTURE} packets"
        )))
    }
}

impl FrameSource for FfmpegCameraSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let device = self.open.as_mut().ok_or(CaptureError::Released)?;
        let pixels = device.read_frame()?;
        let frame = Frame::new(pixels, device.width, device.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.open.take().is_some() {
            log::info!("Released {} after {} frames", self.device, self.frame_index);
        }
    }

    fn describe(&self) -> String {
        match &self.open {
            Some(d) => format!("{} ({}x{})", self.device, d.width, d.height),
            None => format!("{} (released)", self.device),
        }
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}
