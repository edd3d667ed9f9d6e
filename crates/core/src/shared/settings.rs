use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup failures. Everything here is fatal; nothing is deferred into the stream.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
    #[error("capture device unavailable: {0}")]
    Device(String),
    #[error("failed to load model {name}: {reason}")]
    Model { name: String, reason: String },
    #[error("failed to open storage: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device path or name understood by the capture backend.
    pub device: String,
    /// libavdevice input format, e.g. `video4linux2`, `avfoundation`, `dshow`.
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            format: "video4linux2".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceSettings {
    /// Detection runs only on every Nth captured frame.
    pub skip_frames: usize,
    pub min_interval_ms: u64,
    /// Downscale factor applied before locating faces.
    pub downscale: f64,
    /// Maximum embedding distance accepted as a match.
    pub match_tolerance: f64,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            skip_frames: 2,
            min_interval_ms: 100,
            downscale: 0.25,
            match_tolerance: 0.6,
        }
    }
}

impl FaceSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSettings {
    pub min_interval_ms: u64,
    /// Side of the square image handed to the detector.
    pub input_size: u32,
    pub confidence: f64,
    pub overlap: f64,
    pub persist_tracks: bool,
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            input_size: 320,
            confidence: 0.5,
            overlap: 0.45,
            persist_tracks: true,
        }
    }
}

impl ObjectSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    /// Pause after a pull that produced no frame.
    pub empty_pull_backoff_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            empty_pull_backoff_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub face: FaceSettings,
    pub object: ObjectSettings,
    pub stream: StreamSettings,
}

impl Settings {
    /// Reads a JSON settings file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.camera.width == 0 || self.camera.height == 0 {
            return invalid(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            ));
        }
        if self.face.skip_frames < 1 {
            return invalid("face skip_frames must be >= 1".to_string());
        }
        if !(self.face.downscale > 0.0 && self.face.downscale <= 1.0) {
            return invalid(format!(
                "face downscale must be in (0, 1], got {}",
                self.face.downscale
            ));
        }
        if self.face.match_tolerance <= 0.0 {
            return invalid(format!(
                "match tolerance must be positive, got {}",
                self.face.match_tolerance
            ));
        }
        if self.object.input_size == 0 {
            return invalid("object input_size must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.object.confidence) {
            return invalid(format!(
                "object confidence must be between 0.0 and 1.0, got {}",
                self.object.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.object.overlap) {
            return invalid(format!(
                "object overlap must be between 0.0 and 1.0, got {}",
                self.object.overlap
            ));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return invalid(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.stream.jpeg_quality
            ));
        }
        Ok(())
    }
}
