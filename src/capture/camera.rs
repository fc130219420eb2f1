//! Camera devices
//!
//! A `CameraDevice` is anything that yields raw frames on demand. The
//! built-in device replays a directory of still images, which is how the
//! pipeline runs against recorded drives.

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::frame::CapturedFrame;
use super::CaptureError;

/// Resolution presets a session may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPreset {
    Vga640x480,
    #[default]
    Hd1280x720,
    FullHd1920x1080,
}

impl ResolutionPreset {
    /// Landscape dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ResolutionPreset::Vga640x480 => (640, 480),
            ResolutionPreset::Hd1280x720 => (1280, 720),
            ResolutionPreset::FullHd1920x1080 => (1920, 1080),
        }
    }
}

/// Orientation of delivered frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl VideoOrientation {
    /// Clockwise quarter turns from landscape-right
    fn quarter_turns(&self) -> u8 {
        match self {
            VideoOrientation::LandscapeRight => 0,
            VideoOrientation::Portrait => 1,
            VideoOrientation::LandscapeLeft => 2,
            VideoOrientation::PortraitUpsideDown => 3,
        }
    }

    /// Clockwise quarter turns needed to go from `native` to `self`
    pub fn quarter_turns_from(&self, native: VideoOrientation) -> u8 {
        (self.quarter_turns() + 4 - native.quarter_turns()) % 4
    }
}

/// A source of raw camera frames
pub trait CameraDevice: Send {
    /// Human-readable device name
    fn name(&self) -> &str;

    /// Orientation the device produces frames in
    fn native_orientation(&self) -> VideoOrientation;

    /// Whether the device can deliver the given preset
    fn supports_preset(&self, preset: ResolutionPreset) -> bool;

    /// Select a preset; only called after `supports_preset` returned true
    fn set_preset(&mut self, preset: ResolutionPreset);

    /// Whether the connection can be rotated to the given orientation
    fn supports_orientation(&self, orientation: VideoOrientation) -> bool;

    /// Next frame; `Ok(None)` once the stream has ended
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Camera replaying a directory of still images as BGRA frames
pub struct ImageSequenceCamera {
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    native: VideoOrientation,
    preset: Option<ResolutionPreset>,
}

impl ImageSequenceCamera {
    /// Open a directory of images, sorted by file name
    pub fn open(dir: &Path, looping: bool, native: VideoOrientation) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CaptureError::DeviceNotFound(dir.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(dir.display().to_string())
            }
            _ => CaptureError::Io(e),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::DeviceNotFound(format!(
                "{} contains no images",
                dir.display()
            )));
        }

        info!("Opened image sequence {:?} ({} frames)", dir, files.len());

        Ok(Self {
            name: format!("image-sequence:{}", dir.display()),
            files,
            cursor: 0,
            looping,
            native,
            preset: None,
        })
    }

    /// Number of images in the sequence
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the sequence holds no images
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CameraDevice for ImageSequenceCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_orientation(&self) -> VideoOrientation {
        self.native
    }

    fn supports_preset(&self, _preset: ResolutionPreset) -> bool {
        true
    }

    fn set_preset(&mut self, preset: ResolutionPreset) {
        self.preset = Some(preset);
    }

    fn supports_orientation(&self, _orientation: VideoOrientation) -> bool {
        true
    }

    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let mut image = image::open(path).map_err(|e| CaptureError::Decode {
            path: path.clone(),
            source: e,
        })?;

        if let Some(preset) = self.preset {
            // Preset is landscape; match the still's own orientation
            let (long, short) = preset.dimensions();
            let (w, h) = if image.height() > image.width() {
                (short, long)
            } else {
                (long, short)
            };
            if image.width() > w || image.height() > h {
                image = image.resize(w, h, FilterType::Triangle);
            }
        }

        debug!("Read frame {:?} ({}x{})", path, image.width(), image.height());
        Ok(Some(CapturedFrame::from_rgba_image(&image.to_rgba8())))
    }
}

/// Look up the camera described by the capture settings
pub fn default_device(settings: &super::CaptureConfig) -> Result<Box<dyn CameraDevice>, CaptureError> {
    let dir = settings
        .frames_dir
        .as_ref()
        .ok_or_else(|| CaptureError::DeviceNotFound("no frame directory configured".to_string()))?;

    let camera = ImageSequenceCamera::open(dir, settings.loop_frames, settings.native_orientation)?;
    Ok(Box::new(camera))
}
