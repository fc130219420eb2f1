//! Frame data structures for captured camera content

use image::RgbaImage;
use std::time::Instant;

use super::CaptureError;

/// Byte layout of a raw frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 32-bit BGRA, the camera's native output
    #[default]
    Bgra8,
    /// 32-bit RGBA
    Rgba8,
}

impl PixelFormat {
    /// Bytes used by one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// A captured frame from the camera.
///
/// The buffer always holds `bytes_per_row * height` bytes; the fields are
/// only set by the validating constructors.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Monotonic frame number assigned by the capture session
    pub(crate) sequence: u64,
    /// Raw pixel data
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// Row stride in bytes (may include padding)
    bytes_per_row: usize,
    /// Channel order of `data`
    format: PixelFormat,
    /// Timestamp when frame was captured
    pub(crate) timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new tightly packed frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self, CaptureError> {
        let bytes_per_row = width as usize * format.bytes_per_pixel();
        Self::with_stride(data, width, height, bytes_per_row, format)
    }

    /// Create a frame whose rows are `bytes_per_row` apart
    pub fn with_stride(
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: PixelFormat,
    ) -> Result<Self, CaptureError> {
        let min_row = width as usize * format.bytes_per_pixel();
        if bytes_per_row < min_row || data.len() < bytes_per_row * height as usize {
            return Err(CaptureError::MalformedFrame {
                width,
                height,
                len: data.len(),
            });
        }

        Ok(Self {
            sequence: 0,
            data,
            width,
            height,
            bytes_per_row,
            format,
            timestamp: Instant::now(),
        })
    }

    /// Build a BGRA frame from a decoded image
    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let mut data = image.as_raw().clone();
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        Self {
            sequence: 0,
            data,
            width: image.width(),
            height: image.height(),
            bytes_per_row: image.width() as usize * 4,
            format: PixelFormat::Bgra8,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frame number assigned by the capture session (0 before delivery)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Raw pixel buffer
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Convert to a displayable RGBA image, dropping row padding
    pub fn to_rgba_image(&self) -> RgbaImage {
        let row_len = self.width as usize * 4;
        let mut out = Vec::with_capacity(row_len * self.height as usize);

        for row in 0..self.height as usize {
            let start = row * self.bytes_per_row;
            let line = &self.data[start..start + row_len];
            match self.format {
                PixelFormat::Rgba8 => out.extend_from_slice(line),
                PixelFormat::Bgra8 => {
                    for px in line.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
            }
        }

        // Length is exactly width * height * 4 by construction
        RgbaImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}
