//! Plate localization
//!
//! Corrects the frame for device tilt and searches it for a region dense in
//! vertical edges with a plate-like aspect ratio. Characters on a plate
//! produce many short vertical strokes; dilating the edge map merges them
//! into a single blob whose bounding box is the candidate.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::gradients::horizontal_sobel;
use imageproc::morphology::dilate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::motion::wrap_angle;

/// Edge strengths below this are never treated as plate strokes
const MIN_EDGE_LEVEL: u8 = 32;

/// Pixel rectangle in corrected-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PlateBounds {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }
}

/// Output of one localization pass
#[derive(Debug, Clone)]
pub struct Localization {
    /// Frame after tilt correction
    pub corrected: RgbaImage,
    /// Cropped plate candidate, if one was found
    pub patch: Option<RgbaImage>,
    /// Where the candidate sits in `corrected`
    pub bounds: Option<PlateBounds>,
    /// Applied clockwise correction in radians
    pub correction: f64,
}

/// Tilt correction and plate candidate extraction.
///
/// Called once per frame on the frame worker; implementations may keep
/// per-stream state since they are never shared.
pub trait PlateLocalizer: Send {
    fn correct_and_localize(&mut self, frame: &RgbaImage, rotation: f64) -> Localization;
}

/// Localizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Corrections smaller than this are skipped
    pub min_correction_degrees: f64,
    /// Frames wider than this are downscaled before the edge search
    pub working_width: u32,
    /// Accepted candidate width / height range
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Accepted candidate area as a fraction of the frame
    pub min_area_fraction: f32,
    pub max_area_fraction: f32,
    /// Minimum share of edge pixels inside the candidate box
    pub min_fill: f32,
    /// Dilation radius used to merge strokes, in working pixels
    pub dilate_radius: u8,
    /// Extra border added around the crop, as a fraction of its height
    pub margin: f32,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            min_correction_degrees: 0.5,
            working_width: 640,
            min_aspect: 2.0,
            max_aspect: 6.5,
            min_area_fraction: 0.002,
            max_area_fraction: 0.25,
            min_fill: 0.2,
            dilate_radius: 3,
            margin: 0.1,
        }
    }
}

/// Built-in localizer based on vertical edge density
pub struct EdgeDensityLocalizer {
    config: LocalizerConfig,
}

impl EdgeDensityLocalizer {
    pub fn new(config: LocalizerConfig) -> Self {
        Self { config }
    }

    /// Rotate the frame clockwise by the wrapped rotation, if significant
    pub fn correct(&self, frame: &RgbaImage, rotation: f64) -> (RgbaImage, f64) {
        let correction = wrap_angle(rotation);
        if correction.abs().to_degrees() < self.config.min_correction_degrees {
            return (frame.clone(), 0.0);
        }

        let rotated = rotate_about_center(
            frame,
            correction as f32,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 255]),
        );
        (rotated, correction)
    }

    /// Search an upright frame for the best plate candidate
    pub fn find_plate(&self, image: &RgbaImage) -> Option<PlateBounds> {
        let (width, height) = image.dimensions();
        if width < 8 || height < 8 {
            return None;
        }

        let gray = imageops::grayscale(image);
        let scale = if width > self.config.working_width {
            self.config.working_width as f32 / width as f32
        } else {
            1.0
        };
        let work = if scale < 1.0 {
            let w = ((width as f32 * scale).round() as u32).max(1);
            let h = ((height as f32 * scale).round() as u32).max(1);
            imageops::resize(&gray, w, h, FilterType::Triangle)
        } else {
            gray
        };

        let edges = vertical_edges(&work);
        let level = otsu_level(&edges).max(MIN_EDGE_LEVEL);
        let binary = GrayImage::from_fn(edges.width(), edges.height(), |x, y| {
            if edges.get_pixel(x, y)[0] > level {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let merged = dilate(&binary, Norm::LInf, self.config.dilate_radius);

        let frame_area = (work.width() * work.height()) as f32;
        let mut best: Option<(f32, PlateBounds)> = None;

        for contour in find_contours::<i32>(&merged) {
            if contour.border_type != BorderType::Outer || contour.points.is_empty() {
                continue;
            }

            let bounds = bounding_box(&contour.points);
            let area_fraction = bounds.area() as f32 / frame_area;
            let aspect = bounds.aspect_ratio();
            if aspect < self.config.min_aspect
                || aspect > self.config.max_aspect
                || area_fraction < self.config.min_area_fraction
                || area_fraction > self.config.max_area_fraction
            {
                continue;
            }

            let fill = edge_fill(&binary, &bounds);
            trace!(
                "candidate {:?} aspect {:.2} area {:.4} fill {:.2}",
                bounds,
                aspect,
                area_fraction,
                fill
            );
            if fill < self.config.min_fill {
                continue;
            }

            let score = candidate_score(fill, area_fraction);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, bounds));
            }
        }

        best.map(|(_, bounds)| self.to_frame_bounds(bounds, scale, width, height))
    }

    /// Map working-resolution bounds back to the frame, adding the margin
    fn to_frame_bounds(&self, bounds: PlateBounds, scale: f32, width: u32, height: u32) -> PlateBounds {
        let inv = 1.0 / scale;
        let pad = bounds.height as f32 * self.config.margin;

        let x0 = ((bounds.x as f32 - pad) * inv).max(0.0) as u32;
        let y0 = ((bounds.y as f32 - pad) * inv).max(0.0) as u32;
        let x1 = (((bounds.x + bounds.width) as f32 + pad) * inv).ceil().min(width as f32) as u32;
        let y1 = (((bounds.y + bounds.height) as f32 + pad) * inv).ceil().min(height as f32) as u32;

        PlateBounds {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0).max(1),
            height: y1.saturating_sub(y0).max(1),
        }
    }
}

impl Default for EdgeDensityLocalizer {
    fn default() -> Self {
        Self::new(LocalizerConfig::default())
    }
}

impl PlateLocalizer for EdgeDensityLocalizer {
    fn correct_and_localize(&mut self, frame: &RgbaImage, rotation: f64) -> Localization {
        let (corrected, correction) = self.correct(frame, rotation);
        let bounds = self.find_plate(&corrected);
        let patch = bounds.map(|b| imageops::crop_imm(&corrected, b.x, b.y, b.width, b.height).to_image());

        if let Some(b) = bounds {
            debug!("Plate candidate at {:?} (correction {:.1} deg)", b, correction.to_degrees());
        }

        Localization {
            corrected,
            patch,
            bounds,
            correction,
        }
    }
}

/// Absolute horizontal gradient, scaled into u8
fn vertical_edges(gray: &GrayImage) -> GrayImage {
    let sobel = horizontal_sobel(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let magnitude = (sobel.get_pixel(x, y)[0] as i32).unsigned_abs() / 4;
        Luma([magnitude.min(255) as u8])
    })
}

fn bounding_box(points: &[imageproc::point::Point<i32>]) -> PlateBounds {
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0).max(min_x);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0).max(min_y);

    PlateBounds {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    }
}

/// Rank of a candidate region. Area enters as its square root so a large
/// sparse region does not outrank a dense plate-sized one.
fn candidate_score(fill: f32, area_fraction: f32) -> f32 {
    fill * area_fraction.sqrt()
}

/// Share of set pixels in `binary` inside `bounds`
fn edge_fill(binary: &GrayImage, bounds: &PlateBounds) -> f32 {
    let mut set = 0u32;
    for y in bounds.y..(bounds.y + bounds.height).min(binary.height()) {
        for x in bounds.x..(bounds.x + bounds.width).min(binary.width()) {
            if binary.get_pixel(x, y)[0] > 0 {
                set += 1;
            }
        }
    }
    set as f32 / bounds.area().max(1) as f32
}
