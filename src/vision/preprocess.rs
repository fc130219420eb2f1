//! Patch preprocessing for OCR
//!
//! Turns a colour plate crop into a clean, high-contrast grayscale image
//! that text recognizers handle reliably.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::contrast::{equalize_histogram, otsu_level};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Preprocessing settings applied to every plate patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchPreprocessing {
    /// Whether preprocessing is enabled at all (grayscale conversion always happens)
    pub enabled: bool,
    /// Patches shorter than this are upscaled (OCR needs ~40px glyphs)
    pub min_height: u32,
    /// Upscale factor is capped at this value
    pub max_scale: u32,
    /// Spread the histogram before thresholding
    pub equalize: bool,
    /// Binarize with Otsu's threshold
    pub binarize: bool,
    /// Invert (for light text on dark plates)
    pub invert: bool,
}

impl Default for PatchPreprocessing {
    fn default() -> Self {
        Self {
            enabled: true,
            min_height: 48,
            max_scale: 4,
            equalize: true,
            binarize: true,
            invert: false,
        }
    }
}

/// Prepare a plate patch for recognition
pub fn preprocess_patch(patch: &RgbaImage, settings: &PatchPreprocessing) -> GrayImage {
    let gray = imageops::grayscale(patch);
    if !settings.enabled {
        return gray;
    }

    let scale = upscale_factor(gray.height(), settings.min_height, settings.max_scale);
    let mut result = if scale > 1 {
        debug!(
            "Upscaling {}x{} patch by {}x",
            gray.width(),
            gray.height(),
            scale
        );
        imageops::resize(
            &gray,
            gray.width() * scale,
            gray.height() * scale,
            FilterType::CatmullRom,
        )
    } else {
        gray
    };

    if settings.equalize {
        result = equalize_histogram(&result);
    }

    if settings.binarize {
        let level = otsu_level(&result);
        for px in result.pixels_mut() {
            *px = if px[0] > level { Luma([255]) } else { Luma([0]) };
        }
    }

    if settings.invert {
        imageops::invert(&mut result);
    }

    result
}

/// Integer upscale needed to reach `min_height`, clamped to `1..=max_scale`
fn upscale_factor(height: u32, min_height: u32, max_scale: u32) -> u32 {
    if height == 0 || height >= min_height {
        return 1;
    }
    let needed = (min_height as f32 / height as f32).ceil() as u32;
    needed.clamp(1, max_scale.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_tone_patch(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([30, 30, 30, 255])
            } else {
                Rgba([220, 220, 220, 255])
            }
        })
    }

    #[test]
    fn test_upscale_factor() {
        assert_eq!(upscale_factor(60, 48, 4), 1);
        assert_eq!(upscale_factor(20, 48, 4), 3);
        assert_eq!(upscale_factor(5, 48, 4), 4);
        assert_eq!(upscale_factor(0, 48, 4), 1);
    }

    #[test]
    fn test_small_patch_is_upscaled() {
        let out = preprocess_patch(&two_tone_patch(40, 16), &PatchPreprocessing::default());
        assert_eq!(out.dimensions(), (120, 48));
    }

    #[test]
    fn test_binarized_output_is_two_level() {
        let out = preprocess_patch(&two_tone_patch(100, 50), &PatchPreprocessing::default());
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(99, 0)[0], 255);
    }

    #[test]
    fn test_invert() {
        let settings = PatchPreprocessing {
            invert: true,
            ..Default::default()
        };
        let out = preprocess_patch(&two_tone_patch(100, 50), &settings);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(99, 0)[0], 0);
    }

    #[test]
    fn test_disabled_only_converts_to_grayscale() {
        let settings = PatchPreprocessing {
            enabled: false,
            ..Default::default()
        };
        let out = preprocess_patch(&two_tone_patch(10, 4), &settings);
        assert_eq!(out.dimensions(), (10, 4));
        assert_eq!(out.get_pixel(0, 0)[0], 30);
    }
}
