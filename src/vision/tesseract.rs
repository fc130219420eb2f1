//! Tesseract recognizer (via leptess)
//!
//! A fresh Tesseract instance is created per call; the engine handle is not
//! `Send` and recognition runs on the worker thread.

use image::GrayImage;
use leptess::{LepTess, Variable};

use super::recognize::{RecognitionError, TextRecognizer};

/// Page segmentation mode 7: treat the image as a single text line
const SINGLE_LINE_PSM: &str = "7";

pub struct TesseractRecognizer {
    language: String,
    whitelist: String,
}

impl TesseractRecognizer {
    /// Check that Tesseract and the language data are available
    pub fn new(language: &str, whitelist: &str) -> Result<Self, RecognitionError> {
        LepTess::new(None, language).map_err(|e| {
            RecognitionError::Init(format!("Failed to initialize Tesseract. Is Tesseract installed? {}", e))
        })?;

        Ok(Self {
            language: language.to_string(),
            whitelist: whitelist.to_string(),
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&mut self, patch: &GrayImage) -> Result<String, RecognitionError> {
        let mut tesseract = LepTess::new(None, &self.language)
            .map_err(|e| RecognitionError::Init(e.to_string()))?;

        tesseract
            .set_variable(Variable::TesseditCharWhitelist, &self.whitelist)
            .map_err(|e| RecognitionError::Init(e.to_string()))?;
        tesseract
            .set_variable(Variable::TesseditPagesegMode, SINGLE_LINE_PSM)
            .map_err(|e| RecognitionError::Init(e.to_string()))?;

        // leptess takes encoded image data
        let mut png_bytes = Vec::new();
        patch
            .write_to(&mut std::io::Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .map_err(|e| RecognitionError::Image(e.to_string()))?;

        tesseract
            .set_image_from_mem(&png_bytes)
            .map_err(|e| RecognitionError::Image(e.to_string()))?;

        let text = tesseract
            .get_utf8_text()
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;

        Ok(text.trim().to_string())
    }
}
