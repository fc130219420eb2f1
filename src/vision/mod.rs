//! Vision Layer
//!
//! Plate localization on corrected frames, patch preprocessing and text
//! recognition. Localizer and recognizer are traits so the pipeline can run
//! with the built-in implementations or with fakes.

pub mod localize;
pub mod preprocess;
pub mod recognize;
pub mod replay;
#[cfg(feature = "tesseract")]
pub mod tesseract;

pub use localize::{EdgeDensityLocalizer, Localization, LocalizerConfig, PlateBounds, PlateLocalizer};
pub use preprocess::{preprocess_patch, PatchPreprocessing};
pub use recognize::{
    build_recognizer, RecognitionConfig, RecognitionError, RecognitionJob, RecognitionOutcome,
    RecognitionWorker, RecognizerBackend, TextRecognizer,
};
pub use replay::ReplayRecognizer;
