//! Analysis Layer
//!
//! Turns raw OCR readings into a stabilized plate reading.

pub mod smoothing;

pub use smoothing::{normalize_plate_text, SmoothedReading, SmoothingConfig, TemporalSmoother, VotingSmoother};
