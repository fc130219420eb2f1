//! PlateReader - Real-time license plate reading
//!
//! Camera frames are corrected for device tilt, searched for a plate
//! candidate, read by a text recognizer and stabilized over time before
//! being presented. Every stage is a trait so the pipeline runs with the
//! built-in implementations or with custom ones.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod display;
pub mod motion;
pub mod shared;
pub mod vision;

pub use app::{Capabilities, PlateReaderApp, RunSummary};
pub use config::AppConfig;
