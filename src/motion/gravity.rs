//! Gravity vector sources
//!
//! A `GravitySource` stands in for the device motion service. Recorded
//! sources replay samples captured alongside a frame recording.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gravity component of the device acceleration, in g
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GravityVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GravityVector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Gravity for a device held upright and tilted `degrees` clockwise
    /// around the screen normal
    pub fn from_tilt_degrees(degrees: f64) -> Self {
        let theta = degrees.to_radians();
        Self::new(-theta.sin(), -theta.cos(), 0.0)
    }
}

/// Provider of gravity samples, polled at the motion update interval
pub trait GravitySource: Send {
    /// Latest sample, or `None` when no update is available this tick
    fn sample(&mut self) -> Option<GravityVector>;
}

/// Source returning the same vector on every tick
#[derive(Debug, Clone, Copy)]
pub struct FixedGravity(pub GravityVector);

impl GravitySource for FixedGravity {
    fn sample(&mut self) -> Option<GravityVector> {
        Some(self.0)
    }
}

/// Source replaying recorded samples cyclically
#[derive(Debug, Clone)]
pub struct RecordedGravity {
    samples: Vec<GravityVector>,
    cursor: usize,
}

impl RecordedGravity {
    /// Create from in-memory samples
    pub fn new(samples: Vec<GravityVector>) -> Self {
        Self { samples, cursor: 0 }
    }

    /// Load `x,y,z` lines from a CSV file. Blank lines and lines starting
    /// with `#` are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gravity recording {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid gravity recording {:?}", path))
    }

    /// Parse CSV content
    pub fn parse(content: &str) -> Result<Self> {
        let samples = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(idx, line)| parse_gravity_line(line).with_context(|| format!("line {}", idx + 1)))
            .collect::<Result<Vec<_>>>()?;

        if samples.is_empty() {
            return Err(anyhow!("no gravity samples"));
        }

        Ok(Self::new(samples))
    }

    /// Number of recorded samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the recording is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl GravitySource for RecordedGravity {
    fn sample(&mut self) -> Option<GravityVector> {
        if self.samples.is_empty() {
            return None;
        }
        let sample = self.samples[self.cursor];
        self.cursor = (self.cursor + 1) % self.samples.len();
        Some(sample)
    }
}

/// Parse a single `x,y,z` line
pub fn parse_gravity_line(line: &str) -> Result<GravityVector> {
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() != 3 {
        return Err(anyhow!("expected 3 comma-separated values, got {}", parts.len()));
    }

    let value = |s: &str| {
        s.parse::<f64>()
            .map_err(|e| anyhow!("invalid number {:?}: {}", s, e))
    };

    Ok(GravityVector::new(value(parts[0])?, value(parts[1])?, value(parts[2])?))
}
