//! Temporal smoothing of plate readings
//!
//! Single OCR readings of a moving plate are noisy. The voting smoother keeps
//! a short history and votes per character position, newer readings
//! counting more, to produce a stable reading and a confidence score.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use strsim::normalized_levenshtein;
use tracing::{debug, info};

/// A stabilized reading
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SmoothedReading {
    pub text: String,
    /// Certainty in `text`, in [0, 1]
    pub confidence: f32,
}

/// Aggregates raw readings into a stabilized one
pub trait TemporalSmoother: Send {
    /// Feed one raw reading and get the current stabilized reading
    fn observe(&mut self, raw: &str) -> SmoothedReading;

    /// Forget all history
    fn reset(&mut self);
}

/// Smoothing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Number of accepted readings kept
    pub window: usize,
    /// Readings shorter than this (after normalization) are ignored
    pub min_length: usize,
    /// Readings longer than this are ignored
    pub max_length: usize,
    /// Readings less similar than this to the consensus are outliers
    pub min_similarity: f64,
    /// Consecutive outliers after which the history restarts
    pub reset_after_outliers: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: 15,
            min_length: 4,
            max_length: 10,
            min_similarity: 0.5,
            reset_after_outliers: 4,
        }
    }
}

/// Uppercase and keep only ASCII letters and digits
pub fn normalize_plate_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Per-position recency-weighted voting
pub struct VotingSmoother {
    config: SmoothingConfig,
    history: VecDeque<String>,
    outliers: Vec<String>,
    current: SmoothedReading,
}

impl VotingSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.window),
            config,
            outliers: Vec::new(),
            current: SmoothedReading::default(),
        }
    }

    /// Current stabilized reading without feeding a new one
    pub fn current(&self) -> &SmoothedReading {
        &self.current
    }

    /// Number of readings in the history
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn push(&mut self, reading: String) {
        if self.history.len() == self.config.window.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(reading);
    }

    fn recompute(&mut self) {
        self.current = vote(&self.history);
    }
}

impl Default for VotingSmoother {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}

impl TemporalSmoother for VotingSmoother {
    fn observe(&mut self, raw: &str) -> SmoothedReading {
        let reading = normalize_plate_text(raw);
        let len = reading.chars().count();
        if len < self.config.min_length || len > self.config.max_length {
            debug!("Ignoring reading {:?} (length {})", raw, len);
            return self.current.clone();
        }

        let is_outlier = !self.current.text.is_empty()
            && normalized_levenshtein(&reading, &self.current.text) < self.config.min_similarity;

        if is_outlier {
            self.outliers.push(reading);
            if self.outliers.len() < self.config.reset_after_outliers.max(1) {
                debug!("Outlier reading {:?} against {:?}", raw, self.current.text);
                return self.current.clone();
            }

            info!(
                "{} consecutive outliers, restarting history (was {:?})",
                self.outliers.len(),
                self.current.text
            );
            self.history.clear();
            for outlier in std::mem::take(&mut self.outliers) {
                self.push(outlier);
            }
        } else {
            self.outliers.clear();
            self.push(reading);
        }

        self.recompute();
        self.current.clone()
    }

    fn reset(&mut self) {
        self.history.clear();
        self.outliers.clear();
        self.current = SmoothedReading::default();
    }
}

/// Vote over a history ordered oldest first
fn vote(history: &VecDeque<String>) -> SmoothedReading {
    if history.is_empty() {
        return SmoothedReading::default();
    }

    let weighted: Vec<(Vec<char>, f32)> = history
        .iter()
        .enumerate()
        .map(|(i, r)| (r.chars().collect(), (i + 1) as f32))
        .collect();

    // (count, weight) per reading length
    let mut lengths: HashMap<usize, (usize, f32)> = HashMap::new();
    for (chars, w) in &weighted {
        let entry = lengths.entry(chars.len()).or_default();
        entry.0 += 1;
        entry.1 += w;
    }
    // Heaviest length wins, ties go to the longer reading
    let (modal_len, (modal_count, _)) = lengths
        .into_iter()
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1).then(a.0.cmp(&b.0)))
        .unwrap_or((0, (0, 0.0)));

    let voters: Vec<&(Vec<char>, f32)> = weighted.iter().filter(|(c, _)| c.len() == modal_len).collect();

    let mut text = String::with_capacity(modal_len);
    let mut share_sum = 0.0f32;
    for pos in 0..modal_len {
        let mut votes: HashMap<char, f32> = HashMap::new();
        for (chars, w) in &voters {
            *votes.entry(chars[pos]).or_default() += w;
        }
        let position_total: f32 = votes.values().sum();
        let (winner, winner_weight) = votes
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
            .unwrap_or((' ', 0.0));
        text.push(winner);
        share_sum += winner_weight / position_total.max(f32::EPSILON);
    }

    let agreement = if modal_len == 0 { 0.0 } else { share_sum / modal_len as f32 };
    let length_share = modal_count as f32 / history.len() as f32;
    let confidence = (agreement * length_share).clamp(0.0, 1.0);

    SmoothedReading { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(smoother: &mut VotingSmoother, readings: &[&str]) -> SmoothedReading {
        let mut last = SmoothedReading::default();
        for r in readings {
            last = smoother.observe(r);
        }
        last
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_plate_text(" ab-12 34\n"), "AB1234");
        assert_eq!(normalize_plate_text("ÄB12"), "B12");
    }

    #[test]
    fn test_empty_history() {
        let smoother = VotingSmoother::default();
        assert_eq!(smoother.current(), &SmoothedReading::default());
    }

    #[test]
    fn test_single_reading_is_fully_confident() {
        let mut smoother = VotingSmoother::default();
        let out = smoother.observe("1ab 2345");
        assert_eq!(out.text, "1AB2345");
        assert!((out.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_majority_fixes_misread_character() {
        let mut smoother = VotingSmoother::default();
        let out = feed(&mut smoother, &["1AB2345", "1AB2345", "1A82345", "1AB2345"]);
        assert_eq!(out.text, "1AB2345");
        assert!(out.confidence > 0.8 && out.confidence < 1.0, "{}", out.confidence);
    }

    #[test]
    fn test_length_disagreement_lowers_confidence() {
        let mut agreeing = VotingSmoother::default();
        let mut split = VotingSmoother::default();

        let a = feed(&mut agreeing, &["1AB2345", "1AB2345", "1AB2345"]);
        let b = feed(&mut split, &["1AB2345", "1AB23455", "1AB2345"]);
        assert_eq!(b.text, "1AB2345");
        assert!(b.confidence < a.confidence);
    }

    #[test]
    fn test_confidence_scales_with_share_of_modal_length() {
        let mut smoother = VotingSmoother::default();
        let out = feed(&mut smoother, &["1AB2345", "1AB23455", "1AB2345"]);
        // Both seven-character readings agree, so only the length split counts
        assert!((out.confidence - 2.0 / 3.0).abs() < 1e-6, "{}", out.confidence);

        let out = smoother.observe("1AB23455");
        // Two of four readings per length, the newer eight-character ones weigh more
        assert_eq!(out.text, "1AB23455");
        assert!((out.confidence - 0.5).abs() < 1e-6, "{}", out.confidence);
    }

    #[test]
    fn test_out_of_range_lengths_are_ignored() {
        let mut smoother = VotingSmoother::default();
        smoother.observe("1AB2345");
        let out = smoother.observe("AB");
        assert_eq!(out.text, "1AB2345");
        assert_eq!(smoother.history_len(), 1);

        let out = smoother.observe("1AB2345678901");
        assert_eq!(out.text, "1AB2345");
        assert_eq!(smoother.history_len(), 1);
    }

    #[test]
    fn test_isolated_outlier_does_not_change_reading() {
        let mut smoother = VotingSmoother::default();
        let out = feed(&mut smoother, &["1AB2345", "1AB2345", "XYZ9876", "1AB2345"]);
        assert_eq!(out.text, "1AB2345");
        assert_eq!(smoother.history_len(), 3);
    }

    #[test]
    fn test_new_plate_takes_over_after_consecutive_outliers() {
        let mut smoother = VotingSmoother::default();
        feed(&mut smoother, &["1AB2345", "1AB2345", "1AB2345"]);

        let out = feed(&mut smoother, &["XYZ9876", "XYZ9876", "XYZ9876"]);
        assert_eq!(out.text, "1AB2345");

        let out = smoother.observe("XYZ9876");
        assert_eq!(out.text, "XYZ9876");
        assert_eq!(smoother.history_len(), 4);
    }

    #[test]
    fn test_window_is_bounded() {
        let config = SmoothingConfig {
            window: 5,
            ..Default::default()
        };
        let mut smoother = VotingSmoother::new(config);
        for _ in 0..12 {
            smoother.observe("1AB2345");
        }
        assert_eq!(smoother.history_len(), 5);
    }

    #[test]
    fn test_recent_readings_win_ties() {
        let mut smoother = VotingSmoother::default();
        let out = feed(&mut smoother, &["1AB2345", "1AB2346"]);
        assert_eq!(out.text, "1AB2346");
    }

    #[test]
    fn test_confidence_stays_in_unit_range() {
        let mut smoother = VotingSmoother::default();
        let readings = ["1AB2345", "1A82345", "1AB234", "IAB2345", "1AB2345", "1A823A5", "1AB2345"];
        for r in readings.iter().cycle().take(40) {
            let out = smoother.observe(r);
            assert!((0.0..=1.0).contains(&out.confidence));
        }
    }

    #[test]
    fn test_reset() {
        let mut smoother = VotingSmoother::default();
        smoother.observe("1AB2345");
        smoother.reset();
        assert_eq!(smoother.history_len(), 0);
        assert_eq!(smoother.current().text, "");
    }
}
