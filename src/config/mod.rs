//! Application Configuration
//!
//! Reader settings stored in TOML format. Every section falls back to its
//! defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::SmoothingConfig;
use crate::capture::CaptureConfig;
use crate::motion::MotionConfig;
use crate::vision::{LocalizerConfig, RecognitionConfig};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera session settings
    pub capture: CaptureConfig,
    /// Device motion settings
    pub motion: MotionConfig,
    /// Plate localizer tuning
    pub localizer: LocalizerConfig,
    /// Text recognition settings
    pub recognition: RecognitionConfig,
    /// Reading stabilization settings
    pub smoothing: SmoothingConfig,
    /// Output settings
    pub output: OutputConfig,
}

/// Where results go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for screen snapshots (frame.png, patch.png, reading.json)
    pub snapshot_dir: Option<PathBuf>,
    /// Write a frame snapshot every N frames
    pub snapshot_every: u64,
    /// Log label changes
    pub log_readings: bool,
    /// JSON run report written at exit
    pub report: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            snapshot_every: 30,
            log_readings: true,
            report: None,
        }
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "platereader", "PlateReader")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the config file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ResolutionPreset;
    use crate::vision::RecognizerBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check capture defaults
        assert!(config.capture.frames_dir.is_none());
        assert_eq!(config.capture.max_fps, 30);
        assert!(config.capture.discard_late_frames);
        assert_eq!(config.capture.preset, ResolutionPreset::Hd1280x720);

        // Check motion defaults
        assert_eq!(config.motion.update_interval_ms, 10);

        // Check localizer defaults
        assert!((config.localizer.min_correction_degrees - 0.5).abs() < 1e-9);

        // Check recognition defaults
        assert_eq!(config.recognition.backend, RecognizerBackend::Disabled);
        assert_eq!(config.recognition.language, "eng");

        // Check output defaults
        assert!(config.output.snapshot_dir.is_none());
        assert_eq!(config.output.snapshot_every, 30);
        assert!(config.output.log_readings);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.frames_dir = Some(PathBuf::from("/data/drive-01"));
        config.capture.max_frames = Some(500);
        config.motion.fixed_tilt_degrees = Some(12.5);
        config.recognition.backend = RecognizerBackend::Replay;
        config.recognition.transcript = Some(PathBuf::from("readings.txt"));
        config.smoothing.window = 9;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [capture]
            max_fps = 5

            [recognition]
            backend = "replay"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.capture.max_fps, 5);
        assert!(parsed.capture.discard_late_frames);
        assert_eq!(parsed.recognition.backend, RecognizerBackend::Replay);
        assert_eq!(parsed.smoothing, SmoothingConfig::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.output.snapshot_every = 7;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded.output.snapshot_every, 7);
        assert_eq!(config.capture.max_fps, loaded.capture.max_fps);
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        save_config(&AppConfig::default(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
