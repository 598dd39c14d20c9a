use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{DetectorOptions, DEFAULT_MAX_RESULTS, DEFAULT_SCORE_THRESHOLD};
use crate::pipeline::OverlayMode;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "lite-model.onnx";
const DEFAULT_MODEL_INPUT: u32 = 320;
const DEFAULT_OUTPUT_DIR: &str = "overlay_out";

pub const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct OverlaydConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayConfigFile>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    repeat: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    max_results: Option<usize>,
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OverlaydConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub overlay: OverlaySettings,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Replay a frame directory from the start once it runs out.
    pub repeat: bool,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub options: DetectorOptions,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub font_path: Option<PathBuf>,
    pub mode: OverlayMode,
}

impl OverlaydConfig {
    /// Defaults, then the JSON file named by `OVERLAYD_CONFIG`, then env
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_env("OVERLAYD_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file instead of `OVERLAYD_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlaydConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();

        let mode = match overlay.mode.as_deref() {
            Some(mode) => parse_mode(mode)?,
            None => OverlayMode::default(),
        };

        Ok(Self {
            source: SourceSettings {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                repeat: source.repeat.unwrap_or(false),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: detector.labels_path,
                input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                options: DetectorOptions {
                    max_results: detector.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
                    score_threshold: detector
                        .score_threshold
                        .unwrap_or(DEFAULT_SCORE_THRESHOLD),
                },
            },
            overlay: OverlaySettings {
                font_path: overlay.font_path,
                mode,
            },
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("OVERLAYD_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(backend) = non_empty_env("OVERLAYD_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("OVERLAYD_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("OVERLAYD_FONT_PATH") {
            self.overlay.font_path = Some(PathBuf::from(path));
        }
        if let Some(max) = non_empty_env("OVERLAYD_MAX_RESULTS") {
            self.detector.options.max_results = max
                .parse()
                .map_err(|_| anyhow!("OVERLAYD_MAX_RESULTS must be a positive integer"))?;
        }
        if let Some(threshold) = non_empty_env("OVERLAYD_SCORE_THRESHOLD") {
            self.detector.options.score_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("OVERLAYD_SCORE_THRESHOLD must be a number in [0, 1]"))?;
        }
        if let Some(dir) = non_empty_env("OVERLAYD_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check and normalize settings. Run again after applying CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source dimensions must be non-zero, got {}x{}",
                self.source.width,
                self.source.height
            ));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input dimensions must be non-zero"));
        }
        self.detector.backend = self.detector.backend.to_lowercase();
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected one of {}",
                self.detector.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        self.detector.options.validate()?;
        Ok(())
    }
}

pub fn parse_mode(value: &str) -> Result<OverlayMode> {
    match value.trim().to_lowercase().as_str() {
        "composite" => Ok(OverlayMode::Composite),
        "layer" => Ok(OverlayMode::Layer),
        other => Err(anyhow!(
            "unknown overlay mode '{}'; expected composite or layer",
            other
        )),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<OverlaydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_preview_settings() {
        let mut cfg = OverlaydConfig::from_file(OverlaydConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.source.url, "stub://camera");
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.detector.options, DetectorOptions::default());
        assert_eq!(cfg.overlay.mode, OverlayMode::Composite);
        assert!(cfg.overlay.font_path.is_none());
        assert!(!cfg.source.repeat);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = OverlaydConfig::from_file(OverlaydConfigFile::default()).unwrap();
        cfg.detector.backend = "tflite".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = OverlaydConfig::from_file(OverlaydConfigFile::default()).unwrap();
        cfg.detector.options.score_threshold = 2.0;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlaydConfig::from_file(OverlaydConfigFile::default()).unwrap();
        cfg.source.target_fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!(parse_mode("Layer").unwrap(), OverlayMode::Layer);
        assert_eq!(parse_mode(" composite ").unwrap(), OverlayMode::Composite);
        assert!(parse_mode("blend").is_err());
    }
}
