//! Application configuration.
//!
//! Loaded from config.json next to the executable, or from an explicit path.
//! Every section falls back to defaults for keys that are missing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::attendance::MatchOptions;
use crate::error::{Error, Result};
use crate::ocr::{ImageTransfer, PageSegMode, PreprocessOptions, RollNumberParser, RollPattern, Specificity};
use crate::paths;

/// OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Explicit tesseract executable; searched for when unset
    pub executable: Option<PathBuf>,
    /// Explicit tessdata directory; searched for when unset
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    pub page_segmentation_mode: PageSegMode,
    /// Modes tried in order when the primary mode finds no roll numbers
    pub fallback_modes: Vec<PageSegMode>,
    pub transfer: ImageTransfer,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            executable: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            page_segmentation_mode: PageSegMode::SingleBlock,
            fallback_modes: Vec::new(),
            transfer: ImageTransfer::Stdin,
        }
    }
}

/// A roll-number shape added on top of the built-in ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPattern {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub specificity: Specificity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub min_specificity: Specificity,
    pub extra_patterns: Vec<CustomPattern>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            min_specificity: Specificity::Partial,
            extra_patterns: Vec::new(),
        }
    }
}

impl ParserSettings {
    /// Builds a parser with the built-in patterns plus the configured extras.
    pub fn build_parser(&self) -> Result<RollNumberParser> {
        let mut parser = RollNumberParser::new().with_min_specificity(self.min_specificity);
        for custom in &self.extra_patterns {
            parser = parser.with_pattern(RollPattern::new(
                custom.name.clone(),
                &custom.pattern,
                custom.specificity,
            )?);
        }
        Ok(parser)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub preprocess: PreprocessOptions,
    pub ocr: OcrSettings,
    pub parser: ParserSettings,
    pub matching: MatchOptions,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Loads config.json from the executable's directory, falling back to
/// defaults when it is missing or unreadable.
pub fn load_default_config() -> AppConfig {
    let config_path = paths::get_config_path();

    if !config_path.exists() {
        info!("{} not found. Using default config.", config_path.display());
        return AppConfig::default();
    }

    match load_config(&config_path) {
        Ok(config) => {
            info!("Config loaded from {}", config_path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", config_path.display(), e);
            AppConfig::default()
        }
    }
}
