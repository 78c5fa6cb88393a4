//! Event configuration module.
//!
//! Handles loading, validating, and merging `config.toml` files. Stock
//! defaults are overridden by an optional `config.toml` in the event folder.
//!
//! ## Config File Location
//!
//! ```text
//! Wedding_2024-05-01/
//! ├── config.toml              # Event config (overrides stock defaults)
//! ├── event_data.txt           # Session ledger
//! ├── frame.png                # Template artwork
//! ├── digital/
//! └── output 1/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [photos]
//! aspect_ratio = [4, 5]     # Crop ratio for archival and working copies
//! archive_quality = 95      # JPEG quality of digital/photos
//! working_quality = 85      # JPEG quality of the session output copies
//! working_max_edge = 1200   # Longest edge of the session output copies
//!
//! [video]
//! ffmpeg = "ffmpeg"         # Encoder binary, name on PATH or a path
//! height = 480
//! codec = "libx264"
//! crf = 23
//! preset = "medium"
//! audio_codec = "aac"
//!
//! [template]
//! name = "DNP 6x4"          # Key into [templates]
//! position_offset_mm = 0.0  # -2.5 to 2.5 in 0.5 steps
//! # artwork = "frame.png"  # Relative to the event folder
//! export_pdf = false        # Also write print_session.pdf after composing
//!
//! [templates."DNP 6x4"]
//! width = 1800
//! height = 1200
//! margin_top = 4.0
//! margin_left = 4.0
//! margin_right = 4.0
//! margin_bottom = 12.4
//! dpi = 300
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::compose::{DEFAULT_TEMPLATE, PositionOffset, TemplateDefinition, builtin_templates};
use crate::imaging::{ArchiveConfig, AspectRatio, Quality, WorkingConfig};
use crate::video::EncoderSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file inside an event folder.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Event configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventConfig {
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Archival and working photo settings.
    pub photos: PhotosConfig,
    /// Working-copy video encoding.
    pub video: VideoConfig,
    /// Which print layout to use and how to place it.
    pub template: TemplateConfig,
    /// Print layouts by name. Stock layouts are always present.
    #[serde(default = "builtin_templates")]
    pub templates: BTreeMap<String, TemplateDefinition>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig::default(),
            photos: PhotosConfig::default(),
            video: VideoConfig::default(),
            template: TemplateConfig::default(),
            templates: builtin_templates(),
        }
    }
}

impl EventConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.photos;
        if p.aspect_ratio[0] == 0 || p.aspect_ratio[1] == 0 {
            return Err(ConfigError::Validation(
                "photos.aspect_ratio values must be non-zero".into(),
            ));
        }
        for (key, q) in [
            ("archive_quality", p.archive_quality),
            ("working_quality", p.working_quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Validation(format!(
                    "photos.{key} must be 1-100"
                )));
            }
        }
        if p.working_max_edge == 0 {
            return Err(ConfigError::Validation(
                "photos.working_max_edge must be positive".into(),
            ));
        }
        if self.video.height == 0 {
            return Err(ConfigError::Validation(
                "video.height must be positive".into(),
            ));
        }
        if self.video.crf > 51 {
            return Err(ConfigError::Validation("video.crf must be 0-51".into()));
        }
        if PositionOffset::from_mm(self.template.position_offset_mm).is_none() {
            return Err(ConfigError::Validation(
                "template.position_offset_mm must be a multiple of 0.5 between -2.5 and 2.5"
                    .into(),
            ));
        }
        if !self.templates.contains_key(&self.template.name) {
            return Err(ConfigError::Validation(format!(
                "template.name '{}' is not defined under [templates]",
                self.template.name
            )));
        }
        for (name, def) in &self.templates {
            let (w, h) = def.slot_size();
            if def.dpi == 0 || w == 0 || h == 0 {
                return Err(ConfigError::Validation(format!(
                    "templates.\"{name}\" leaves no room for photos"
                )));
            }
        }
        Ok(())
    }

    /// The selected template definition.
    pub fn template_definition(&self) -> Option<&TemplateDefinition> {
        self.templates.get(&self.template.name)
    }

    /// The configured position offset, zero if out of range.
    pub fn position_offset(&self) -> PositionOffset {
        PositionOffset::from_mm(self.template.position_offset_mm).unwrap_or_default()
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel derivation workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Archival and working photo settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhotosConfig {
    /// Crop ratio as `[width, height]`.
    pub aspect_ratio: [u32; 2],
    /// JPEG quality for `digital/photos`.
    pub archive_quality: u32,
    /// JPEG quality for session output copies.
    pub working_quality: u32,
    /// Longest edge of session output copies.
    pub working_max_edge: u32,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: [4, 5],
            archive_quality: 95,
            working_quality: 85,
            working_max_edge: 1200,
        }
    }
}

impl PhotosConfig {
    pub fn ratio(&self) -> AspectRatio {
        AspectRatio::new(self.aspect_ratio[0], self.aspect_ratio[1])
    }

    pub fn archive(&self) -> ArchiveConfig {
        ArchiveConfig {
            ratio: self.ratio(),
            quality: Quality::new(self.archive_quality),
        }
    }

    pub fn working(&self) -> WorkingConfig {
        WorkingConfig {
            max_edge: self.working_max_edge,
            quality: Quality::new(self.working_quality),
        }
    }
}

/// Working-copy video encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Encoder binary, looked up on `PATH` unless it is a path.
    pub ffmpeg: String,
    /// Output height; width follows the crop ratio.
    pub height: u32,
    pub codec: String,
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let s = EncoderSettings::default();
        Self {
            ffmpeg: "ffmpeg".to_string(),
            height: s.height,
            codec: s.video_codec,
            crf: s.crf,
            preset: s.preset,
            audio_codec: s.audio_codec,
        }
    }
}

impl VideoConfig {
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            height: self.height,
            video_codec: self.codec.clone(),
            crf: self.crf,
            preset: self.preset.clone(),
            audio_codec: self.audio_codec.clone(),
        }
    }
}

/// Print layout selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    /// Key into `[templates]`.
    pub name: String,
    /// Horizontal shift of the printed layout.
    pub position_offset_mm: f64,
    /// Artwork image relative to the event folder. When absent, the first
    /// image directly inside the event folder is used.
    pub artwork: Option<String>,
    /// Write `print_session.pdf` next to composed sheets.
    pub export_pdf: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_TEMPLATE.to_string(),
            position_offset_mm: 0.0,
            artwork: None,
            export_pdf: false,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(EventConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EventConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EventConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given event folder.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(event_dir: &Path) -> Result<EventConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(event_dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Vide Maker Event Configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file in the event folder as config.toml.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel derivation workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Photos
# ---------------------------------------------------------------------------
[photos]
# Crop ratio as [width, height]. Archival and working copies are
# centre-cropped to this ratio.
aspect_ratio = [4, 5]

# JPEG quality of the full-resolution copies in digital/photos.
archive_quality = 95

# JPEG quality and longest edge of the copies in each output folder.
working_quality = 85
working_max_edge = 1200

# ---------------------------------------------------------------------------
# Video
# ---------------------------------------------------------------------------
[video]
# Encoder binary, a name on PATH or a full path.
ffmpeg = "ffmpeg"

# Output height in pixels. Width follows the crop ratio.
height = 480

codec = "libx264"
crf = 23
preset = "medium"
audio_codec = "aac"

# ---------------------------------------------------------------------------
# Print template
# ---------------------------------------------------------------------------
[template]
# Which layout under [templates] to use.
name = "DNP 6x4"

# Shift the printed layout sideways, -2.5 to 2.5 mm in 0.5 mm steps.
position_offset_mm = 0.0

# Template artwork, relative to the event folder. When omitted, the first
# image directly inside the event folder is used.
# artwork = "frame.png"

# Also assemble the composed sheets into print_session.pdf.
export_pdf = false

# ---------------------------------------------------------------------------
# Layouts
# ---------------------------------------------------------------------------
# Canvas size in pixels, margins in millimetres inside each half.
[templates."DNP 6x4"]
width = 1800
height = 1200
margin_top = 4.0
margin_left = 4.0
margin_right = 4.0
margin_bottom = 12.4
dpi = 300
"##
}
