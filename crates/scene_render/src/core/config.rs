//! # Renderer Configuration
//!
//! Settings consumed by the scene renderers. Everything here is plain data:
//! the renderers read it at construction and never write it back.
//!
//! ## Configuration Categories
//!
//! - **Renderer**: logging level, statistics collection and the actor enable mask
//! - **Depth Peeling**: algorithm, pass budget, occlusion-query early exit and
//!   composition colours

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Depth peeling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PeelingMode {
    /// Dual depth peeling: peels the nearest and farthest layer per pass
    #[default]
    Dual,
    /// Classic front-to-back peeling: one layer per pass
    FrontToBack,
}

/// # Depth Peeling Configuration
///
/// Controls the order-independent transparency renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthPeelingConfig {
    /// Peeling algorithm
    pub mode: PeelingMode,
    /// Upper bound on peel iterations per frame
    pub max_passes: u32,
    /// Stop peeling as soon as an occlusion query reports zero samples
    pub use_occlusion_query: bool,
    /// Opacity applied to every fragment during peeling
    pub opacity: f32,
    /// Colour composed behind the transparent layers in the final pass
    pub background_color: [f32; 3],
}

impl Default for DepthPeelingConfig {
    fn default() -> Self {
        Self {
            mode: PeelingMode::Dual,
            max_passes: 4,
            use_occlusion_query: true,
            opacity: 0.6,
            background_color: [1.0, 1.0, 1.0],
        }
    }
}

impl DepthPeelingConfig {
    /// Set the peeling algorithm
    pub fn with_mode(mut self, mode: PeelingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the maximum number of peel iterations
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Enable or disable the occlusion-query early exit
    pub fn with_occlusion_query(mut self, enabled: bool) -> Self {
        self.use_occlusion_query = enabled;
        self
    }

    /// Set the per-fragment opacity
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set the background colour
    pub fn with_background_color(mut self, color: [f32; 3]) -> Self {
        self.background_color = color;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_passes == 0 {
            return Err("Depth peeling needs at least one pass".to_string());
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(format!("Opacity {} is outside [0, 1]", self.opacity));
        }
        if self.background_color.iter().any(|c| !c.is_finite()) {
            return Err("Background colour must be finite".to_string());
        }
        Ok(())
    }
}

/// # Renderer Configuration
///
/// Top-level settings for a rendering session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Log level filter handed to the logger (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Count objects, draws and primitives while rendering
    pub collect_statistics: bool,
    /// Actors whose enable mask does not intersect this are skipped
    pub enable_mask: u32,
    /// Depth peeling settings
    pub depth_peeling: DepthPeelingConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            collect_statistics: false,
            enable_mask: u32::MAX,
            depth_peeling: DepthPeelingConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable statistics collection
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.collect_statistics = enabled;
        self
    }

    /// Set the actor enable mask
    pub fn with_enable_mask(mut self, mask: u32) -> Self {
        self.enable_mask = mask;
        self
    }

    /// Set the depth peeling configuration
    pub fn with_depth_peeling(mut self, depth_peeling: DepthPeelingConfig) -> Self {
        self.depth_peeling = depth_peeling;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(format!("Unknown log level '{}'", self.log_level));
        }
        self.depth_peeling.validate()
    }

    /// Load from file and validate
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_passes_and_bad_opacity() {
        let zero = DepthPeelingConfig::default().with_max_passes(0);
        assert!(zero.validate().is_err());

        let opaque = DepthPeelingConfig::default().with_opacity(1.5);
        assert!(opaque.validate().is_err());

        let level = RendererConfig::default().with_log_level("loud");
        assert!(level.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("scene_render_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("renderer.toml");

        let config = RendererConfig::new()
            .with_statistics(true)
            .with_enable_mask(0b101)
            .with_depth_peeling(DepthPeelingConfig::default().with_mode(PeelingMode::FrontToBack));
        config.save_to_file(&path).unwrap();

        let loaded = RendererConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let parsed: RendererConfig = ron::from_str("(collect_statistics: true)").unwrap();
        assert!(parsed.collect_statistics);
        assert_eq!(parsed.depth_peeling, DepthPeelingConfig::default());
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = RendererConfig::default().save_to_file("renderer.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
