//! Configuration system
//!
//! Renderer settings persist as TOML or RON. The format is picked from the
//! file extension.

use std::path::Path;

pub use serde::{Serialize, Deserialize};

use crate::foundation::logging::LoggingConfig;
use crate::render::scene::SceneInfo;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            ConfigFormat::Toml => Self::from_toml_str(&contents),
            ConfigFormat::Ron => Self::from_ron_str(&contents),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => self.to_toml_string()?,
            ConfigFormat::Ron => self.to_ron_string()?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Parse from a TOML document
    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse from a RON document
    fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize as pretty TOML
    fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Serialize as pretty RON
    fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Capacities and defaults of the batched 2D renderer
///
/// Capacities are counted in shapes; vertex capacities are derived from them
/// so every buffer holds a whole number of shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Renderer2DConfig {
    /// Quads per batch (also sizes the shared index buffer)
    pub max_quads: usize,
    /// Circles per batch
    pub max_circles: usize,
    /// Line segments per batch
    pub max_lines: usize,
    /// Glyph quads per batch
    pub max_text_quads: usize,
    /// Texture slots, slot 0 being the white fallback
    pub max_texture_slots: usize,
    /// Initial line width
    pub line_width: f32,
}

impl Default for Renderer2DConfig {
    fn default() -> Self {
        Self {
            max_quads: 10_000,
            max_circles: 10_000,
            max_lines: 10_000,
            max_text_quads: 10_000,
            max_texture_slots: 32,
            line_width: 2.0,
        }
    }
}

impl Renderer2DConfig {
    /// Reject zero capacities and slot counts the shaders cannot address
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("max_quads", self.max_quads),
            ("max_circles", self.max_circles),
            ("max_lines", self.max_lines),
            ("max_text_quads", self.max_text_quads),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }

        if !(2..=32).contains(&self.max_texture_slots) {
            return Err(ConfigError::Invalid(format!(
                "max_texture_slots must be within 2..=32, got {}",
                self.max_texture_slots
            )));
        }

        if !(self.line_width > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "line_width must be positive, got {}",
                self.line_width
            )));
        }

        Ok(())
    }
}

/// Size of the editor viewport in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Logger setup
    pub logging: LoggingConfig,
    /// 2D batch capacities
    pub renderer2d: Renderer2DConfig,
    /// Persisted scene settings
    pub scene: SceneInfo,
    /// Initial viewport size
    pub viewport: ViewportConfig,
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer2d.validate()?;
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid("viewport must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::scene::RenderMode;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer2d.max_quads, 10_000);
        assert_eq!(config.renderer2d.max_texture_slots, 32);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Renderer2DConfig {
            max_lines: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_too_many_slots() {
        let config = Renderer2DConfig {
            max_texture_slots: 64,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str(
            "[renderer2d]\nmax_quads = 128\n\n[scene]\nrender_mode = \"Forward\"\n",
        )
        .unwrap();
        assert_eq!(config.renderer2d.max_quads, 128);
        assert_eq!(config.renderer2d.max_circles, 10_000);
        assert_eq!(config.scene.render_mode(), RenderMode::Forward);
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = RendererConfig::default();
        config.viewport.width = 640;
        let text = config.to_ron_string().unwrap();
        let parsed = RendererConfig::from_ron_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererConfig::load_from_file("renderer.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
