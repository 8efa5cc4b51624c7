//! MSDF font metrics
//!
//! The atlas itself is generated offline. What the renderer consumes is the
//! generator's metric dump ([`MsdfFontDescription`]) plus the atlas texture.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FontError, FontResult};
use crate::config::Config;
use crate::render::texture::Texture2D;

/// Rectangle in atlas pixels or em units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge
    pub left: f64,
    /// Bottom edge
    pub bottom: f64,
    /// Right edge
    pub right: f64,
    /// Top edge
    pub top: f64,
}

impl Bounds {
    /// Create bounds from edges
    pub const fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }
}

/// Geometry of one glyph
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlyphGeometry {
    /// Horizontal advance in em units
    pub advance: f64,
    /// Region of the atlas in pixels; `None` for whitespace
    pub atlas_bounds: Option<Bounds>,
    /// Quad relative to the pen position in em units; `None` for whitespace
    pub plane_bounds: Option<Bounds>,
}

/// Vertical font metrics in em units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontMetrics {
    /// Ascender above the baseline
    pub ascender_y: f64,
    /// Descender (negative, below the baseline)
    pub descender_y: f64,
    /// Baseline to baseline distance
    pub line_height: f64,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            ascender_y: 1.0,
            descender_y: 0.0,
            line_height: 1.0,
        }
    }
}

/// Glyph entry of a font description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphEntry {
    /// Character
    pub unicode: char,
    /// Geometry
    #[serde(flatten)]
    pub geometry: GlyphGeometry,
}

/// Kerning adjustment between two characters, in em units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KerningPair {
    /// Left character
    pub first: char,
    /// Right character
    pub second: char,
    /// Added to the advance of `first`
    pub advance: f64,
}

/// Serialised output of the atlas generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsdfFontDescription {
    /// Atlas width in pixels
    pub atlas_width: u32,
    /// Atlas height in pixels
    pub atlas_height: u32,
    /// Vertical metrics
    pub metrics: FontMetrics,
    /// Glyph table
    pub glyphs: Vec<GlyphEntry>,
    /// Kerning table
    pub kerning: Vec<KerningPair>,
}

impl Config for MsdfFontDescription {}

/// Font ready for layout: metrics, glyph lookup and atlas texture
#[derive(Debug, Clone)]
pub struct MsdfFont {
    metrics: FontMetrics,
    glyphs: HashMap<char, GlyphGeometry>,
    kerning: HashMap<(char, char), f64>,
    atlas: Option<Arc<Texture2D>>,
    atlas_size: (u32, u32),
}

impl MsdfFont {
    /// Build a font from a description and its atlas texture
    pub fn from_description(
        description: &MsdfFontDescription,
        atlas: Option<Arc<Texture2D>>,
    ) -> FontResult<Self> {
        let metrics = description.metrics;
        if (metrics.ascender_y - metrics.descender_y).abs() <= f64::EPSILON {
            return Err(FontError::Load(
                "ascender and descender must differ".to_string(),
            ));
        }
        if description.atlas_width == 0 || description.atlas_height == 0 {
            return Err(FontError::Load("atlas size must not be zero".to_string()));
        }

        let glyphs = description
            .glyphs
            .iter()
            .map(|entry| (entry.unicode, entry.geometry))
            .collect();
        let kerning = description
            .kerning
            .iter()
            .map(|pair| ((pair.first, pair.second), pair.advance))
            .collect();

        Ok(Self {
            metrics,
            glyphs,
            kerning,
            atlas,
            atlas_size: (description.atlas_width, description.atlas_height),
        })
    }

    /// Load a description from a `.toml` or `.ron` file
    pub fn load(path: impl AsRef<Path>, atlas: Option<Arc<Texture2D>>) -> FontResult<Self> {
        let description = MsdfFontDescription::load_from_file(path)
            .map_err(|e| FontError::Load(e.to_string()))?;
        Self::from_description(&description, atlas)
    }

    /// Geometry of `c`
    pub fn glyph(&self, c: char) -> Option<&GlyphGeometry> {
        self.glyphs.get(&c)
    }

    /// Kerning between `c` and `next`
    pub fn kerning(&self, c: char, next: char) -> f64 {
        self.kerning.get(&(c, next)).copied().unwrap_or(0.0)
    }

    /// Advance of `c` followed by `next`, kerning included; zero if `c` is missing
    pub fn advance(&self, c: char, next: char) -> f64 {
        self.glyph(c)
            .map_or(0.0, |glyph| glyph.advance + self.kerning(c, next))
    }

    /// Vertical metrics
    pub const fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    /// Scale that maps the ascender-descender span to one unit
    pub fn font_scale(&self) -> f64 {
        1.0 / (self.metrics.ascender_y - self.metrics.descender_y)
    }

    /// Atlas texture, if loaded
    pub const fn atlas(&self) -> Option<&Arc<Texture2D>> {
        self.atlas.as_ref()
    }

    /// Atlas size in pixels
    pub const fn atlas_size(&self) -> (u32, u32) {
        self.atlas_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DESCRIPTION: &str = r#"
atlas_width = 256
atlas_height = 256

[metrics]
ascender_y = 0.9
descender_y = -0.3
line_height = 1.2

[[glyphs]]
unicode = " "
advance = 0.25

[[glyphs]]
unicode = "A"
advance = 0.6
atlas_bounds = { left = 0.0, bottom = 0.0, right = 32.0, top = 32.0 }
plane_bounds = { left = 0.0, bottom = -0.1, right = 0.6, top = 0.8 }

[[kerning]]
first = "A"
second = "V"
advance = -0.05
"#;

    #[test]
    fn test_description_from_toml() {
        let description = MsdfFontDescription::from_toml_str(DESCRIPTION).unwrap();
        let font = MsdfFont::from_description(&description, None).unwrap();

        assert!(font.glyph('A').is_some());
        assert!(font.glyph(' ').unwrap().plane_bounds.is_none());
        assert_relative_eq!(font.font_scale(), 1.0 / 1.2, epsilon = 1e-12);
        assert_relative_eq!(font.advance('A', 'V'), 0.55, epsilon = 1e-12);
        assert_relative_eq!(font.advance('A', 'B'), 0.6);
        assert_relative_eq!(font.advance('Z', 'A'), 0.0);
        assert!(font.atlas().is_none());
    }

    #[test]
    fn test_degenerate_metrics_rejected() {
        let description = MsdfFontDescription {
            atlas_width: 16,
            atlas_height: 16,
            metrics: FontMetrics {
                ascender_y: 0.5,
                descender_y: 0.5,
                line_height: 1.0,
            },
            ..Default::default()
        };
        assert!(matches!(
            MsdfFont::from_description(&description, None),
            Err(FontError::Load(_))
        ));
    }
}
