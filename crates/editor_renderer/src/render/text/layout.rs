//! Text layout engine
//!
//! Converts a string into glyph quads in text space. The layout is computed
//! completely before anything is written to a batch, so a string that cannot
//! be laid out produces no geometry at all.
//!
//! # Layout Coordinate System
//!
//! - Origin (0, 0) is the baseline of the first character
//! - +X axis points right, +Y axis points up
//! - One unit is the ascender-descender span of the font

use serde::{Deserialize, Serialize};

use super::{FontError, FontResult, MsdfFont};
use crate::foundation::math::{Vec2, Vec4};

/// Spaces a tab advances by
const TAB_WIDTH: f64 = 4.0;

/// Glyph substituted for characters missing from the font
const FALLBACK_GLYPH: char = '?';

/// Text styling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    /// Glyph colour
    pub color: Vec4,
    /// Extra horizontal space after every character
    pub kerning: f32,
    /// Extra vertical space between lines
    pub line_spacing: f32,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            kerning: 0.0,
            line_spacing: 0.0,
        }
    }
}

/// One positioned glyph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphQuad {
    /// Character that was laid out (after fallback substitution)
    pub glyph: char,
    /// Bottom-left corner in text space
    pub min: Vec2,
    /// Top-right corner in text space
    pub max: Vec2,
    /// Bottom-left texture coordinate
    pub tex_min: Vec2,
    /// Top-right texture coordinate
    pub tex_max: Vec2,
}

impl GlyphQuad {
    /// Corner positions: bottom-left, top-left, top-right, bottom-right
    pub fn positions(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.min.x, self.max.y),
            self.max,
            Vec2::new(self.max.x, self.min.y),
        ]
    }

    /// Texture coordinates matching [`GlyphQuad::positions`]
    pub fn tex_coords(&self) -> [Vec2; 4] {
        [
            self.tex_min,
            Vec2::new(self.tex_min.x, self.tex_max.y),
            self.tex_max,
            Vec2::new(self.tex_max.x, self.tex_min.y),
        ]
    }
}

/// Lay out `text` with `font`
///
/// - `\r` is ignored, `\n` returns the pen to x = 0 and moves down one line
/// - spaces and tabs advance the pen without emitting geometry
/// - a missing glyph is replaced by `?`; if `?` is missing as well the whole
///   string is rejected with [`FontError::GlyphNotFound`]
///
/// A font without a space glyph is rejected up front.
#[allow(clippy::cast_possible_truncation)]
pub fn layout_text(text: &str, font: &MsdfFont, params: &TextParams) -> FontResult<Vec<GlyphQuad>> {
    let space_advance = font.glyph(' ').ok_or(FontError::GlyphNotFound(' '))?.advance;

    let (atlas_width, atlas_height) = font.atlas_size();
    if atlas_width == 0 || atlas_height == 0 {
        return Err(FontError::MissingAtlas);
    }
    let texel = (1.0 / f64::from(atlas_width), 1.0 / f64::from(atlas_height));

    let scale = font.font_scale();
    let kerning = f64::from(params.kerning);
    let line_spacing = f64::from(params.line_spacing);

    let chars: Vec<char> = text.chars().collect();
    let mut quads = Vec::with_capacity(chars.len());
    let (mut x, mut y) = (0.0_f64, 0.0_f64);

    for (i, &c) in chars.iter().enumerate() {
        let next = chars.get(i + 1).copied();

        match c {
            '\r' => continue,
            '\n' => {
                x = 0.0;
                y -= scale * font.metrics().line_height + line_spacing;
                continue;
            }
            ' ' => {
                let advance = next.map_or(space_advance, |next| font.advance(' ', next));
                x += scale * advance + kerning;
                continue;
            }
            '\t' => {
                x += TAB_WIDTH * (scale * space_advance + kerning);
                continue;
            }
            _ => {}
        }

        let (glyph_char, glyph) = match font.glyph(c) {
            Some(glyph) => (c, glyph),
            None => match font.glyph(FALLBACK_GLYPH) {
                Some(glyph) => (FALLBACK_GLYPH, glyph),
                None => return Err(FontError::GlyphNotFound(c)),
            },
        };

        let plane = glyph.plane_bounds.unwrap_or_default();
        let atlas = glyph.atlas_bounds.unwrap_or_default();

        quads.push(GlyphQuad {
            glyph: glyph_char,
            min: Vec2::new(
                (plane.left * scale + x) as f32,
                (plane.bottom * scale + y) as f32,
            ),
            max: Vec2::new(
                (plane.right * scale + x) as f32,
                (plane.top * scale + y) as f32,
            ),
            tex_min: Vec2::new((atlas.left * texel.0) as f32, (atlas.bottom * texel.1) as f32),
            tex_max: Vec2::new((atlas.right * texel.0) as f32, (atlas.top * texel.1) as f32),
        });

        if let Some(next) = next {
            let advance = glyph.advance + font.kerning(c, next);
            x += scale * advance + kerning;
        }
    }

    Ok(quads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::text::{Bounds, FontMetrics, GlyphEntry, GlyphGeometry, MsdfFontDescription};
    use approx::assert_relative_eq;

    fn glyph(unicode: char, advance: f64) -> GlyphEntry {
        GlyphEntry {
            unicode,
            geometry: GlyphGeometry {
                advance,
                atlas_bounds: Some(Bounds::new(0.0, 0.0, 50.0, 100.0)),
                plane_bounds: Some(Bounds::new(0.0, 0.0, 0.5, 1.0)),
            },
        }
    }

    fn font(chars: &[char]) -> MsdfFont {
        let mut glyphs = vec![GlyphEntry {
            unicode: ' ',
            geometry: GlyphGeometry {
                advance: 0.25,
                ..Default::default()
            },
        }];
        glyphs.extend(chars.iter().map(|&c| glyph(c, 0.5)));

        let description = MsdfFontDescription {
            atlas_width: 100,
            atlas_height: 200,
            metrics: FontMetrics {
                ascender_y: 1.0,
                descender_y: 0.0,
                line_height: 1.5,
            },
            glyphs,
            kerning: Vec::new(),
        };
        MsdfFont::from_description(&description, None).unwrap()
    }

    #[test]
    fn test_layout_positions_and_tex_coords() {
        let quads = layout_text("ab", &font(&['a', 'b']), &TextParams::default()).unwrap();
        assert_eq!(quads.len(), 2);

        assert_relative_eq!(quads[0].min, Vec2::new(0.0, 0.0));
        assert_relative_eq!(quads[0].max, Vec2::new(0.5, 1.0));
        assert_relative_eq!(quads[1].min, Vec2::new(0.5, 0.0));
        assert_relative_eq!(quads[0].tex_max, Vec2::new(0.5, 0.5));

        let positions = quads[0].positions();
        assert_relative_eq!(positions[1], Vec2::new(0.0, 1.0));
        assert_relative_eq!(positions[3], Vec2::new(0.5, 0.0));
    }

    #[test]
    fn test_whitespace_emits_no_geometry() {
        let quads = layout_text("a b\tc", &font(&['a', 'b', 'c']), &TextParams::default()).unwrap();
        assert_eq!(quads.len(), 3);
        // a(0.5) + space(0.25)
        assert_relative_eq!(quads[1].min.x, 0.75);
        // b(0.5) + 4 * space(0.25)
        assert_relative_eq!(quads[2].min.x, 2.25);
    }

    #[test]
    fn test_newline_and_carriage_return() {
        let params = TextParams {
            line_spacing: 0.5,
            ..Default::default()
        };
        let quads = layout_text("a\r\nb", &font(&['a', 'b']), &params).unwrap();
        assert_eq!(quads.len(), 2);
        assert_relative_eq!(quads[1].min.x, 0.0);
        assert_relative_eq!(quads[1].min.y, -2.0);
    }

    #[test]
    fn test_missing_glyph_falls_back_to_question_mark() {
        let quads = layout_text("Hi", &font(&['i', '?']), &TextParams::default()).unwrap();
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[0].glyph, '?');
        assert_eq!(quads[1].glyph, 'i');
    }

    #[test]
    fn test_missing_glyph_without_fallback_aborts_string() {
        let result = layout_text("iHi", &font(&['i']), &TextParams::default());
        assert_eq!(result, Err(FontError::GlyphNotFound('H')));
    }

    #[test]
    fn test_font_without_space_is_rejected() {
        let description = MsdfFontDescription {
            atlas_width: 16,
            atlas_height: 16,
            glyphs: vec![glyph('a', 0.5)],
            ..Default::default()
        };
        let font = MsdfFont::from_description(&description, None).unwrap();
        assert_eq!(
            layout_text("a", &font, &TextParams::default()),
            Err(FontError::GlyphNotFound(' '))
        );
    }
}
