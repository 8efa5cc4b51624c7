//! Text rendering system
//!
//! MSDF font metrics and the glyph layout that turns a string into
//! positioned, textured quads for the text batch.

pub mod font;
pub mod layout;

pub use font::*;
pub use layout::*;

/// Result type for font operations
pub type FontResult<T> = Result<T, FontError>;

/// Errors that can occur during font operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FontError {
    /// Failed to load or validate a font description
    #[error("Failed to load font: {0}")]
    Load(String),

    /// Character missing from the font, with no usable fallback
    #[error("Character '{0}' not found in font")]
    GlyphNotFound(char),

    /// The font has no atlas to sample from
    #[error("Font has no atlas texture")]
    MissingAtlas,
}
