//! Framebuffer and texture descriptions

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Storage format of a framebuffer attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FramebufferTextureFormat {
    /// 8-bit RGBA colour
    Rgba8,
    /// Single 32-bit signed integer channel (entity IDs)
    RedInteger,
    /// Half-float RGB
    Rgb16F,
    /// Half-float RGBA
    Rgba16F,
    /// Half-float RG
    Rg16F,
    /// Packed depth/stencil
    Depth24Stencil8,
    /// 32-bit float depth
    DepthComponent32F,
}

impl FramebufferTextureFormat {
    /// Whether this is a depth attachment
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth24Stencil8 | Self::DepthComponent32F)
    }

    /// Whether this attachment stores integers
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::RedInteger)
    }
}

/// Description used to create or resize a framebuffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramebufferSpecification {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Attachments in binding order
    pub attachments: Vec<FramebufferTextureFormat>,
    /// MSAA sample count
    pub samples: u32,
    /// Whether this framebuffer is the presentation target
    pub swap_chain_target: bool,
}

impl FramebufferSpecification {
    /// Single-sampled offscreen framebuffer
    pub fn new(width: u32, height: u32, attachments: Vec<FramebufferTextureFormat>) -> Self {
        Self {
            width,
            height,
            attachments,
            samples: 1,
            swap_chain_target: false,
        }
    }

    /// Indices of the colour attachments, depth excluded
    pub fn color_attachment_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.attachments
            .iter()
            .enumerate()
            .filter(|(_, format)| !format.is_depth())
            .map(|(index, _)| index)
    }

    /// Index of the first integer attachment
    pub fn first_integer_attachment(&self) -> Option<usize> {
        self.attachments.iter().position(|format| format.is_integer())
    }

    /// Index of the depth attachment
    pub fn depth_attachment(&self) -> Option<usize> {
        self.attachments.iter().position(|format| format.is_depth())
    }
}

/// Pixel format of a sampled texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA
    #[default]
    Rgba8,
    /// 8-bit RGB
    Rgb8,
    /// Half-float RGBA (environment maps)
    Rgba16F,
}

impl TextureFormat {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Rgba16F => 8,
        }
    }
}

/// Description used to create a texture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSpecification {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Generate a mip chain after upload
    pub generate_mips: bool,
}

impl TextureSpecification {
    /// RGBA8 texture without mips
    pub const fn rgba8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
            generate_mips: false,
        }
    }

    /// Expected size of the initial pixel data
    pub const fn data_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

bitflags! {
    /// Buffers copied by a framebuffer blit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BlitMask: u32 {
        /// Colour attachments
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
        /// Stencil attachment
        const STENCIL = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_queries() {
        let spec = FramebufferSpecification::new(
            64,
            32,
            vec![
                FramebufferTextureFormat::Rgba8,
                FramebufferTextureFormat::RedInteger,
                FramebufferTextureFormat::Depth24Stencil8,
            ],
        );
        assert_eq!(spec.first_integer_attachment(), Some(1));
        assert_eq!(spec.depth_attachment(), Some(2));
        assert_eq!(spec.color_attachment_indices().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_texture_data_size() {
        assert_eq!(TextureSpecification::rgba8(2, 3).data_size(), 24);
    }
}
