//! 2D textures, sprite-sheet regions and the batcher's texture slot table

use std::sync::Arc;

use crate::foundation::math::Vec2;
use crate::render::api::{BackendResult, RendererBackend, TextureHandle, TextureSpecification};

/// A GPU texture with its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2D {
    handle: TextureHandle,
    width: u32,
    height: u32,
}

impl Texture2D {
    /// Wrap a texture created elsewhere
    pub const fn new(handle: TextureHandle, width: u32, height: u32) -> Self {
        Self {
            handle,
            width,
            height,
        }
    }

    /// Create a texture through the backend
    pub fn create(
        backend: &mut dyn RendererBackend,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
    ) -> BackendResult<Arc<Self>> {
        let handle = backend.create_texture(spec, data)?;
        Ok(Arc::new(Self::new(handle, spec.width, spec.height)))
    }

    /// 1x1 opaque white texture bound to slot 0 by the batcher
    pub fn white(backend: &mut dyn RendererBackend) -> BackendResult<Arc<Self>> {
        Self::create(
            backend,
            &TextureSpecification::rgba8(1, 1),
            Some(&[0xff, 0xff, 0xff, 0xff]),
        )
    }

    /// Backend handle
    pub const fn handle(&self) -> TextureHandle {
        self.handle
    }

    /// Width in pixels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub const fn height(&self) -> u32 {
        self.height
    }
}

/// Region of a sprite sheet with its own texture coordinates
#[derive(Debug, Clone)]
pub struct SubTexture2D {
    texture: Arc<Texture2D>,
    tex_coords: [Vec2; 4],
}

impl SubTexture2D {
    /// Region bounded by `min` and `max` in normalised coordinates
    pub fn new(texture: Arc<Texture2D>, min: Vec2, max: Vec2) -> Self {
        Self {
            texture,
            tex_coords: [
                Vec2::new(min.x, min.y),
                Vec2::new(max.x, min.y),
                Vec2::new(max.x, max.y),
                Vec2::new(min.x, max.y),
            ],
        }
    }

    /// Sprite at cell `coords` of a grid of `cell_size` pixels, spanning `sprite_size` cells
    pub fn from_coords(
        texture: Arc<Texture2D>,
        coords: Vec2,
        cell_size: Vec2,
        sprite_size: Vec2,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let size = Vec2::new(texture.width() as f32, texture.height() as f32);
        let min = coords.component_mul(&cell_size).component_div(&size);
        let max = (coords + sprite_size).component_mul(&cell_size).component_div(&size);
        Self::new(texture, min, max)
    }

    /// Underlying texture
    pub const fn texture(&self) -> &Arc<Texture2D> {
        &self.texture
    }

    /// Corner coordinates: bottom-left, bottom-right, top-right, top-left
    pub const fn tex_coords(&self) -> &[Vec2; 4] {
        &self.tex_coords
    }
}

/// Fixed-size table of textures bound for the current batch epoch
///
/// Slot 0 always holds the white fallback texture. Textures are matched by
/// handle, so binding the same texture twice reuses its slot.
#[derive(Debug, Clone)]
pub struct TextureSlots {
    slots: Vec<Arc<Texture2D>>,
    max_slots: usize,
}

impl TextureSlots {
    /// Table with `white` in slot 0 and room for `max_slots` entries in total
    pub fn new(white: Arc<Texture2D>, max_slots: usize) -> Self {
        let mut slots = Vec::with_capacity(max_slots);
        slots.push(white);
        Self {
            slots,
            max_slots: max_slots.max(1),
        }
    }

    /// Drop every texture except the white fallback
    pub fn reset(&mut self) {
        self.slots.truncate(1);
    }

    /// Slot index of `texture`, assigning the next free slot when it is new
    ///
    /// Returns `None` when the texture is new and every slot is taken.
    pub fn find_or_assign(&mut self, texture: &Arc<Texture2D>) -> Option<f32> {
        let index = match self
            .slots
            .iter()
            .position(|slot| slot.handle() == texture.handle())
        {
            Some(index) => index,
            None if self.slots.len() < self.max_slots => {
                self.slots.push(Arc::clone(texture));
                self.slots.len() - 1
            }
            None => return None,
        };

        #[allow(clippy::cast_precision_loss)]
        Some(index as f32)
    }

    /// Number of occupied slots, white included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: slot 0 is never empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether no further texture can be assigned
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_slots
    }

    /// Capacity of the table
    pub const fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Handles in slot order
    pub fn handles(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.slots.iter().map(|texture| texture.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn texture(id: u64) -> Arc<Texture2D> {
        Arc::new(Texture2D::new(TextureHandle(id), 64, 64))
    }

    #[test]
    fn test_same_texture_reuses_slot() {
        let mut slots = TextureSlots::new(texture(0), 32);
        let a = texture(1);
        assert_eq!(slots.find_or_assign(&a), Some(1.0));
        assert_eq!(slots.find_or_assign(&a), Some(1.0));
        assert_eq!(slots.find_or_assign(&texture(1)), Some(1.0));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_white_texture_is_slot_zero() {
        let white = texture(0);
        let mut slots = TextureSlots::new(Arc::clone(&white), 4);
        assert_eq!(slots.find_or_assign(&white), Some(0.0));
    }

    #[test]
    fn test_full_table_rejects_new_texture() {
        let mut slots = TextureSlots::new(texture(0), 3);
        assert!(slots.find_or_assign(&texture(1)).is_some());
        assert!(slots.find_or_assign(&texture(2)).is_some());
        assert!(slots.is_full());
        assert_eq!(slots.find_or_assign(&texture(3)), None);
        assert_eq!(slots.find_or_assign(&texture(2)), Some(2.0));

        slots.reset();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.find_or_assign(&texture(3)), Some(1.0));
    }

    #[test]
    fn test_sub_texture_from_coords() {
        let sheet = Arc::new(Texture2D::new(TextureHandle(5), 256, 128));
        let sprite = SubTexture2D::from_coords(
            sheet,
            Vec2::new(1.0, 0.0),
            Vec2::new(64.0, 64.0),
            Vec2::new(1.0, 2.0),
        );
        let coords = sprite.tex_coords();
        assert_relative_eq!(coords[0], Vec2::new(0.25, 0.0));
        assert_relative_eq!(coords[2], Vec2::new(0.5, 1.0));
    }
}
