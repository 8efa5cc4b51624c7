//! # Primitive batches
//!
//! Each primitive kind (quads, circles, lines, MSDF text) owns a
//! [`BatchBuffer`] of its vertex record, a dynamic GPU vertex buffer and a
//! pipeline. Submitting a shape writes vertices into the staging buffer;
//! uploading records a single [`RenderCmd::UploadVertexData`] of exactly the
//! used range.
//!
//! ## Capacity
//!
//! Buffers are sized in whole shapes (`max_shapes * vertices_per_shape`), so a
//! shape is either written completely or rejected. A rejected submit is the
//! caller's signal to flush.
//!
//! [`RenderCmd::UploadVertexData`]: crate::render::commands::RenderCmd::UploadVertexData

pub mod buffer;
pub mod circle;
pub mod line;
pub mod quad;
pub mod text;

pub use buffer::BatchBuffer;
pub use circle::CircleBatch;
pub use line::LineBatch;
pub use quad::QuadBatch;
pub use text::TextBatch;

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Vec2, Vec4};
use crate::render::api::{BufferLayout, ShaderDataType};

/// Default number of quads per batch
pub const MAX_QUADS: usize = 10_000;

/// Default number of texture slots, white fallback included
pub const MAX_TEXTURE_SLOTS: usize = 32;

/// Vertices per quad-shaped primitive
pub const QUAD_VERTEX_COUNT: usize = 4;

/// Indices per quad-shaped primitive
pub const QUAD_INDEX_COUNT: usize = 6;

/// Unit quad centred on the origin, counter-clockwise from bottom-left
pub const QUAD_VERTEX_POSITIONS: [[f32; 4]; 4] = [
    [-0.5, -0.5, 0.0, 1.0],
    [0.5, -0.5, 0.0, 1.0],
    [0.5, 0.5, 0.0, 1.0],
    [-0.5, 0.5, 0.0, 1.0],
];

/// Texture coordinates matching [`QUAD_VERTEX_POSITIONS`]
pub fn default_tex_coords() -> [Vec2; 4] {
    [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ]
}

/// Corner `i` of the unit quad as a homogeneous point
pub fn quad_corner(i: usize) -> Vec4 {
    Vec4::from(QUAD_VERTEX_POSITIONS[i % QUAD_VERTEX_COUNT])
}

/// Index list for `max_quads` quads: `{0, 1, 2, 2, 3, 0}` offset by 4 per quad
pub fn generate_quad_indices(max_quads: usize) -> Vec<u32> {
    (0..max_quads)
        .flat_map(|quad| {
            #[allow(clippy::cast_possible_truncation)]
            let offset = (quad * QUAD_VERTEX_COUNT) as u32;
            [0, 1, 2, 2, 3, 0].map(|index| index + offset)
        })
        .collect()
}

/// Vertex of a batched quad
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// World position
    pub position: [f32; 3],
    /// Tint
    pub color: [f32; 4],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
    /// Texture slot
    pub tex_index: f32,
    /// Texture coordinate multiplier
    pub tiling_factor: f32,
    /// Entity ID written to the pick attachment
    pub object_id: i32,
}

impl QuadVertex {
    /// Vertex layout
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Float2, "a_TexCoord"),
            (ShaderDataType::Float, "a_TexIndex"),
            (ShaderDataType::Float, "a_TilingFactor"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
    }
}

/// Per-instance data of an instanced quad
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct QuadInstanceData {
    /// Model matrix, column-major
    pub transform: [[f32; 4]; 4],
    /// Tint
    pub color: [f32; 4],
    /// Texture slot
    pub tex_index: f32,
    /// Texture coordinate multiplier
    pub tiling_factor: f32,
    /// Entity ID written to the pick attachment
    pub object_id: i32,
}

impl QuadInstanceData {
    /// Instance layout
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Mat4, "a_Transform"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Float, "a_TexIndex"),
            (ShaderDataType::Float, "a_TilingFactor"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
        .per_instance()
    }
}

/// Vertex of a batched circle
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CircleVertex {
    /// World position
    pub world_position: [f32; 3],
    /// Position in [-1, 1] quad space
    pub local_position: [f32; 3],
    /// Colour
    pub color: [f32; 4],
    /// Ring thickness, 1 fills the disc
    pub thickness: f32,
    /// Edge softness
    pub fade: f32,
    /// Entity ID written to the pick attachment
    pub object_id: i32,
}

impl CircleVertex {
    /// Vertex layout
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_WorldPosition"),
            (ShaderDataType::Float3, "a_LocalPosition"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Float, "a_Thickness"),
            (ShaderDataType::Float, "a_Fade"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
    }
}

/// Vertex of a batched line
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    /// World position
    pub position: [f32; 3],
    /// Colour
    pub color: [f32; 4],
    /// Entity ID written to the pick attachment
    pub object_id: i32,
}

impl LineVertex {
    /// Vertex layout
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
    }
}

/// Vertex of a batched MSDF glyph
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TextVertex {
    /// World position
    pub position: [f32; 3],
    /// Colour
    pub color: [f32; 4],
    /// Atlas coordinate
    pub tex_coord: [f32; 2],
    /// Entity ID written to the pick attachment
    pub object_id: i32,
}

impl TextVertex {
    /// Vertex layout
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Float2, "a_TexCoord"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_indices() {
        let indices = generate_quad_indices(2);
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
    }

    #[test]
    fn test_layouts_match_vertex_sizes() {
        assert_eq!(QuadVertex::layout().stride(), std::mem::size_of::<QuadVertex>());
        assert_eq!(
            QuadInstanceData::layout().stride(),
            std::mem::size_of::<QuadInstanceData>()
        );
        assert_eq!(CircleVertex::layout().stride(), std::mem::size_of::<CircleVertex>());
        assert_eq!(LineVertex::layout().stride(), std::mem::size_of::<LineVertex>());
        assert_eq!(TextVertex::layout().stride(), std::mem::size_of::<TextVertex>());
    }
}
