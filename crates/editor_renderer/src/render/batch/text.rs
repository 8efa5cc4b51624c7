//! Text batch: MSDF glyph quads sampling one atlas per epoch

use std::sync::Arc;

use super::{BatchBuffer, TextVertex, QUAD_INDEX_COUNT, QUAD_VERTEX_COUNT};
use crate::foundation::math::{Mat4, Vec4};
use crate::render::api::{
    BackendResult, BlendMode, IndexBufferHandle, PipelineHandle, PipelineSpecification,
    RendererBackend, VertexArrayHandle, VertexBufferHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd};
use crate::render::text::GlyphQuad;
use crate::render::texture::Texture2D;

/// Staging and GPU resources for glyphs
#[derive(Debug)]
pub struct TextBatch {
    vertices: BatchBuffer<TextVertex>,
    index_count: u32,
    atlas: Option<Arc<Texture2D>>,
    vertex_buffer: VertexBufferHandle,
    vertex_array: VertexArrayHandle,
    pipeline: PipelineHandle,
}

impl TextBatch {
    /// Allocate room for `max_glyphs` glyph quads drawn with the shared quad indices
    pub fn init(
        backend: &mut dyn RendererBackend,
        max_glyphs: usize,
        index_buffer: IndexBufferHandle,
    ) -> BackendResult<Self> {
        let vertices = BatchBuffer::new(max_glyphs * QUAD_VERTEX_COUNT);
        let vertex_buffer = backend.create_vertex_buffer(
            vertices.capacity() * std::mem::size_of::<TextVertex>(),
            TextVertex::layout(),
        )?;
        let vertex_array = backend.create_vertex_array(&[vertex_buffer], Some(index_buffer))?;
        let pipeline = backend.create_pipeline(
            &PipelineSpecification::new("Renderer2D_Text")
                .with_blend(BlendMode::Alpha)
                .with_object_id(),
        )?;

        Ok(Self {
            vertices,
            index_count: 0,
            atlas: None,
            vertex_buffer,
            vertex_array,
            pipeline,
        })
    }

    /// Start a new epoch; forgets the atlas
    pub fn reset(&mut self) {
        self.vertices.reset();
        self.index_count = 0;
        self.atlas = None;
    }

    /// Atlas sampled by the glyphs of this epoch
    pub const fn atlas(&self) -> Option<&Arc<Texture2D>> {
        self.atlas.as_ref()
    }

    /// Whether glyphs sampling `atlas` can join this epoch
    pub fn accepts_atlas(&self, atlas: &Texture2D) -> bool {
        self.atlas
            .as_ref()
            .map_or(true, |current| current.handle() == atlas.handle())
    }

    /// Set the atlas of this epoch
    pub fn set_atlas(&mut self, atlas: &Arc<Texture2D>) {
        self.atlas = Some(Arc::clone(atlas));
    }

    /// Write one glyph quad (bottom-left, top-left, top-right, bottom-right); false when full
    pub fn submit_glyph(
        &mut self,
        quad: &GlyphQuad,
        transform: &Mat4,
        color: &Vec4,
        object_id: i32,
    ) -> bool {
        if !self.vertices.has_space(QUAD_VERTEX_COUNT) {
            return false;
        }

        for (position, tex_coord) in quad.positions().iter().zip(quad.tex_coords()) {
            let world = transform * Vec4::new(position.x, position.y, 0.0, 1.0);
            self.vertices.write(TextVertex {
                position: world.xyz().into(),
                color: (*color).into(),
                tex_coord: tex_coord.into(),
                object_id,
            });
        }
        self.index_count += QUAD_INDEX_COUNT as u32;
        true
    }

    /// Whether any glyph was written
    pub const fn has_data(&self) -> bool {
        !self.vertices.is_empty()
    }

    /// Whether another glyph would be rejected
    pub fn is_full(&self) -> bool {
        !self.vertices.has_space(QUAD_VERTEX_COUNT)
    }

    /// Glyph quads that still fit in this epoch
    pub fn remaining_glyphs(&self) -> usize {
        (self.vertices.capacity() - self.vertices.count()) / QUAD_VERTEX_COUNT
    }

    /// Glyphs written this epoch
    pub const fn glyph_count(&self) -> usize {
        self.vertices.count() / QUAD_VERTEX_COUNT
    }

    /// Staged vertices
    pub fn vertices(&self) -> &[TextVertex] {
        self.vertices.as_slice()
    }

    /// Record the upload of the written vertex range
    pub fn upload(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::UploadVertexData {
            buffer: self.vertex_buffer,
            data: self.vertices.as_bytes().to_vec(),
        });
    }

    /// Record atlas bind, pipeline bind and draw
    pub fn record_draw(&self, cmd: &mut CommandBuffer) {
        if let Some(atlas) = &self.atlas {
            cmd.record(RenderCmd::BindTexture {
                slot: 0,
                texture: atlas.handle(),
            });
        }
        cmd.record(RenderCmd::BindPipeline(self.pipeline));
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: self.vertex_array,
            index_count: self.index_count,
            first_index: 0,
        });
    }

    /// Release GPU resources
    pub fn shutdown(&self, backend: &mut dyn RendererBackend) {
        backend.destroy_vertex_array(self.vertex_array);
        backend.destroy_vertex_buffer(self.vertex_buffer);
        backend.destroy_pipeline(self.pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3};
    use crate::render::api::TextureHandle;
    use crate::render::backends::HeadlessBackend;
    use crate::render::batch::generate_quad_indices;
    use approx::assert_relative_eq;

    fn glyph() -> GlyphQuad {
        GlyphQuad {
            glyph: 'A',
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(1.0, 2.0),
            tex_min: Vec2::new(0.0, 0.0),
            tex_max: Vec2::new(0.5, 0.5),
        }
    }

    #[test]
    fn test_glyph_vertex_order() {
        let mut backend = HeadlessBackend::new();
        let indices = backend.create_index_buffer(&generate_quad_indices(4)).unwrap();
        let mut text = TextBatch::init(&mut backend, 4, indices).unwrap();

        assert!(text.submit_glyph(&glyph(), &Mat4::identity(), &Vec4::zeros(), 2));
        let vertices = text.vertices();
        assert_relative_eq!(Vec3::from(vertices[1].position), Vec3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(Vec3::from(vertices[3].position), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(Vec2::from(vertices[2].tex_coord), Vec2::new(0.5, 0.5));
        assert_eq!(text.remaining_glyphs(), 3);
    }

    #[test]
    fn test_atlas_epoch() {
        let mut backend = HeadlessBackend::new();
        let indices = backend.create_index_buffer(&generate_quad_indices(1)).unwrap();
        let mut text = TextBatch::init(&mut backend, 1, indices).unwrap();
        let a = Arc::new(Texture2D::new(TextureHandle(10), 8, 8));
        let b = Texture2D::new(TextureHandle(11), 8, 8);

        assert!(text.accepts_atlas(&b));
        text.set_atlas(&a);
        assert!(!text.accepts_atlas(&b));
        assert!(text.accepts_atlas(&a));

        text.reset();
        assert!(text.atlas().is_none());
    }
}
