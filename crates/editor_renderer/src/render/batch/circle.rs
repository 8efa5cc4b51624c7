//! Circle batch: quads shaded as discs or rings

use super::{quad_corner, BatchBuffer, CircleVertex, QUAD_INDEX_COUNT, QUAD_VERTEX_COUNT};
use crate::foundation::math::{Mat4, Vec4};
use crate::render::api::{
    BackendResult, BlendMode, IndexBufferHandle, PipelineHandle, PipelineSpecification,
    RendererBackend, VertexArrayHandle, VertexBufferHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd};

/// Staging and GPU resources for circles
#[derive(Debug)]
pub struct CircleBatch {
    vertices: BatchBuffer<CircleVertex>,
    index_count: u32,
    vertex_buffer: VertexBufferHandle,
    vertex_array: VertexArrayHandle,
    pipeline: PipelineHandle,
}

impl CircleBatch {
    /// Allocate room for `max_circles` circles drawn with the shared quad indices
    pub fn init(
        backend: &mut dyn RendererBackend,
        max_circles: usize,
        index_buffer: IndexBufferHandle,
    ) -> BackendResult<Self> {
        let vertices = BatchBuffer::new(max_circles * QUAD_VERTEX_COUNT);
        let vertex_buffer = backend.create_vertex_buffer(
            vertices.capacity() * std::mem::size_of::<CircleVertex>(),
            CircleVertex::layout(),
        )?;
        let vertex_array = backend.create_vertex_array(&[vertex_buffer], Some(index_buffer))?;
        let pipeline = backend.create_pipeline(
            &PipelineSpecification::new("Renderer2D_Circle")
                .with_blend(BlendMode::Alpha)
                .with_object_id(),
        )?;

        Ok(Self {
            vertices,
            index_count: 0,
            vertex_buffer,
            vertex_array,
            pipeline,
        })
    }

    /// Start a new epoch
    pub fn reset(&mut self) {
        self.vertices.reset();
        self.index_count = 0;
    }

    /// Write one circle; false when full
    pub fn submit(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        thickness: f32,
        fade: f32,
        object_id: i32,
    ) -> bool {
        if !self.vertices.has_space(QUAD_VERTEX_COUNT) {
            return false;
        }

        for i in 0..QUAD_VERTEX_COUNT {
            let corner = quad_corner(i);
            let world = transform * corner;
            self.vertices.write(CircleVertex {
                world_position: world.xyz().into(),
                local_position: (corner.xyz() * 2.0).into(),
                color: (*color).into(),
                thickness,
                fade,
                object_id,
            });
        }
        self.index_count += QUAD_INDEX_COUNT as u32;
        true
    }

    /// Whether any circle was written
    pub const fn has_data(&self) -> bool {
        !self.vertices.is_empty()
    }

    /// Whether another circle would be rejected
    pub fn is_full(&self) -> bool {
        !self.vertices.has_space(QUAD_VERTEX_COUNT)
    }

    /// Circles written this epoch
    pub const fn circle_count(&self) -> usize {
        self.vertices.count() / QUAD_VERTEX_COUNT
    }

    /// Staged vertices
    pub fn vertices(&self) -> &[CircleVertex] {
        self.vertices.as_slice()
    }

    /// Record the upload of the written vertex range
    pub fn upload(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::UploadVertexData {
            buffer: self.vertex_buffer,
            data: self.vertices.as_bytes().to_vec(),
        });
    }

    /// Record pipeline bind and draw
    pub fn record_draw(&self, cmd: &mut CommandBuffer) {
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
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessBackend;
    use crate::render::batch::generate_quad_indices;
    use approx::assert_relative_eq;

    #[test]
    fn test_local_position_spans_unit_square() {
        let mut backend = HeadlessBackend::new();
        let indices = backend.create_index_buffer(&generate_quad_indices(2)).unwrap();
        let mut circles = CircleBatch::init(&mut backend, 2, indices).unwrap();

        let transform = Mat4::new_scaling(4.0);
        assert!(circles.submit(&transform, &Vec4::new(1.0, 0.0, 0.0, 1.0), 1.0, 0.005, 3));

        let vertices = circles.vertices();
        assert_relative_eq!(Vec3::from(vertices[0].local_position), Vec3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(Vec3::from(vertices[2].local_position), Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(Vec3::from(vertices[2].world_position), Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(circles.circle_count(), 1);
    }

    #[test]
    fn test_full_batch_rejects() {
        let mut backend = HeadlessBackend::new();
        let indices = backend.create_index_buffer(&generate_quad_indices(1)).unwrap();
        let mut circles = CircleBatch::init(&mut backend, 1, indices).unwrap();
        assert!(circles.submit(&Mat4::identity(), &Vec4::zeros(), 1.0, 0.0, 0));
        assert!(circles.is_full());
        assert!(!circles.submit(&Mat4::identity(), &Vec4::zeros(), 1.0, 0.0, 0));
    }
}
