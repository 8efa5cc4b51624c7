//! Quad batch: per-vertex quads plus an instanced path

use super::{
    quad_corner, BatchBuffer, QuadInstanceData, QuadVertex, QUAD_INDEX_COUNT, QUAD_VERTEX_COUNT,
};
use crate::foundation::math::{Mat4, Vec2, Vec4};
use crate::render::api::{
    BackendResult, BlendMode, BufferLayout, IndexBufferHandle, PipelineHandle,
    PipelineSpecification, RendererBackend, ShaderDataType, VertexArrayHandle, VertexBufferHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd};

/// Unit quad used by the instanced path: position then texture coordinate
#[rustfmt::skip]
const UNIT_QUAD: [f32; 20] = [
    -0.5, -0.5, 0.0,  0.0, 0.0,
     0.5, -0.5, 0.0,  1.0, 0.0,
     0.5,  0.5, 0.0,  1.0, 1.0,
    -0.5,  0.5, 0.0,  0.0, 1.0,
];

/// Staging and GPU resources for quads
#[derive(Debug)]
pub struct QuadBatch {
    vertices: BatchBuffer<QuadVertex>,
    index_count: u32,
    vertex_buffer: VertexBufferHandle,
    vertex_array: VertexArrayHandle,
    pipeline: PipelineHandle,

    instances: BatchBuffer<QuadInstanceData>,
    unit_quad_buffer: VertexBufferHandle,
    instance_buffer: VertexBufferHandle,
    instance_array: VertexArrayHandle,
    instance_pipeline: PipelineHandle,
}

impl QuadBatch {
    /// Allocate room for `max_quads` quads (and as many instances)
    ///
    /// `index_buffer` is the shared quad index buffer and must cover at least
    /// `max_quads` quads.
    pub fn init(
        backend: &mut dyn RendererBackend,
        max_quads: usize,
        index_buffer: IndexBufferHandle,
    ) -> BackendResult<Self> {
        let vertices = BatchBuffer::new(max_quads * QUAD_VERTEX_COUNT);
        let vertex_buffer = backend.create_vertex_buffer(
            vertices.capacity() * std::mem::size_of::<QuadVertex>(),
            QuadVertex::layout(),
        )?;
        let vertex_array = backend.create_vertex_array(&[vertex_buffer], Some(index_buffer))?;
        let pipeline = backend.create_pipeline(
            &PipelineSpecification::new("Renderer2D_Quad")
                .with_blend(BlendMode::Alpha)
                .with_object_id(),
        )?;

        let instances = BatchBuffer::new(max_quads);
        let unit_quad_buffer = backend.create_vertex_buffer_with_data(
            bytemuck::cast_slice(&UNIT_QUAD),
            BufferLayout::new(&[
                (ShaderDataType::Float3, "a_Position"),
                (ShaderDataType::Float2, "a_TexCoord"),
            ]),
        )?;
        let instance_buffer = backend.create_vertex_buffer(
            instances.capacity() * std::mem::size_of::<QuadInstanceData>(),
            QuadInstanceData::layout(),
        )?;
        let instance_array = backend
            .create_vertex_array(&[unit_quad_buffer, instance_buffer], Some(index_buffer))?;
        let instance_pipeline = backend.create_pipeline(
            &PipelineSpecification::new("Renderer2D_QuadInstanced")
                .with_blend(BlendMode::Alpha)
                .with_object_id(),
        )?;

        Ok(Self {
            vertices,
            index_count: 0,
            vertex_buffer,
            vertex_array,
            pipeline,
            instances,
            unit_quad_buffer,
            instance_buffer,
            instance_array,
            instance_pipeline,
        })
    }

    /// Start a new epoch
    pub fn reset(&mut self) {
        self.vertices.reset();
        self.instances.reset();
        self.index_count = 0;
    }

    /// Write the four corners of `transform * unit quad`; false when full
    pub fn submit(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        tex_coords: &[Vec2; 4],
        tex_index: f32,
        tiling_factor: f32,
        object_id: i32,
    ) -> bool {
        if !self.vertices.has_space(QUAD_VERTEX_COUNT) {
            return false;
        }

        for (i, tex_coord) in tex_coords.iter().enumerate() {
            let position = transform * quad_corner(i);
            self.vertices.write(QuadVertex {
                position: position.xyz().into(),
                color: (*color).into(),
                tex_coord: (*tex_coord).into(),
                tex_index,
                tiling_factor,
                object_id,
            });
        }
        self.index_count += QUAD_INDEX_COUNT as u32;
        true
    }

    /// Write one instance record; false when the instance buffer is full
    pub fn submit_instanced(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        tex_index: f32,
        tiling_factor: f32,
        object_id: i32,
    ) -> bool {
        self.instances.write(QuadInstanceData {
            transform: (*transform).into(),
            color: (*color).into(),
            tex_index,
            tiling_factor,
            object_id,
        })
    }

    /// Whether any quad was written
    pub const fn has_data(&self) -> bool {
        !self.vertices.is_empty()
    }

    /// Whether any instance was written
    pub const fn has_instances(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Whether another quad would be rejected
    pub fn is_full(&self) -> bool {
        !self.vertices.has_space(QUAD_VERTEX_COUNT)
    }

    /// Whether another instance would be rejected
    pub fn is_instance_full(&self) -> bool {
        self.instances.is_full()
    }

    /// Quads written this epoch
    pub const fn quad_count(&self) -> usize {
        self.vertices.count() / QUAD_VERTEX_COUNT
    }

    /// Instances written this epoch
    pub const fn instance_count(&self) -> usize {
        self.instances.count()
    }

    /// Indices needed to draw the written quads
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Staged vertices
    pub fn vertices(&self) -> &[QuadVertex] {
        self.vertices.as_slice()
    }

    /// Record the upload of the written vertex range
    pub fn upload(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::UploadVertexData {
            buffer: self.vertex_buffer,
            data: self.vertices.as_bytes().to_vec(),
        });
    }

    /// Record the upload of the written instance range
    pub fn upload_instances(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::UploadVertexData {
            buffer: self.instance_buffer,
            data: self.instances.as_bytes().to_vec(),
        });
    }

    /// Record pipeline bind and draw of the written quads
    pub fn record_draw(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::BindPipeline(self.pipeline));
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: self.vertex_array,
            index_count: self.index_count,
            first_index: 0,
        });
    }

    /// Record pipeline bind and instanced draw of the written instances
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_instanced_draw(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::BindPipeline(self.instance_pipeline));
        cmd.record(RenderCmd::DrawIndexedInstanced {
            vertex_array: self.instance_array,
            index_count: QUAD_INDEX_COUNT as u32,
            instance_count: self.instances.count() as u32,
        });
    }

    /// Release GPU resources (the shared index buffer is left alone)
    pub fn shutdown(&self, backend: &mut dyn RendererBackend) {
        backend.destroy_vertex_array(self.vertex_array);
        backend.destroy_vertex_array(self.instance_array);
        backend.destroy_vertex_buffer(self.vertex_buffer);
        backend.destroy_vertex_buffer(self.unit_quad_buffer);
        backend.destroy_vertex_buffer(self.instance_buffer);
        backend.destroy_pipeline(self.pipeline);
        backend.destroy_pipeline(self.instance_pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessBackend;
    use crate::render::batch::{default_tex_coords, generate_quad_indices};
    use approx::assert_relative_eq;

    fn batch(backend: &mut HeadlessBackend, max_quads: usize) -> QuadBatch {
        let indices = backend.create_index_buffer(&generate_quad_indices(max_quads)).unwrap();
        QuadBatch::init(backend, max_quads, indices).unwrap()
    }

    #[test]
    fn test_exactly_capacity_quads_fit() {
        let mut backend = HeadlessBackend::new();
        let mut quads = batch(&mut backend, 16);
        let white = Vec4::new(1.0, 1.0, 1.0, 1.0);

        for _ in 0..16 {
            assert!(quads.submit(&Mat4::identity(), &white, &default_tex_coords(), 0.0, 1.0, -1));
        }
        assert!(quads.is_full());
        assert_eq!(quads.quad_count(), 16);
        assert_eq!(quads.index_count(), 96);
        assert!(!quads.submit(&Mat4::identity(), &white, &default_tex_coords(), 0.0, 1.0, -1));
    }

    #[test]
    fn test_submit_transforms_corners() {
        let mut backend = HeadlessBackend::new();
        let mut quads = batch(&mut backend, 4);
        let transform = Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 2.0, 1.0));

        quads.submit(&transform, &Vec4::zeros(), &default_tex_coords(), 0.0, 1.0, 7);
        let first = quads.vertices()[0];
        let third = quads.vertices()[2];
        assert_relative_eq!(Vec3::from(first.position), Vec3::new(1.0, -1.0, 0.0));
        assert_relative_eq!(Vec3::from(third.position), Vec3::new(3.0, 1.0, 0.0));
        assert_eq!(first.object_id, 7);
    }

    #[test]
    fn test_upload_records_used_range_only() {
        let mut backend = HeadlessBackend::new();
        let mut quads = batch(&mut backend, 8);
        quads.submit(&Mat4::identity(), &Vec4::zeros(), &default_tex_coords(), 0.0, 1.0, 1);

        let mut cmd = CommandBuffer::new();
        quads.upload(&mut cmd);
        assert_eq!(cmd.len(), 1);
        match &cmd.commands()[0] {
            RenderCmd::UploadVertexData { data, .. } => {
                assert_eq!(data.len(), 4 * std::mem::size_of::<QuadVertex>());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_instances_fill_separately() {
        let mut backend = HeadlessBackend::new();
        let mut quads = batch(&mut backend, 2);
        assert!(quads.submit_instanced(&Mat4::identity(), &Vec4::zeros(), 0.0, 1.0, 1));
        assert!(quads.submit_instanced(&Mat4::identity(), &Vec4::zeros(), 0.0, 1.0, 2));
        assert!(quads.is_instance_full());
        assert!(!quads.has_data());

        quads.reset();
        assert!(!quads.has_instances());
    }
}
