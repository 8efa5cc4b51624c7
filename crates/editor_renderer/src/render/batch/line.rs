//! Line batch: non-indexed line list

use super::{BatchBuffer, LineVertex};
use crate::foundation::math::{Vec3, Vec4};
use crate::render::api::{
    BackendResult, BlendMode, PipelineHandle, PipelineSpecification, RendererBackend,
    VertexArrayHandle, VertexBufferHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd};

/// Vertices per line segment
pub const LINE_VERTEX_COUNT: usize = 2;

/// Staging and GPU resources for line segments
#[derive(Debug)]
pub struct LineBatch {
    vertices: BatchBuffer<LineVertex>,
    line_width: f32,
    vertex_buffer: VertexBufferHandle,
    vertex_array: VertexArrayHandle,
    pipeline: PipelineHandle,
}

impl LineBatch {
    /// Allocate room for `max_lines` segments
    pub fn init(
        backend: &mut dyn RendererBackend,
        max_lines: usize,
        line_width: f32,
    ) -> BackendResult<Self> {
        let vertices = BatchBuffer::new(max_lines * LINE_VERTEX_COUNT);
        let vertex_buffer = backend.create_vertex_buffer(
            vertices.capacity() * std::mem::size_of::<LineVertex>(),
            LineVertex::layout(),
        )?;
        let vertex_array = backend.create_vertex_array(&[vertex_buffer], None)?;
        let pipeline = backend.create_pipeline(
            &PipelineSpecification::new("Renderer2D_Line")
                .with_blend(BlendMode::Alpha)
                .with_object_id(),
        )?;

        Ok(Self {
            vertices,
            line_width,
            vertex_buffer,
            vertex_array,
            pipeline,
        })
    }

    /// Start a new epoch (the line width is kept)
    pub fn reset(&mut self) {
        self.vertices.reset();
    }

    /// Write one segment; false when full
    pub fn submit(&mut self, p0: &Vec3, p1: &Vec3, color: &Vec4, object_id: i32) -> bool {
        if !self.vertices.has_space(LINE_VERTEX_COUNT) {
            return false;
        }

        for position in [p0, p1] {
            self.vertices.write(LineVertex {
                position: (*position).into(),
                color: (*color).into(),
                object_id,
            });
        }
        true
    }

    /// Width used by the next draw
    pub const fn line_width(&self) -> f32 {
        self.line_width
    }

    /// Change the width used by the next draw
    pub fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    /// Whether any segment was written
    pub const fn has_data(&self) -> bool {
        !self.vertices.is_empty()
    }

    /// Whether another segment would be rejected
    pub fn is_full(&self) -> bool {
        !self.vertices.has_space(LINE_VERTEX_COUNT)
    }

    /// Segments written this epoch
    pub const fn line_count(&self) -> usize {
        self.vertices.count() / LINE_VERTEX_COUNT
    }

    /// Vertices written this epoch
    pub const fn vertex_count(&self) -> usize {
        self.vertices.count()
    }

    /// Staged vertices
    pub fn vertices(&self) -> &[LineVertex] {
        self.vertices.as_slice()
    }

    /// Record the upload of the written vertex range
    pub fn upload(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::UploadVertexData {
            buffer: self.vertex_buffer,
            data: self.vertices.as_bytes().to_vec(),
        });
    }

    /// Record pipeline bind, line width and draw
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_draw(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::BindPipeline(self.pipeline));
        cmd.record(RenderCmd::SetLineWidth(self.line_width));
        cmd.record(RenderCmd::DrawLines {
            vertex_array: self.vertex_array,
            vertex_count: self.vertices.count() as u32,
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
    use crate::render::backends::HeadlessBackend;

    #[test]
    fn test_line_counts_and_draw() {
        let mut backend = HeadlessBackend::new();
        let mut lines = LineBatch::init(&mut backend, 2, 2.0).unwrap();
        let color = Vec4::new(0.0, 1.0, 0.0, 1.0);

        assert!(lines.submit(&Vec3::zeros(), &Vec3::x(), &color, -1));
        assert!(lines.submit(&Vec3::zeros(), &Vec3::y(), &color, -1));
        assert!(!lines.submit(&Vec3::zeros(), &Vec3::z(), &color, -1));
        assert_eq!(lines.line_count(), 2);

        lines.set_line_width(4.0);
        let mut cmd = CommandBuffer::new();
        lines.record_draw(&mut cmd);
        assert_eq!(cmd.commands()[1], RenderCmd::SetLineWidth(4.0));
        assert!(matches!(
            cmd.commands()[2],
            RenderCmd::DrawLines { vertex_count: 4, .. }
        ));

        lines.reset();
        assert!(!lines.has_data());
        assert!((lines.line_width() - 4.0).abs() < f32::EPSILON);
    }
}
