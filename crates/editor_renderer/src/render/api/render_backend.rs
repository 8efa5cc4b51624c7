//! Backend abstraction traits for the rendering system
//!
//! This module defines the trait that rendering backends must implement
//! to provide a consistent interface for the 2D batcher and the scene
//! renderer. Every GPU object is referred to through an opaque handle.

use serde::{Deserialize, Serialize};

use super::framebuffer::{FramebufferSpecification, TextureSpecification};
use super::pipeline::PipelineSpecification;
use crate::render::commands::RenderCmd;
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a vertex buffer stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexBufferHandle(pub u64);

/// Handle to an index buffer stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexBufferHandle(pub u64);

/// Handle to a vertex array (vertex buffers plus optional index buffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexArrayHandle(pub u64);

/// Handle to a texture stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

/// Handle to a framebuffer stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FramebufferHandle(pub u64);

/// Handle to a compiled pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineHandle(pub u64);

/// Type of a single vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderDataType {
    /// f32
    Float,
    /// vec2
    Float2,
    /// vec3
    Float3,
    /// vec4
    Float4,
    /// mat3
    Mat3,
    /// mat4
    Mat4,
    /// i32
    Int,
    /// ivec2
    Int2,
    /// ivec3
    Int3,
    /// ivec4
    Int4,
    /// bool
    Bool,
}

impl ShaderDataType {
    /// Size in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::Float | Self::Int => 4,
            Self::Float2 | Self::Int2 => 8,
            Self::Float3 | Self::Int3 => 12,
            Self::Float4 | Self::Int4 => 16,
            Self::Mat3 => 36,
            Self::Mat4 => 64,
            Self::Bool => 1,
        }
    }

    /// Number of scalar components
    pub const fn component_count(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Bool => 1,
            Self::Float2 | Self::Int2 => 2,
            Self::Float3 | Self::Int3 => 3,
            Self::Float4 | Self::Int4 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Whether the attribute is passed to the shader as an integer
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Int2 | Self::Int3 | Self::Int4 | Self::Bool)
    }
}

/// One attribute in a vertex layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferElement {
    /// Attribute name as declared in the shader
    pub name: String,
    /// Attribute type
    pub data_type: ShaderDataType,
    /// Byte offset inside the vertex
    pub offset: usize,
    /// Normalise integer data to [0, 1]
    pub normalized: bool,
}

/// Rate at which a vertex buffer advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VertexStep {
    /// Once per vertex
    #[default]
    Vertex,
    /// Once per instance
    Instance,
}

/// Interleaved vertex layout with computed offsets and stride
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferLayout {
    elements: Vec<BufferElement>,
    stride: usize,
    step: VertexStep,
}

impl BufferLayout {
    /// Build a per-vertex layout from `(type, name)` pairs in declaration order
    pub fn new(elements: &[(ShaderDataType, &str)]) -> Self {
        let mut offset = 0;
        let elements = elements
            .iter()
            .map(|&(data_type, name)| {
                let element = BufferElement {
                    name: name.to_string(),
                    data_type,
                    offset,
                    normalized: false,
                };
                offset += data_type.size();
                element
            })
            .collect();

        Self {
            elements,
            stride: offset,
            step: VertexStep::Vertex,
        }
    }

    /// Builder: advance once per instance
    pub fn per_instance(mut self) -> Self {
        self.step = VertexStep::Instance;
        self
    }

    /// Attributes in declaration order
    pub fn elements(&self) -> &[BufferElement] {
        &self.elements
    }

    /// Size of one vertex in bytes
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Step rate
    pub const fn step(&self) -> VertexStep {
        self.step
    }

    /// Attribute by name
    pub fn find(&self, name: &str) -> Option<&BufferElement> {
        self.elements.iter().find(|element| element.name == name)
    }
}

/// Main rendering backend trait
///
/// Resource creation is immediate; everything that touches pipeline state
/// or draws goes through [`RendererBackend::submit`] as a [`RenderCmd`].
pub trait RendererBackend {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Create a dynamic vertex buffer of `size` bytes
    fn create_vertex_buffer(&mut self, size: usize, layout: BufferLayout)
        -> BackendResult<VertexBufferHandle>;

    /// Create a static vertex buffer initialised from `data`
    fn create_vertex_buffer_with_data(
        &mut self,
        data: &[u8],
        layout: BufferLayout,
    ) -> BackendResult<VertexBufferHandle>;

    /// Create an index buffer
    fn create_index_buffer(&mut self, indices: &[u32]) -> BackendResult<IndexBufferHandle>;

    /// Bind vertex buffers (in attribute order) and an optional index buffer together
    fn create_vertex_array(
        &mut self,
        vertex_buffers: &[VertexBufferHandle],
        index_buffer: Option<IndexBufferHandle>,
    ) -> BackendResult<VertexArrayHandle>;

    /// Create a texture, optionally uploading initial pixels
    fn create_texture(
        &mut self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle>;

    /// Create a framebuffer with the given attachments
    fn create_framebuffer(&mut self, spec: &FramebufferSpecification)
        -> BackendResult<FramebufferHandle>;

    /// Reallocate a framebuffer's attachments at a new size
    fn resize_framebuffer(
        &mut self,
        framebuffer: FramebufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    /// Current specification of a framebuffer
    fn framebuffer_specification(&self, framebuffer: FramebufferHandle)
        -> Option<FramebufferSpecification>;

    /// Compile a pipeline
    fn create_pipeline(&mut self, spec: &PipelineSpecification) -> BackendResult<PipelineHandle>;

    /// Texture backing a colour attachment (for display in an editor viewport)
    fn color_attachment_renderer_id(
        &self,
        framebuffer: FramebufferHandle,
        index: usize,
    ) -> Option<TextureHandle>;

    /// Read one texel of an integer attachment; `(x, y)` has a bottom-left origin
    fn read_pixel(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: usize,
        x: i32,
        y: i32,
    ) -> BackendResult<i32>;

    /// Execute one recorded command
    fn submit(&mut self, command: &RenderCmd) -> BackendResult<()>;

    /// Destroy a vertex buffer
    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle);

    /// Destroy an index buffer
    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle);

    /// Destroy a vertex array (not the buffers it references)
    fn destroy_vertex_array(&mut self, handle: VertexArrayHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Destroy a framebuffer and its attachments
    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);

    /// Destroy a pipeline
    fn destroy_pipeline(&mut self, handle: PipelineHandle);

    /// Downcast to the concrete backend type for inspection
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to the mutable concrete backend type for inspection
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets_and_stride() {
        let layout = BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float4, "a_Color"),
            (ShaderDataType::Int, "a_ObjectID"),
        ]);
        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.find("a_Color").map(|e| e.offset), Some(12));
        assert_eq!(layout.find("a_ObjectID").map(|e| e.offset), Some(28));
        assert_eq!(layout.step(), VertexStep::Vertex);
    }

    #[test]
    fn test_per_instance_layout() {
        let layout = BufferLayout::new(&[(ShaderDataType::Mat4, "a_Transform")]).per_instance();
        assert_eq!(layout.step(), VertexStep::Instance);
        assert_eq!(layout.stride(), 64);
    }
}
