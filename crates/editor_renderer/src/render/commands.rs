//! Recorded render commands
//!
//! Batches and passes never call the backend while they record. They append
//! [`RenderCmd`] values to a [`CommandBuffer`]; buffers are submitted to a
//! [`RenderCommandQueue`] and replayed against the backend later in the same
//! frame. Commands are plain data, so tests can inspect exactly what a pass
//! produced.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};
use crate::render::api::{
    BackendResult, BlitMask, FramebufferHandle, PipelineHandle, RendererBackend, TextureHandle,
    VertexArrayHandle, VertexBufferHandle,
};
use crate::render::camera::CameraUniform;

/// Value of a named shader uniform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    /// int
    Int(i32),
    /// int[]
    IntArray(Vec<i32>),
    /// bool
    Bool(bool),
    /// float
    Float(f32),
    /// vec2
    Float2(Vec2),
    /// vec3
    Float3(Vec3),
    /// vec4
    Float4(Vec4),
    /// mat4
    Mat4(Mat4),
}

/// One recorded GPU operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderCmd {
    /// Set the viewport rectangle
    SetViewport {
        /// Left edge
        x: u32,
        /// Bottom edge
        y: u32,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Colour used by [`RenderCmd::Clear`]
    SetClearColor(Vec4),
    /// Clear colour and depth of the bound framebuffer
    Clear,
    /// Clear one integer attachment of the bound framebuffer to `value`
    ClearAttachment {
        /// Attachment index
        attachment: usize,
        /// Clear value
        value: i32,
    },
    /// Toggle alpha blending
    SetBlendEnabled(bool),
    /// Rasterised line width
    SetLineWidth(f32),
    /// Bind a pipeline; uniforms set afterwards belong to it
    BindPipeline(PipelineHandle),
    /// Render into a framebuffer
    BindFramebuffer(FramebufferHandle),
    /// Render into the default target
    UnbindFramebuffer,
    /// Bind a texture to a sampler slot
    BindTexture {
        /// Sampler slot
        slot: u32,
        /// Texture
        texture: TextureHandle,
    },
    /// Bind a framebuffer colour attachment to a sampler slot
    BindColorAttachment {
        /// Sampler slot
        slot: u32,
        /// Source framebuffer
        framebuffer: FramebufferHandle,
        /// Attachment index
        attachment: usize,
    },
    /// Bind a framebuffer depth attachment to a sampler slot
    BindDepthAttachment {
        /// Sampler slot
        slot: u32,
        /// Source framebuffer
        framebuffer: FramebufferHandle,
    },
    /// Set a uniform on the bound pipeline
    SetUniform {
        /// Uniform name
        name: String,
        /// Value
        value: UniformValue,
    },
    /// Update the shared camera uniform block
    UpdateCamera(CameraUniform),
    /// Replace the contents of a dynamic vertex buffer
    UploadVertexData {
        /// Destination
        buffer: VertexBufferHandle,
        /// Bytes, starting at offset 0
        data: Vec<u8>,
    },
    /// Copy buffers between framebuffers
    BlitFramebuffer {
        /// Source
        source: FramebufferHandle,
        /// Destination
        destination: FramebufferHandle,
        /// What to copy
        mask: BlitMask,
    },
    /// Indexed triangle list
    DrawIndexed {
        /// Vertex array
        vertex_array: VertexArrayHandle,
        /// Number of indices
        index_count: u32,
        /// First index
        first_index: u32,
    },
    /// Instanced indexed triangle list
    DrawIndexedInstanced {
        /// Vertex array (per-vertex and per-instance buffers)
        vertex_array: VertexArrayHandle,
        /// Indices per instance
        index_count: u32,
        /// Number of instances
        instance_count: u32,
    },
    /// Line list
    DrawLines {
        /// Vertex array
        vertex_array: VertexArrayHandle,
        /// Number of vertices (two per line)
        vertex_count: u32,
    },
}

impl RenderCmd {
    /// Whether this command is a GPU draw submission
    pub const fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawIndexed { .. } | Self::DrawIndexedInstanced { .. } | Self::DrawLines { .. }
        )
    }

    /// Shorthand for [`RenderCmd::SetUniform`]
    pub fn uniform(name: impl Into<String>, value: UniformValue) -> Self {
        Self::SetUniform {
            name: name.into(),
            value,
        }
    }
}

/// Ordered list of recorded commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBuffer {
    commands: Vec<RenderCmd>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn record(&mut self, command: RenderCmd) {
        self.commands.push(command);
    }

    /// Append several commands
    pub fn extend(&mut self, commands: impl IntoIterator<Item = RenderCmd>) {
        self.commands.extend(commands);
    }

    /// Recorded commands in order
    pub fn commands(&self) -> &[RenderCmd] {
        &self.commands
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw submissions
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|command| command.is_draw()).count()
    }

    /// Replay every command against `backend`, stopping at the first failure
    pub fn execute(&self, backend: &mut dyn RendererBackend) -> BackendResult<()> {
        for command in &self.commands {
            backend.submit(command)?;
        }
        Ok(())
    }

    /// Consume the buffer, yielding its commands
    pub fn into_commands(self) -> Vec<RenderCmd> {
        self.commands
    }

    /// Move the recorded commands out, leaving the buffer empty
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Forget every recorded command
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// Command buffers waiting for execution, in submission order
#[derive(Debug, Default)]
pub struct RenderCommandQueue {
    buffers: Vec<CommandBuffer>,
}

impl RenderCommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a buffer; empty buffers are dropped
    pub fn submit(&mut self, buffer: CommandBuffer) {
        if !buffer.is_empty() {
            self.buffers.push(buffer);
        }
    }

    /// Execute every queued buffer in submission order, then empty the queue
    pub fn flush(&mut self, backend: &mut dyn RendererBackend) -> BackendResult<()> {
        let buffers = std::mem::take(&mut self.buffers);
        for buffer in &buffers {
            buffer.execute(backend)?;
        }
        Ok(())
    }

    /// Drop queued buffers without executing them
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of queued buffers
    pub fn pending_buffer_count(&self) -> usize {
        self.buffers.len()
    }
}
