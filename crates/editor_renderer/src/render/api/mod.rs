//! Backend-agnostic rendering API
//!
//! The renderer core talks to the GPU exclusively through these types:
//! opaque handles, buffer/framebuffer/pipeline specifications and the
//! [`RendererBackend`] trait.

pub mod framebuffer;
pub mod pipeline;
pub mod render_backend;

pub use framebuffer::{
    BlitMask, FramebufferSpecification, FramebufferTextureFormat, TextureFormat,
    TextureSpecification,
};
pub use pipeline::{BlendMode, CompareOp, CullMode, PipelineSpecification};
pub use render_backend::{
    BackendResult, BufferElement, BufferLayout, FramebufferHandle, IndexBufferHandle,
    PipelineHandle, RendererBackend, ShaderDataType, TextureHandle, VertexArrayHandle,
    VertexBufferHandle, VertexStep,
};
