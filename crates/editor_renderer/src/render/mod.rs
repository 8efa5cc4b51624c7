//! Rendering system
//!
//! Two layers share one backend:
//!
//! - [`renderer2d::Renderer2D`] batches quads, circles, lines and MSDF text
//!   into fixed-capacity CPU buffers and flushes them as a handful of draws.
//! - [`scene::SceneRenderer`] builds a [`graph::RenderGraph`] every frame
//!   (shadow, G-buffer, SSGI, GTAO, lighting, transparency, outline, skybox,
//!   debug views) and executes it, then flushes the 2D overlay on top.
//!
//! Nothing here talks to a graphics API directly. Passes and batches record
//! [`commands::RenderCmd`] values which a [`api::RendererBackend`] executes.

pub mod api;
pub mod backends;
pub mod batch;
pub mod camera;
pub mod commands;
pub mod graph;
pub mod renderer2d;
pub mod scene;
pub mod text;
pub mod texture;


pub use api::{BackendResult, RendererBackend};
pub use camera::{Camera, CameraUniform, SceneCamera};
pub use commands::{CommandBuffer, RenderCmd, RenderCommandQueue, UniformValue};
pub use graph::{RenderGraph, RenderGraphError, ResourceHandle};
pub use renderer2d::{Renderer2D, Renderer2DStatistics};
pub use scene::{SceneInfo, SceneRenderer};
pub use texture::{SubTexture2D, Texture2D, TextureSlots};

use thiserror::Error;

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to initialize renderer
    #[error("Failed to initialize renderer: {0}")]
    InitializationFailed(String),

    /// Rendering operation failed
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Scene settings were changed while a frame was being recorded
    #[error("Scene settings cannot change while a frame is in progress")]
    FrameInProgress,

    /// Frame lifecycle call made in the wrong state
    #[error("Invalid frame state: expected {expected}, found {found}")]
    InvalidFrameState {
        /// State the call requires
        expected: String,
        /// State the renderer was in
        found: String,
    },

    /// Render graph failure
    #[error(transparent)]
    Graph(#[from] RenderGraphError),
}
