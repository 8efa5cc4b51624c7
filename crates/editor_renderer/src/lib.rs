//! # Editor Renderer
//!
//! Viewport renderer of a 3D scene editor.
//!
//! ## Features
//!
//! - **Batched 2D overlay**: quads, circles, lines and MSDF text in a handful of draws
//! - **Render graph**: per-frame pass graph with dependency ordering and pooled transients
//! - **Forward and deferred paths**: shadows, SSGI, GTAO, outlines, skybox and G-buffer debug views
//! - **Entity picking**: integer ID attachment read back under the cursor
//! - **Backend agnostic**: passes record commands; a [`render::RendererBackend`] executes them
//!
//! ## Quick Start
//!
//! ```rust
//! use editor_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut backend = HeadlessBackend::new();
//!     let mut renderer = SceneRenderer::new(&mut backend, &RendererConfig::default())?;
//!
//!     let camera = SceneCamera::perspective(1.0, 16.0 / 9.0, 0.1, 100.0)
//!         .looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
//!     renderer.begin_scene(&camera)?;
//!     renderer.draw_sprite(&Mat4::identity(), &Vec4::new(1.0, 0.5, 0.2, 1.0), None, 1.0, 7);
//!     renderer.end_scene(&mut backend)?;
//!
//!     renderer.shutdown(&mut backend);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod input;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, Renderer2DConfig, RendererConfig},
        foundation::math::{Aabb, Mat4, Vec2, Vec3, Vec4},
        input::picking::NO_ENTITY,
        render::{
            backends::HeadlessBackend,
            scene::{
                EnvironmentLight, GBufferDebugMode, Material, Mesh, RenderMode, RenderStatistics,
                SceneInfo, SceneRenderer,
            },
            text::{MsdfFont, TextParams},
            Camera, RenderError, RenderResult, Renderer2D, RendererBackend, SceneCamera,
            Texture2D,
        },
    };
}
