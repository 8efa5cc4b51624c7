//! 3D scene rendering
//!
//! Meshes, materials and lights are submitted to a [`SceneRenderer`] between
//! `begin_scene` and `end_scene`. At the end of the frame the renderer builds
//! a render graph for the active [`SceneInfo`] (forward or deferred, with the
//! optional SSGI, GTAO, outline, skybox and debug passes) and executes it.
//! Image-based lighting maps are precomputed once per environment map.

pub mod debug_renderer;
pub mod draw_command;
pub mod history;
pub mod ibl;
pub mod lights;
pub mod mesh;
pub mod passes;
pub mod scene_info;
pub mod scene_renderer;
pub mod shadow;
pub mod statistics;

pub use debug_renderer::{DebugCommand, DebugRenderer};
pub use draw_command::{MeshDrawCommand, SkyboxDrawCommand};
pub use ibl::{EnvironmentIbl, IblMaps};
pub use lights::{DirectionalLight, EnvironmentLight, PointLight, SpotLight};
pub use mesh::{Material, MaterialType, Mesh, MeshVertex, PbrMaterial, PhongMaterial, Submesh};
pub use passes::ScenePass;
pub use scene_info::{
    EnvironmentSettings, GBufferAttachment, GBufferDebugMode, GtaoParams, IblParams, RenderMode,
    SceneInfo, SsgiParams,
};
pub use scene_renderer::{FrameState, SceneRenderer};
pub use statistics::{RenderStatistics, Renderer3DStatistics};
