//! # SceneRenderer
//!
//! Per-frame orchestration of the 3D passes and the 2D overlay.
//!
//! ## Frame flow
//!
//! `begin_scene` captures the camera and opens the 2D overlay on the target
//! framebuffer. Mesh submissions are culled against the camera frustum and
//! queued; 2D draws go straight to the batcher. `end_scene` rebuilds the
//! render graph for the active [`SceneInfo`], executes it, replays the debug
//! queue and flushes the 2D overlay on top of the 3D result.
//!
//! Scene settings can only change between frames, so every pass of a frame
//! sees the same configuration.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, trace};

use super::debug_renderer::{infinite_line_endpoints, DebugRenderer};
use super::draw_command::{MeshDrawCommand, SkyboxDrawCommand};
use super::history::{SsgiFrame, SsgiHistory};
use super::ibl::EnvironmentIbl;
use super::lights::EnvironmentLight;
use super::mesh::{Material, Mesh};
use super::passes::{outline_ids, PassRecorder, SceneGeometry, ScenePass, ScenePipelines, TargetWrite};
use super::scene_info::{GBufferAttachment, SceneInfo};
use super::shadow::{light_space_matrix, ShadowMap};
use super::statistics::{RenderStatistics, Renderer3DStatistics};
use crate::config::RendererConfig;
use crate::foundation::math::{Frustum, Mat4, Vec2, Vec3, Vec4};
use crate::input::picking;
use crate::render::api::{
    FramebufferHandle, FramebufferSpecification, FramebufferTextureFormat, RendererBackend,
    TextureHandle,
};
use crate::render::camera::{Camera, SceneCamera};
use crate::render::commands::RenderCommandQueue;
use crate::render::graph::{RenderGraph, ResourceDesc, ResourceHandle};
use crate::render::renderer2d::Renderer2D;
use crate::render::text::{MsdfFont, TextParams};
use crate::render::texture::Texture2D;
use crate::render::{RenderError, RenderResult};

/// Near plane used by [`SceneRenderer::begin_scene_with_transform`]
pub const DEFAULT_NEAR: f32 = 0.1;

/// Far plane used by [`SceneRenderer::begin_scene_with_transform`]
pub const DEFAULT_FAR: f32 = 1000.0;

/// Attachments of the default target: colour, entity ID, depth
pub fn default_target_attachments() -> Vec<FramebufferTextureFormat> {
    vec![
        FramebufferTextureFormat::Rgba8,
        FramebufferTextureFormat::RedInteger,
        FramebufferTextureFormat::Depth24Stencil8,
    ]
}

/// G-buffer layout, indexed by [`GBufferAttachment`] plus depth
pub fn g_buffer_attachments() -> Vec<FramebufferTextureFormat> {
    vec![
        FramebufferTextureFormat::Rgba8,
        FramebufferTextureFormat::Rgb16F,
        FramebufferTextureFormat::Rgb16F,
        FramebufferTextureFormat::Rgb16F,
        FramebufferTextureFormat::RedInteger,
        FramebufferTextureFormat::Depth24Stencil8,
    ]
}

/// Where the renderer is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames; settings may change
    Idle,
    /// Camera captured, nothing submitted yet
    SceneBegun,
    /// At least one submission this frame
    Recording,
    /// Graph running
    Executing,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::SceneBegun => "SceneBegun",
            Self::Recording => "Recording",
            Self::Executing => "Executing",
        };
        f.write_str(name)
    }
}

/// Versioned imports of the target so every pass writing it is the single
/// producer of its version
struct TargetChain {
    framebuffer: FramebufferHandle,
    current: Option<ResourceHandle>,
}

impl TargetChain {
    const fn new(framebuffer: FramebufferHandle) -> Self {
        Self {
            framebuffer,
            current: None,
        }
    }

    /// Previous version (if any) and the version the next pass writes
    fn next(
        &mut self,
        graph: &mut RenderGraph<ScenePass>,
        name: &str,
    ) -> (Option<ResourceHandle>, TargetWrite) {
        let previous = self.current;
        let resource = graph.import_resource(name, self.framebuffer);
        self.current = Some(resource);
        (
            previous,
            TargetWrite {
                resource,
                clear: previous.is_none(),
            },
        )
    }
}

/// Renders meshes through a per-frame render graph and 2D overlay on top
pub struct SceneRenderer {
    renderer2d: Renderer2D,
    pipelines: ScenePipelines,
    geometry: SceneGeometry,
    graph: RenderGraph<ScenePass>,
    queue: RenderCommandQueue,

    scene_info: SceneInfo,
    state: FrameState,
    overlay_only: bool,
    camera: SceneCamera,
    frustum: Frustum,

    draw_list: Vec<MeshDrawCommand>,
    outline_ids: Vec<i32>,
    lights: EnvironmentLight,
    environment_map: Option<TextureHandle>,
    ibl: EnvironmentIbl,
    default_material: Arc<Material>,
    debug_renderer: DebugRenderer,

    viewport: (u32, u32),
    owned_target: FramebufferHandle,
    external_target: Option<FramebufferHandle>,
    g_buffer: FramebufferHandle,
    shadow_map: ShadowMap,
    ssgi_history: SsgiHistory,

    stats: Renderer3DStatistics,
}

impl SceneRenderer {
    /// Create the pipelines, shared geometry, target and G-buffer
    pub fn new(backend: &mut dyn RendererBackend, config: &RendererConfig) -> RenderResult<Self> {
        config
            .renderer2d
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let (width, height) = (config.viewport.width.max(1), config.viewport.height.max(1));

        let renderer2d = Renderer2D::new(backend, &config.renderer2d)?;
        let pipelines = ScenePipelines::create(backend)
            .map_err(|e| RenderError::ResourceCreationFailed(format!("scene pipelines: {e}")))?;
        let geometry = SceneGeometry::create(backend)
            .map_err(|e| RenderError::ResourceCreationFailed(format!("scene geometry: {e}")))?;
        let ibl = EnvironmentIbl::new(backend)
            .map_err(|e| RenderError::ResourceCreationFailed(format!("IBL pipelines: {e}")))?;
        let owned_target = backend
            .create_framebuffer(&FramebufferSpecification::new(
                width,
                height,
                default_target_attachments(),
            ))
            .map_err(|e| RenderError::ResourceCreationFailed(format!("target framebuffer: {e}")))?;
        let g_buffer = backend
            .create_framebuffer(&FramebufferSpecification::new(width, height, g_buffer_attachments()))
            .map_err(|e| RenderError::ResourceCreationFailed(format!("G-buffer: {e}")))?;

        let mut scene_info = config.scene.clone();
        scene_info.normalize();
        let camera = SceneCamera::perspective(
            45.0_f32.to_radians(),
            width as f32 / height as f32,
            DEFAULT_NEAR,
            DEFAULT_FAR,
        );

        info!(
            "SceneRenderer initialized on {} backend ({width}x{height}, {:?})",
            backend.name(),
            scene_info.render_mode()
        );

        Ok(Self {
            renderer2d,
            pipelines,
            geometry,
            graph: RenderGraph::new(),
            queue: RenderCommandQueue::new(),
            scene_info,
            state: FrameState::Idle,
            overlay_only: false,
            frustum: Frustum::from_view_projection(&camera.view_projection()),
            camera,
            draw_list: Vec::new(),
            outline_ids: Vec::new(),
            lights: EnvironmentLight::default(),
            environment_map: None,
            ibl,
            default_material: Arc::new(Material::default()),
            debug_renderer: DebugRenderer::new(),
            viewport: (width, height),
            owned_target,
            external_target: None,
            g_buffer,
            shadow_map: ShadowMap::default(),
            ssgi_history: SsgiHistory::default(),
            stats: Renderer3DStatistics::default(),
        })
    }

    /// Release every GPU resource the renderer owns
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        self.graph.shutdown(backend);
        self.shadow_map.shutdown(backend);
        self.ssgi_history.shutdown(backend);
        self.ibl.shutdown(backend);
        backend.destroy_framebuffer(self.g_buffer);
        backend.destroy_framebuffer(self.owned_target);
        self.geometry.destroy(backend);
        self.pipelines.destroy(backend);
        self.renderer2d.shutdown(backend);
        info!("SceneRenderer shut down");
    }

    // === Frame lifecycle ===

    /// Start a frame seen through `camera`
    pub fn begin_scene(&mut self, camera: &SceneCamera) -> RenderResult<()> {
        self.begin(camera, false)
    }

    /// Start a frame with a camera placed by `transform` (camera to world)
    pub fn begin_scene_with_transform(&mut self, camera: &Camera, transform: &Mat4) -> RenderResult<()> {
        let scene_camera = SceneCamera {
            camera: *camera,
            view: Mat4::identity(),
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
        }
        .with_transform(transform);
        self.begin(&scene_camera, false)
    }

    /// Start a 2D-only frame; meshes submitted in it only get AABB outlines
    pub fn begin_overlay(&mut self, camera: &SceneCamera) -> RenderResult<()> {
        self.begin(camera, true)
    }

    fn begin(&mut self, camera: &SceneCamera, overlay_only: bool) -> RenderResult<()> {
        self.expect_state(FrameState::Idle)?;
        self.camera = *camera;
        self.frustum = Frustum::from_view_projection(&camera.view_projection());
        self.overlay_only = overlay_only;

        self.renderer2d.set_target_framebuffer(Some(self.target_framebuffer()));
        self.renderer2d.begin_scene(camera);
        self.state = FrameState::SceneBegun;
        Ok(())
    }

    /// Run the scene passes, then flush the 2D overlay
    pub fn end_scene(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        self.expect_open_frame(false)?;
        self.state = FrameState::Executing;

        let result = self.execute_frame(backend);

        self.draw_list.clear();
        self.outline_ids.clear();
        self.state = FrameState::Idle;
        result
    }

    /// Draw AABB outlines of the submitted meshes and flush the 2D overlay
    pub fn end_overlay(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        self.expect_open_frame(true)?;
        self.state = FrameState::Executing;

        let color = self.scene_info.mesh_outline_color;
        for draw in self.draw_list.iter().filter(|draw| draw.draw_outline && draw.visible) {
            self.renderer2d
                .draw_aabb(&draw.local_bounds, &draw.transform, &color, draw.object_id);
        }
        self.debug_renderer.replay(&mut self.renderer2d, self.camera.far);
        let result = self.renderer2d.end_scene(backend);

        self.draw_list.clear();
        self.outline_ids.clear();
        self.overlay_only = false;
        self.state = FrameState::Idle;
        result
    }

    fn expect_state(&self, expected: FrameState) -> RenderResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::InvalidFrameState {
                expected: expected.to_string(),
                found: self.state.to_string(),
            })
        }
    }

    fn expect_open_frame(&self, overlay_only: bool) -> RenderResult<()> {
        let open = matches!(self.state, FrameState::SceneBegun | FrameState::Recording);
        if open && self.overlay_only == overlay_only {
            return Ok(());
        }
        let frame = if overlay_only { "overlay" } else { "scene" };
        Err(RenderError::InvalidFrameState {
            expected: format!("{} or {} {frame} frame", FrameState::SceneBegun, FrameState::Recording),
            found: if open && self.overlay_only {
                format!("{} overlay frame", self.state)
            } else if open {
                format!("{} scene frame", self.state)
            } else {
                self.state.to_string()
            },
        })
    }

    fn accepts_draws(&mut self) -> bool {
        match self.state {
            FrameState::SceneBegun | FrameState::Recording => {
                self.state = FrameState::Recording;
                true
            }
            FrameState::Idle | FrameState::Executing => {
                debug!("draw outside of begin_scene/end_scene ignored");
                false
            }
        }
    }

    fn execute_frame(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        self.ensure_frame_resources(backend)?;
        self.prepare_ibl(backend)?;
        self.stats.mesh_count += self.draw_list.len();

        let light_space = self
            .shadow_direction()
            .map_or_else(Mat4::identity, |direction| light_space_matrix(&direction));
        let ssgi_frame = if self.scene_info.use_ssgi() {
            self.ssgi_history
                .begin_frame(&self.camera.view_projection(), &self.scene_info.ssgi)
        } else {
            self.ssgi_history.disable();
            None
        };
        self.build_graph(ssgi_frame);

        let target_id_attachment = backend
            .framebuffer_specification(self.target_framebuffer())
            .and_then(|spec| spec.first_integer_attachment());
        let mut recorder = PassRecorder {
            info: &self.scene_info,
            camera: &self.camera,
            draws: &self.draw_list,
            lights: &self.lights,
            pipelines: &self.pipelines,
            geometry: &self.geometry,
            g_buffer: self.g_buffer,
            target_id_attachment,
            light_space,
            ibl: self.ibl.maps(),
            renderer2d: &mut self.renderer2d,
            stats: &mut self.stats,
        };
        self.graph
            .execute(&mut self.queue, backend, |pass, ctx, cmd| {
                recorder.record(pass.payload(), ctx, cmd);
            })?;
        trace!("executed passes: {:?}", self.graph.executed_passes());

        self.debug_renderer.replay(&mut self.renderer2d, self.camera.far);
        self.renderer2d.end_scene(backend)
    }

    fn shadow_direction(&self) -> Option<Vec3> {
        if self.scene_info.environment.enable_shadows {
            self.lights.shadow_direction()
        } else {
            None
        }
    }

    fn ensure_frame_resources(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        let (width, height) = self.viewport;

        if self.external_target.is_none() {
            resize_if_needed(backend, self.owned_target, width, height)?;
        }
        if self.scene_info.is_deferred() {
            resize_if_needed(backend, self.g_buffer, width, height)?;
        }
        if self.shadow_direction().is_some() {
            self.shadow_map
                .ensure(backend, self.scene_info.environment.shadow_map_size)?;
        }
        if self.scene_info.use_ssgi() {
            self.ssgi_history.ensure(backend, width, height)?;
        }
        Ok(())
    }

    /// Queue the IBL convolutions ahead of the graph when the maps are stale
    fn prepare_ibl(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        let Some(environment_map) = self.environment_map else {
            self.ibl.release_maps(backend);
            return Ok(());
        };
        if !self.scene_info.environment.use_ibl {
            return Ok(());
        }
        if let Some(precompute) =
            self.ibl
                .ensure(backend, environment_map, &self.scene_info.ibl, &self.geometry)?
        {
            self.stats.ibl_draw_calls += precompute.draw_count();
            self.queue.submit(precompute);
        }
        Ok(())
    }

    fn build_graph(&mut self, ssgi_frame: Option<SsgiFrame>) {
        let casts_shadows = self.shadow_direction().is_some();
        let mut target = TargetChain::new(self.target_framebuffer());

        self.graph.reset();
        let graph = &mut self.graph;
        let info = &self.scene_info;
        let (width, height) = self.viewport;
        let deferred = info.is_deferred();
        let debug_view = deferred && info.is_debug_view();

        let shadow_map = match (casts_shadows, self.shadow_map.framebuffer()) {
            (true, Some(framebuffer)) => {
                let shadow_map = graph.import_resource("shadow_map", framebuffer);
                graph.add_pass("ShadowPass", ScenePass::Shadow { shadow_map }, |pass| {
                    pass.write(shadow_map);
                });
                Some(shadow_map)
            }
            _ => None,
        };

        let scene_depth = graph.create_resource(
            "scene_depth",
            ResourceDesc::new(width, height, vec![FramebufferTextureFormat::DepthComponent32F]),
        );

        let mut g_buffer = None;
        let mut ssgi = None;
        let mut gtao = None;

        if deferred {
            let gb = graph.import_resource("g_buffer", self.g_buffer);
            graph.add_pass(
                "GBufferPass",
                ScenePass::GBuffer {
                    g_buffer: gb,
                    scene_depth,
                },
                |pass| {
                    pass.write(gb).write(scene_depth);
                },
            );
            g_buffer = Some(gb);

            if let Some(frame) = ssgi_frame {
                let output = graph.import_resource("ssgi", frame.current);
                let history = graph.import_resource("ssgi_history", frame.history);
                graph.add_pass(
                    "SSGIPass",
                    ScenePass::Ssgi {
                        g_buffer: gb,
                        scene_depth,
                        frame,
                    },
                    |pass| {
                        pass.read(gb).read(scene_depth).read(history).write(output);
                    },
                );
                ssgi = Some((output, frame.current));
            }

            if info.use_gtao() {
                let output = graph.create_resource(
                    "gtao",
                    ResourceDesc::new(width, height, vec![FramebufferTextureFormat::Rg16F]),
                );
                graph.add_pass(
                    "GTAOPass",
                    ScenePass::Gtao {
                        g_buffer: gb,
                        scene_depth,
                        output,
                    },
                    |pass| {
                        pass.read(gb).read(scene_depth).write(output);
                    },
                );
                gtao = Some(output);
            }

            if !debug_view {
                let (_, write) = target.next(graph, "lighting_result");
                graph.add_pass(
                    "LightingPass",
                    ScenePass::Lighting {
                        g_buffer: gb,
                        target: write,
                        shadow_map,
                        ssgi: ssgi.map(|(_, framebuffer)| framebuffer),
                        gtao,
                    },
                    |pass| {
                        pass.read(gb).read(scene_depth);
                        for input in [shadow_map, ssgi.map(|(resource, _)| resource), gtao]
                            .into_iter()
                            .flatten()
                        {
                            pass.read(input);
                        }
                        pass.write(write.resource);
                    },
                );

                if self.draw_list.iter().any(|draw| draw.visible && draw.transparent) {
                    let (previous, write) = target.next(graph, "lighting_result.transparent");
                    graph.add_pass(
                        "TransparentPass",
                        ScenePass::Transparent {
                            target: write,
                            shadow_map,
                        },
                        |pass| {
                            read_all(pass, &[previous, shadow_map]);
                            pass.read(scene_depth).write(write.resource);
                        },
                    );
                }
            }
        } else {
            let (_, write) = target.next(graph, "lighting_result");
            graph.add_pass(
                "ForwardPass",
                ScenePass::Forward {
                    target: write,
                    scene_depth,
                    shadow_map,
                },
                |pass| {
                    read_all(pass, &[shadow_map]);
                    pass.write(write.resource).write(scene_depth);
                },
            );
        }

        let ids = outline_ids(&self.outline_ids, &self.draw_list);
        match g_buffer {
            Some(gb) if !ids.is_empty() => {
                let (previous, write) = target.next(graph, "lighting_result.outline");
                graph.add_pass(
                    "OutlinePass",
                    ScenePass::Outline {
                        g_buffer: gb,
                        target: write,
                        ids,
                    },
                    |pass| {
                        read_all(pass, &[previous]);
                        pass.read(gb).read(scene_depth).write(write.resource);
                    },
                );
            }
            _ if self.draw_list.iter().any(|draw| draw.draw_outline && draw.visible) => {
                let (previous, write) = target.next(graph, "lighting_result.outline");
                graph.add_pass("OutlinePass", ScenePass::OutlineAabb { target: write }, |pass| {
                    read_all(pass, &[previous]);
                    pass.write(write.resource);
                });
            }
            _ => {}
        }

        if info.environment.show_skybox && !debug_view {
            let skybox = self.environment_map.map(|cubemap| {
                let cube = self.geometry.skybox();
                SkyboxDrawCommand::new(
                    cube.vertex_array(),
                    cube.submeshes().first().map_or(0, |submesh| submesh.index_count),
                    cubemap,
                    &self.camera.view,
                    &self.camera.camera.projection,
                )
            });
            let (previous, write) = target.next(graph, "lighting_result.skybox");
            graph.add_pass(
                "SkyboxPass",
                ScenePass::Skybox {
                    target: write,
                    skybox,
                },
                |pass| {
                    read_all(pass, &[previous]);
                    pass.read(scene_depth).write(write.resource);
                },
            );
        }

        match g_buffer {
            Some(gb) if debug_view => {
                let (previous, write) = target.next(graph, "lighting_result.debug");
                let ssgi_resource = ssgi.map(|(resource, _)| resource);
                graph.add_pass(
                    "GBufferDebugPass",
                    ScenePass::GBufferDebug {
                        g_buffer: gb,
                        scene_depth,
                        target: write,
                        mode: info.gbuffer_debug(),
                        ssgi: ssgi.map(|(_, framebuffer)| framebuffer),
                        gtao,
                    },
                    |pass| {
                        read_all(pass, &[previous, ssgi_resource, gtao]);
                        pass.read(gb).read(scene_depth).write(write.resource);
                    },
                );
            }
            _ if info.enable_depth_view => {
                let (previous, write) = target.next(graph, "lighting_result.depth_view");
                graph.add_pass(
                    "DepthViewPass",
                    ScenePass::DepthView {
                        scene_depth,
                        target: write,
                    },
                    |pass| {
                        read_all(pass, &[previous]);
                        pass.read(scene_depth).write(write.resource);
                    },
                );
            }
            _ => {}
        }

        trace!("scene graph built with {} passes", self.graph.passes().len());
    }

    // === Mesh submission ===

    /// Queue every submesh of `mesh` for this frame
    ///
    /// `materials` is indexed by submesh; a missing entry falls back to the
    /// default PBR material. A missing mesh is ignored.
    pub fn submit_mesh(
        &mut self,
        mesh: Option<&Arc<Mesh>>,
        materials: &[Option<Arc<Material>>],
        transform: &Mat4,
        object_id: i32,
        draw_outline: bool,
    ) {
        if !self.accepts_draws() {
            return;
        }
        let Some(mesh) = mesh else {
            trace!("submit_mesh without mesh skipped");
            return;
        };

        let visible = self
            .frustum
            .intersects_aabb(&mesh.bounds().transformed(transform));
        for (index, submesh) in mesh.submeshes().iter().enumerate() {
            let material = materials
                .get(index)
                .cloned()
                .flatten()
                .unwrap_or_else(|| Arc::clone(&self.default_material));
            let transparent = material.is_transparent();
            self.draw_list.push(MeshDrawCommand {
                vertex_array: mesh.vertex_array(),
                index_offset: submesh.index_offset,
                index_count: submesh.index_count,
                material,
                transform: *transform,
                object_id,
                draw_outline,
                visible,
                transparent,
                local_bounds: *mesh.bounds(),
            });
        }
    }

    /// Draw commands queued this frame
    pub fn draw_list(&self) -> &[MeshDrawCommand] {
        &self.draw_list
    }

    // === 2D overlay ===

    /// Flat or textured quad
    pub fn draw_sprite(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        object_id: i32,
    ) {
        if !self.accepts_draws() {
            return;
        }
        if texture.is_some() {
            self.renderer2d
                .draw_textured_quad(transform, texture, tiling_factor, color, object_id);
        } else {
            self.renderer2d.draw_quad(transform, color, object_id);
        }
    }

    /// MSDF text; nothing is drawn without a usable font
    pub fn draw_string(
        &mut self,
        text: &str,
        font: Option<&Arc<MsdfFont>>,
        transform: &Mat4,
        params: &TextParams,
        object_id: i32,
    ) {
        if self.accepts_draws() {
            self.renderer2d
                .draw_string(text, font, transform, params, object_id);
        }
    }

    /// Disc or ring
    pub fn draw_circle(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        thickness: f32,
        fade: f32,
        object_id: i32,
    ) {
        if self.accepts_draws() {
            self.renderer2d
                .draw_circle(transform, color, thickness, fade, object_id);
        }
    }

    /// Rectangle outline of the unit quad under `transform`
    pub fn draw_rect(&mut self, transform: &Mat4, color: &Vec4, object_id: i32) {
        if self.accepts_draws() {
            self.renderer2d.draw_rect_transform(transform, color, object_id);
        }
    }

    /// Camera-facing quad
    pub fn draw_quad_billboard(&mut self, position: &Vec3, size: &Vec2, color: &Vec4, object_id: i32) {
        if self.accepts_draws() {
            self.renderer2d
                .draw_quad_billboard(position, size, color, object_id);
        }
    }

    /// Line segment
    pub fn draw_line(&mut self, p0: &Vec3, p1: &Vec3, color: &Vec4, object_id: i32) {
        if self.accepts_draws() {
            self.renderer2d.draw_line(p0, p1, color, object_id);
        }
    }

    /// Line through `point` reaching twice the far plane both ways
    pub fn draw_infinite_line(&mut self, point: &Vec3, direction: &Vec3, color: &Vec4) {
        if self.accepts_draws() {
            let (from, to) = infinite_line_endpoints(point, direction, self.camera.far);
            self.renderer2d.draw_line(&from, &to, color, -1);
        }
    }

    /// Width of subsequent lines
    pub fn set_line_width(&mut self, width: f32) {
        self.renderer2d.set_line_width(width);
    }

    // === Settings ===

    /// Entity IDs to outline this frame, in addition to flagged meshes
    pub fn set_outline_ids(&mut self, ids: &[i32]) {
        self.outline_ids.clear();
        self.outline_ids.extend_from_slice(ids);
    }

    /// Lights of the scene
    pub fn set_environment_light(&mut self, lights: EnvironmentLight) {
        self.lights = lights;
    }

    /// Cubemap for the skybox and image-based lighting
    pub fn set_environment_map(&mut self, environment_map: Option<TextureHandle>) {
        self.environment_map = environment_map;
    }

    /// Render into `target` instead of the renderer's own framebuffer
    ///
    /// Takes effect at the next `begin_scene`. `None` goes back to the owned
    /// target.
    pub fn set_target_framebuffer(&mut self, target: Option<FramebufferHandle>) {
        self.external_target = target;
    }

    /// Framebuffer the frame ends up in
    pub fn target_framebuffer(&self) -> FramebufferHandle {
        self.external_target.unwrap_or(self.owned_target)
    }

    /// Resize the owned target and the G-buffer at the next frame
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("ignoring empty viewport size {width}x{height}");
            return;
        }
        if self.viewport != (width, height) {
            debug!("viewport resized to {width}x{height}");
            self.viewport = (width, height);
        }
    }

    /// Current viewport size
    pub const fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    /// The G-buffer framebuffer
    pub const fn g_buffer(&self) -> FramebufferHandle {
        self.g_buffer
    }

    /// Active scene settings
    pub const fn scene_info(&self) -> &SceneInfo {
        &self.scene_info
    }

    /// Change scene settings between frames
    ///
    /// Values written directly into the fields are passed through
    /// [`SceneInfo::normalize`] afterwards.
    pub fn update_scene_info(&mut self, update: impl FnOnce(&mut SceneInfo)) -> RenderResult<()> {
        if self.state != FrameState::Idle {
            return Err(RenderError::FrameInProgress);
        }
        update(&mut self.scene_info);
        self.scene_info.normalize();
        Ok(())
    }

    /// Current frame state
    pub const fn frame_state(&self) -> FrameState {
        self.state
    }

    /// Debug primitives queued for this frame
    pub const fn debug_renderer(&self) -> &DebugRenderer {
        &self.debug_renderer
    }

    /// Queue debug primitives; replayed on top of the frame at `end_scene`
    pub fn debug_renderer_mut(&mut self) -> &mut DebugRenderer {
        &mut self.debug_renderer
    }

    /// Graph of the last frame
    pub const fn graph(&self) -> &RenderGraph<ScenePass> {
        &self.graph
    }

    /// SSGI accumulation state
    pub const fn ssgi_history(&self) -> &SsgiHistory {
        &self.ssgi_history
    }

    // === Statistics ===

    /// Counters since the last reset
    pub fn statistics(&self) -> RenderStatistics {
        RenderStatistics {
            renderer2d: self.renderer2d.statistics(),
            renderer3d: self.stats,
        }
    }

    /// Zero all counters
    pub fn reset_statistics(&mut self) {
        self.renderer2d.reset_statistics();
        self.stats = Renderer3DStatistics::default();
    }

    // === Picking ===

    /// Entity under viewport pixel `(x, y)` (top-left origin)
    ///
    /// Reads the target's entity ID attachment, which holds the 2D overlay
    /// and forward-shaded meshes. In deferred mode a miss falls back to the
    /// G-buffer's object ID attachment. Returns [`picking::NO_ENTITY`] for
    /// background pixels and coordinates outside the viewport.
    pub fn read_entity_id(&self, backend: &mut dyn RendererBackend, x: i32, y: i32) -> RenderResult<i32> {
        let target = self.target_framebuffer();
        let entity = match backend
            .framebuffer_specification(target)
            .and_then(|spec| spec.first_integer_attachment())
        {
            Some(attachment) => picking::read_entity_id(backend, target, attachment, x, y)?,
            None => {
                trace!("target has no entity ID attachment");
                picking::NO_ENTITY
            }
        };

        if entity == picking::NO_ENTITY && self.scene_info.is_deferred() {
            return picking::read_entity_id(
                backend,
                self.g_buffer,
                GBufferAttachment::ObjectId.index(),
                x,
                y,
            );
        }
        Ok(entity)
    }
}

fn read_all(pass: &mut crate::render::graph::PassBuilder, resources: &[Option<ResourceHandle>]) {
    for resource in resources.iter().flatten() {
        pass.read(*resource);
    }
}

fn resize_if_needed(
    backend: &mut dyn RendererBackend,
    framebuffer: FramebufferHandle,
    width: u32,
    height: u32,
) -> RenderResult<()> {
    match backend.framebuffer_specification(framebuffer) {
        Some(spec) if spec.width == width && spec.height == height => Ok(()),
        Some(_) => backend.resize_framebuffer(framebuffer, width, height),
        None => Err(RenderError::RenderingFailed(format!(
            "framebuffer {framebuffer:?} no longer exists"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessBackend;
    use crate::render::commands::RenderCmd;
    use crate::render::scene::lights::DirectionalLight;
    use crate::render::scene::mesh::PhongMaterial;
    use crate::render::scene::scene_info::{GBufferDebugMode, RenderMode};

    fn small_config() -> RendererConfig {
        let mut config = RendererConfig::default();
        config.viewport.width = 64;
        config.viewport.height = 64;
        config
    }

    fn setup() -> (HeadlessBackend, SceneRenderer, Arc<Mesh>) {
        let mut backend = HeadlessBackend::new();
        let renderer = SceneRenderer::new(&mut backend, &small_config()).unwrap();
        let cube = Arc::new(Mesh::cube(&mut backend).unwrap());
        (backend, renderer, cube)
    }

    fn camera() -> SceneCamera {
        SceneCamera::perspective(60.0_f32.to_radians(), 1.0, 0.1, 100.0).looking_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zeros(),
            Vec3::y(),
        )
    }

    fn render_cube(
        backend: &mut HeadlessBackend,
        renderer: &mut SceneRenderer,
        cube: &Arc<Mesh>,
        object_id: i32,
        draw_outline: bool,
    ) {
        renderer.begin_scene(&camera()).unwrap();
        renderer.submit_mesh(Some(cube), &[], &Mat4::identity(), object_id, draw_outline);
        renderer.end_scene(backend).unwrap();
    }

    #[test]
    fn test_default_deferred_order() {
        let (mut backend, mut renderer, cube) = setup();
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(
            renderer.graph().executed_passes(),
            ["GBufferPass", "LightingPass", "SkyboxPass"]
        );
        assert!(renderer.graph().last_error().is_none());
    }

    #[test]
    fn test_full_deferred_order() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.set_environment_light(EnvironmentLight {
            directional: Some(DirectionalLight::default()),
            ..Default::default()
        });
        renderer
            .update_scene_info(|info| {
                info.set_ssgi_enabled(true);
                info.set_gtao_enabled(true);
                info.enable_depth_view = true;
            })
            .unwrap();

        renderer.begin_scene(&camera()).unwrap();
        let glass = Arc::new(Material::Phong(PhongMaterial {
            diffuse: Vec4::new(1.0, 1.0, 1.0, 0.5),
            ..Default::default()
        }));
        renderer.submit_mesh(Some(&cube), &[], &Mat4::identity(), 1, true);
        renderer.submit_mesh(Some(&cube), &[Some(glass)], &Mat4::new_translation(&Vec3::x()), 2, false);
        renderer.end_scene(&mut backend).unwrap();

        assert_eq!(
            renderer.graph().executed_passes(),
            [
                "ShadowPass",
                "GBufferPass",
                "SSGIPass",
                "GTAOPass",
                "LightingPass",
                "TransparentPass",
                "OutlinePass",
                "SkyboxPass",
                "DepthViewPass",
            ]
        );
        assert!(renderer.graph().last_error().is_none());
    }

    #[test]
    fn test_debug_view_overrides_lighting() {
        let (mut backend, mut renderer, cube) = setup();
        renderer
            .update_scene_info(|info| {
                info.set_render_mode(RenderMode::Forward);
                info.set_gbuffer_debug(GBufferDebugMode::Normal);
                info.enable_depth_view = true;
            })
            .unwrap();
        assert!(renderer.scene_info().is_deferred());

        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(
            renderer.graph().executed_passes(),
            ["GBufferPass", "GBufferDebugPass"]
        );
    }

    #[test]
    fn test_forward_order() {
        let (mut backend, mut renderer, cube) = setup();
        renderer
            .update_scene_info(|info| {
                info.set_render_mode(RenderMode::Forward);
                info.enable_depth_view = true;
            })
            .unwrap();
        renderer.set_environment_light(EnvironmentLight {
            directional: Some(DirectionalLight::default()),
            ..Default::default()
        });

        render_cube(&mut backend, &mut renderer, &cube, 1, true);
        assert_eq!(
            renderer.graph().executed_passes(),
            ["ShadowPass", "ForwardPass", "OutlinePass", "SkyboxPass", "DepthViewPass"]
        );
        assert!(matches!(
            renderer.graph().passes()[2].payload(),
            ScenePass::OutlineAabb { .. }
        ));
        assert!(renderer.statistics().renderer2d.line_count >= 12);
    }

    #[test]
    fn test_skybox_without_environment_map_draws_nothing() {
        let (mut backend, mut renderer, _cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer.end_scene(&mut backend).unwrap();

        let stats = renderer.statistics().renderer3d;
        assert_eq!(stats.skybox_draw_calls, 0);
        assert_eq!(stats.geometry_draw_calls, 0);
        assert_eq!(stats.post_process_draw_calls, 0);
    }

    #[test]
    fn test_skybox_with_environment_map() {
        let (mut backend, mut renderer, _cube) = setup();
        let cubemap = backend
            .create_texture(&crate::render::api::TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        renderer.set_environment_map(Some(cubemap));
        renderer.begin_scene(&camera()).unwrap();
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.statistics().renderer3d.skybox_draw_calls, 1);
    }

    #[test]
    fn test_statistics_count_pass_draws() {
        let (mut backend, mut renderer, cube) = setup();
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        let stats = renderer.statistics().renderer3d;
        assert_eq!(stats.mesh_count, 1);
        assert_eq!(stats.geometry_draw_calls, 1);
        assert_eq!(stats.post_process_draw_calls, 1);

        renderer.reset_statistics();
        assert_eq!(renderer.statistics(), RenderStatistics::default());
    }

    #[test]
    fn test_culled_mesh_is_not_drawn() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer.submit_mesh(
            Some(&cube),
            &[],
            &Mat4::new_translation(&Vec3::new(0.0, 0.0, 50.0)),
            1,
            false,
        );
        assert!(!renderer.draw_list()[0].visible);
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.statistics().renderer3d.geometry_draw_calls, 0);
        assert!(renderer.draw_list().is_empty());
    }

    #[test]
    fn test_missing_mesh_and_material() {
        let (_backend, mut renderer, cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer.submit_mesh(None, &[], &Mat4::identity(), 1, false);
        assert!(renderer.draw_list().is_empty());

        renderer.submit_mesh(Some(&cube), &[None], &Mat4::identity(), 1, false);
        let draw = &renderer.draw_list()[0];
        assert_eq!(*draw.material, Material::default());
        assert!(!draw.transparent);
    }

    #[test]
    fn test_deferred_picking_reads_gbuffer() {
        let (mut backend, mut renderer, cube) = setup();
        render_cube(&mut backend, &mut renderer, &cube, 3, false);

        assert_eq!(renderer.read_entity_id(&mut backend, 32, 32).unwrap(), 3);
        assert_eq!(renderer.read_entity_id(&mut backend, 1, 1).unwrap(), picking::NO_ENTITY);
        assert_eq!(renderer.read_entity_id(&mut backend, 500, 1).unwrap(), picking::NO_ENTITY);
    }

    #[test]
    fn test_deferred_picking_prefers_overlay() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer.submit_mesh(Some(&cube), &[], &Mat4::identity(), 3, false);
        renderer.draw_sprite(
            &Mat4::new_translation(&Vec3::new(0.0, 0.0, 1.0)).prepend_scaling(0.2),
            &Vec4::repeat(1.0),
            None,
            1.0,
            11,
        );
        renderer.end_scene(&mut backend).unwrap();

        assert!(renderer.scene_info().is_deferred());
        assert_eq!(renderer.read_entity_id(&mut backend, 32, 32).unwrap(), 11);
        // Outside the sprite the mesh is still found through the G-buffer
        assert_eq!(renderer.read_entity_id(&mut backend, 26, 32).unwrap(), 3);
    }

    #[test]
    fn test_forward_picking_reads_target() {
        let (mut backend, mut renderer, cube) = setup();
        renderer
            .update_scene_info(|info| info.set_render_mode(RenderMode::Forward))
            .unwrap();
        render_cube(&mut backend, &mut renderer, &cube, 9, false);
        assert_eq!(renderer.read_entity_id(&mut backend, 32, 32).unwrap(), 9);
    }

    #[test]
    fn test_lifecycle_errors() {
        let (mut backend, mut renderer, _cube) = setup();
        assert!(matches!(
            renderer.end_scene(&mut backend),
            Err(RenderError::InvalidFrameState { .. })
        ));

        renderer.begin_scene(&camera()).unwrap();
        assert!(renderer.begin_scene(&camera()).is_err());
        assert!(matches!(
            renderer.update_scene_info(|info| info.enable_depth_view = true),
            Err(RenderError::FrameInProgress)
        ));
        assert!(renderer.end_overlay(&mut backend).is_err());
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.frame_state(), FrameState::Idle);
        assert!(renderer.update_scene_info(|info| info.enable_depth_view = true).is_ok());
    }

    #[test]
    fn test_overlay_frame_draws_aabb_only() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.begin_overlay(&camera()).unwrap();
        renderer.submit_mesh(Some(&cube), &[], &Mat4::identity(), 4, true);
        assert!(renderer.end_scene(&mut backend).is_err());
        renderer.end_overlay(&mut backend).unwrap();

        assert_eq!(renderer.statistics().renderer2d.line_count, 12);
        assert_eq!(renderer.statistics().renderer3d.total_draw_calls(), 0);
        assert!(renderer.draw_list().is_empty());
    }

    #[test]
    fn test_screen_space_outline_uniforms() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer.set_outline_ids(&[5, -1, 5]);
        renderer.submit_mesh(Some(&cube), &[], &Mat4::identity(), 2, true);
        renderer.end_scene(&mut backend).unwrap();

        let ids = backend
            .uniform(renderer.pipelines.outline, "u_OutlineIDs")
            .cloned();
        assert_eq!(ids, Some(crate::render::commands::UniformValue::IntArray(vec![5, 2])));
    }

    #[test]
    fn test_viewport_resize_applies_next_frame() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.set_viewport_size(0, 10);
        assert_eq!(renderer.viewport_size(), (64, 64));

        renderer.set_viewport_size(32, 16);
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        let target = backend
            .framebuffer_specification(renderer.target_framebuffer())
            .unwrap();
        assert_eq!((target.width, target.height), (32, 16));
        let g_buffer = backend.framebuffer_specification(renderer.g_buffer()).unwrap();
        assert_eq!((g_buffer.width, g_buffer.height), (32, 16));
    }

    #[test]
    fn test_debug_queue_replays_at_end_of_frame() {
        let (mut backend, mut renderer, _cube) = setup();
        renderer.begin_scene(&camera()).unwrap();
        renderer
            .debug_renderer_mut()
            .draw_line(Vec3::zeros(), Vec3::x(), Vec4::repeat(1.0));
        renderer.end_scene(&mut backend).unwrap();
        assert!(renderer.debug_renderer().is_empty());
        assert_eq!(renderer.statistics().renderer2d.line_count, 1);
    }

    #[test]
    fn test_ssgi_history_accumulates_for_static_camera() {
        let (mut backend, mut renderer, cube) = setup();
        renderer
            .update_scene_info(|info| info.set_ssgi_enabled(true))
            .unwrap();
        for _ in 0..3 {
            render_cube(&mut backend, &mut renderer, &cube, 1, false);
        }
        assert_eq!(renderer.ssgi_history().frame_index(), 3);

        renderer
            .update_scene_info(|info| info.set_ssgi_enabled(false))
            .unwrap();
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(renderer.ssgi_history().frame_index(), 0);
    }

    #[test]
    fn test_lighting_binds_shadow_map() {
        let (mut backend, mut renderer, cube) = setup();
        renderer.set_environment_light(EnvironmentLight {
            directional: Some(DirectionalLight::default()),
            ..Default::default()
        });
        render_cube(&mut backend, &mut renderer, &cube, 1, false);

        assert_eq!(
            backend.uniform(renderer.pipelines.lighting, "u_EnableShadows"),
            Some(&crate::render::commands::UniformValue::Bool(true))
        );
        assert!(backend.submitted().iter().any(|cmd| matches!(
            cmd,
            RenderCmd::BindDepthAttachment { slot: 10, .. }
        )));
    }

    #[test]
    fn test_ibl_maps_are_precomputed_once() {
        let (mut backend, mut renderer, cube) = setup();
        let environment = backend
            .create_texture(&crate::render::api::TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        renderer.set_environment_map(Some(environment));

        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(renderer.statistics().renderer3d.ibl_draw_calls, 37);
        assert_eq!(
            backend.uniform(renderer.pipelines.lighting, "u_UseIBL"),
            Some(&crate::render::commands::UniformValue::Bool(true))
        );
        assert_eq!(
            backend.uniform(renderer.pipelines.lighting, "u_PrefilterMap"),
            Some(&crate::render::commands::UniformValue::Int(12))
        );

        renderer.reset_statistics();
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(renderer.statistics().renderer3d.ibl_draw_calls, 0);

        let other = backend
            .create_texture(&crate::render::api::TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        renderer.set_environment_map(Some(other));
        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(renderer.statistics().renderer3d.ibl_draw_calls, 37);
    }

    #[test]
    fn test_ibl_disabled_skips_precompute() {
        let mut config = small_config();
        config.scene.environment.use_ibl = false;
        let mut backend = HeadlessBackend::new();
        let mut renderer = SceneRenderer::new(&mut backend, &config).unwrap();
        let cube = Arc::new(Mesh::cube(&mut backend).unwrap());
        let environment = backend
            .create_texture(&crate::render::api::TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        renderer.set_environment_map(Some(environment));

        render_cube(&mut backend, &mut renderer, &cube, 1, false);
        assert_eq!(renderer.statistics().renderer3d.ibl_draw_calls, 0);
        assert_eq!(
            backend.uniform(renderer.pipelines.lighting, "u_UseIBL"),
            Some(&crate::render::commands::UniformValue::Bool(false))
        );
    }
}
