//! Scene pass payloads and the recorder that turns them into commands
//!
//! The scene renderer adds one [`ScenePass`] per scheduled pass to the render
//! graph. When the graph executes, [`PassRecorder::record`] receives each
//! payload with a fresh command buffer and records the binds, uniforms and
//! draws of that pass. Recording never touches the backend.

use bytemuck::{Pod, Zeroable};
use log::trace;

use super::draw_command::{MeshDrawCommand, SkyboxDrawCommand};
use super::history::SsgiFrame;
use super::ibl::IblMaps;
use super::lights::EnvironmentLight;
use super::mesh::{MaterialType, Mesh};
use super::scene_info::{GBufferAttachment, GBufferDebugMode, SceneInfo};
use super::statistics::Renderer3DStatistics;
use crate::foundation::math::{Mat4, Vec4};
use crate::render::api::{
    BackendResult, BlendMode, BlitMask, BufferLayout, CompareOp, CullMode, FramebufferHandle,
    IndexBufferHandle, PipelineHandle, PipelineSpecification, RendererBackend, ShaderDataType,
    VertexArrayHandle, VertexBufferHandle,
};
use crate::render::camera::SceneCamera;
use crate::render::commands::{CommandBuffer, RenderCmd, UniformValue};
use crate::render::graph::{PassContext, ResourceHandle};
use crate::render::renderer2d::Renderer2D;

/// Entity IDs the screen-space outline shader compares against
pub const MAX_OUTLINE_IDS: usize = 32;

/// Sampler slot of the shadow map in lit shaders
pub const SHADOW_MAP_SLOT: u32 = 10;

/// Statistics bucket a pass's draws are counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCategory {
    /// Mesh draws
    Geometry,
    /// Shadow map draws
    Shadow,
    /// Skybox draws
    Skybox,
    /// Full-screen passes
    PostProcess,
    /// 2D lines; counted by the 2D renderer
    Overlay,
}

/// A write to the frame's target framebuffer
///
/// Every pass writing the target gets its own versioned resource so each
/// version has a single producer. The first version clears the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWrite {
    /// Versioned target resource
    pub resource: ResourceHandle,
    /// Clear colour, depth and entity IDs before drawing
    pub clear: bool,
}

/// What one scene pass draws
#[derive(Debug, Clone, PartialEq)]
pub enum ScenePass {
    /// Opaque meshes into the directional shadow map
    Shadow {
        /// Shadow depth target
        shadow_map: ResourceHandle,
    },
    /// Opaque visible meshes into the G-buffer
    GBuffer {
        /// G-buffer target
        g_buffer: ResourceHandle,
        /// Receives a copy of the G-buffer depth
        scene_depth: ResourceHandle,
    },
    /// Screen-space global illumination
    Ssgi {
        /// G-buffer input
        g_buffer: ResourceHandle,
        /// Depth input
        scene_depth: ResourceHandle,
        /// Ping-pong framebuffers and tunables
        frame: SsgiFrame,
    },
    /// Ground-truth ambient occlusion
    Gtao {
        /// G-buffer input
        g_buffer: ResourceHandle,
        /// Depth input
        scene_depth: ResourceHandle,
        /// Occlusion target
        output: ResourceHandle,
    },
    /// Deferred lighting resolve into the target
    Lighting {
        /// G-buffer input
        g_buffer: ResourceHandle,
        /// Target version
        target: TargetWrite,
        /// Shadow map, when shadows are on
        shadow_map: Option<ResourceHandle>,
        /// SSGI result, when used
        ssgi: Option<FramebufferHandle>,
        /// GTAO result, when used
        gtao: Option<ResourceHandle>,
    },
    /// Lit opaque then transparent meshes straight into the target
    Forward {
        /// Target version
        target: TargetWrite,
        /// Receives a copy of the target depth
        scene_depth: ResourceHandle,
        /// Shadow map, when shadows are on
        shadow_map: Option<ResourceHandle>,
    },
    /// Blended transparent meshes on top of the deferred result
    Transparent {
        /// Target version
        target: TargetWrite,
        /// Shadow map, when shadows are on
        shadow_map: Option<ResourceHandle>,
    },
    /// Screen-space outline of selected entity IDs
    Outline {
        /// G-buffer input
        g_buffer: ResourceHandle,
        /// Target version
        target: TargetWrite,
        /// Entity IDs to outline
        ids: Vec<i32>,
    },
    /// AABB line outline of selected meshes
    OutlineAabb {
        /// Target version
        target: TargetWrite,
    },
    /// Environment cube behind the scene
    Skybox {
        /// Target version
        target: TargetWrite,
        /// Cube to draw; `None` without an environment map
        skybox: Option<SkyboxDrawCommand>,
    },
    /// Full-screen G-buffer visualisation
    GBufferDebug {
        /// G-buffer input
        g_buffer: ResourceHandle,
        /// Depth input
        scene_depth: ResourceHandle,
        /// Target version
        target: TargetWrite,
        /// Channel to show
        mode: GBufferDebugMode,
        /// SSGI result, when used
        ssgi: Option<FramebufferHandle>,
        /// GTAO result, when used
        gtao: Option<ResourceHandle>,
    },
    /// Full-screen linearised depth
    DepthView {
        /// Depth input
        scene_depth: ResourceHandle,
        /// Target version
        target: TargetWrite,
    },
}

impl ScenePass {
    /// Statistics bucket of this pass
    pub const fn category(&self) -> DrawCategory {
        match self {
            Self::Shadow { .. } => DrawCategory::Shadow,
            Self::GBuffer { .. } | Self::Forward { .. } | Self::Transparent { .. } => {
                DrawCategory::Geometry
            }
            Self::Skybox { .. } => DrawCategory::Skybox,
            Self::OutlineAabb { .. } => DrawCategory::Overlay,
            Self::Ssgi { .. }
            | Self::Gtao { .. }
            | Self::Lighting { .. }
            | Self::Outline { .. }
            | Self::GBufferDebug { .. }
            | Self::DepthView { .. } => DrawCategory::PostProcess,
        }
    }
}

/// Entity IDs to outline: explicit IDs, then visible flagged meshes
///
/// Negative IDs are dropped, duplicates removed and the list is capped at
/// [`MAX_OUTLINE_IDS`].
pub fn outline_ids(explicit: &[i32], draws: &[MeshDrawCommand]) -> Vec<i32> {
    let flagged = draws
        .iter()
        .filter(|draw| draw.draw_outline && draw.visible)
        .map(|draw| draw.object_id);

    let mut ids = Vec::new();
    for id in explicit.iter().copied().chain(flagged) {
        if id >= 0 && !ids.contains(&id) {
            ids.push(id);
            if ids.len() == MAX_OUTLINE_IDS {
                break;
            }
        }
    }
    ids
}

/// Pipelines used by the scene passes
#[derive(Debug, Clone, Copy)]
pub struct ScenePipelines {
    /// Depth-only shadow caster
    pub shadow: PipelineHandle,
    /// Phong G-buffer fill
    pub gbuffer: PipelineHandle,
    /// PBR G-buffer fill
    pub gbuffer_pbr: PipelineHandle,
    /// Forward Phong
    pub mesh: PipelineHandle,
    /// Forward PBR
    pub pbr_mesh: PipelineHandle,
    /// Deferred lighting resolve
    pub lighting: PipelineHandle,
    /// SSGI
    pub ssgi: PipelineHandle,
    /// GTAO
    pub gtao: PipelineHandle,
    /// Screen-space outline
    pub outline: PipelineHandle,
    /// Environment cube
    pub skybox: PipelineHandle,
    /// G-buffer visualisation
    pub gbuffer_debug: PipelineHandle,
    /// Depth visualisation
    pub depth_view: PipelineHandle,
}

impl ScenePipelines {
    /// Compile every scene pipeline
    pub fn create(backend: &mut dyn RendererBackend) -> BackendResult<Self> {
        let geometry = |shader: &str| {
            PipelineSpecification::new(shader)
                .with_depth(true, CompareOp::Less)
                .with_cull(CullMode::Back)
                .with_object_id()
        };

        Ok(Self {
            shadow: backend.create_pipeline(
                &PipelineSpecification::new("ShadowMap").with_cull(CullMode::Front),
            )?,
            gbuffer: backend.create_pipeline(&geometry("GBuffer"))?,
            gbuffer_pbr: backend.create_pipeline(&geometry("GBufferPBR"))?,
            mesh: backend.create_pipeline(&geometry("Mesh"))?,
            pbr_mesh: backend.create_pipeline(&geometry("PBRMesh"))?,
            lighting: backend.create_pipeline(&PipelineSpecification::fullscreen("DeferredLighting"))?,
            ssgi: backend.create_pipeline(&PipelineSpecification::fullscreen("SSGI"))?,
            gtao: backend.create_pipeline(&PipelineSpecification::fullscreen("GTAO"))?,
            outline: backend.create_pipeline(
                &PipelineSpecification::fullscreen("OutlinePost").with_blend(BlendMode::Alpha),
            )?,
            skybox: backend.create_pipeline(
                &PipelineSpecification::new("Skybox").with_depth(false, CompareOp::LessEqual),
            )?,
            gbuffer_debug: backend.create_pipeline(&PipelineSpecification::fullscreen("GBufferDebug"))?,
            depth_view: backend.create_pipeline(&PipelineSpecification::fullscreen("DepthView"))?,
        })
    }

    /// Destroy every pipeline
    pub fn destroy(&self, backend: &mut dyn RendererBackend) {
        for pipeline in [
            self.shadow,
            self.gbuffer,
            self.gbuffer_pbr,
            self.mesh,
            self.pbr_mesh,
            self.lighting,
            self.ssgi,
            self.gtao,
            self.outline,
            self.skybox,
            self.gbuffer_debug,
            self.depth_view,
        ] {
            backend.destroy_pipeline(pipeline);
        }
    }

    /// Mesh pipeline for a material on the deferred or forward path
    pub const fn mesh_pipeline(&self, material: MaterialType, deferred: bool) -> PipelineHandle {
        match (material, deferred) {
            (MaterialType::Phong, true) => self.gbuffer,
            (MaterialType::Pbr, true) => self.gbuffer_pbr,
            (MaterialType::Phong, false) => self.mesh,
            (MaterialType::Pbr, false) => self.pbr_mesh,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
struct FullscreenVertex {
    position: [f32; 3],
    tex_coord: [f32; 2],
}

/// Index count of the full-screen quad
pub const FULLSCREEN_INDEX_COUNT: u32 = 6;

/// Shared geometry of the full-screen passes and the skybox
#[derive(Debug)]
pub struct SceneGeometry {
    fullscreen_vertices: VertexBufferHandle,
    fullscreen_indices: IndexBufferHandle,
    fullscreen: VertexArrayHandle,
    skybox: Mesh,
}

impl SceneGeometry {
    /// Upload the full-screen quad and the skybox cube
    pub fn create(backend: &mut dyn RendererBackend) -> BackendResult<Self> {
        let vertices = [
            FullscreenVertex { position: [-1.0, -1.0, 0.0], tex_coord: [0.0, 0.0] },
            FullscreenVertex { position: [1.0, -1.0, 0.0], tex_coord: [1.0, 0.0] },
            FullscreenVertex { position: [1.0, 1.0, 0.0], tex_coord: [1.0, 1.0] },
            FullscreenVertex { position: [-1.0, 1.0, 0.0], tex_coord: [0.0, 1.0] },
        ];
        let layout = BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float2, "a_TexCoord"),
        ]);
        let fullscreen_vertices =
            backend.create_vertex_buffer_with_data(bytemuck::cast_slice(&vertices), layout)?;
        let fullscreen_indices = backend.create_index_buffer(&[0, 1, 2, 2, 3, 0])?;
        let fullscreen =
            backend.create_vertex_array(&[fullscreen_vertices], Some(fullscreen_indices))?;

        Ok(Self {
            fullscreen_vertices,
            fullscreen_indices,
            fullscreen,
            skybox: Mesh::cube(backend)?,
        })
    }

    /// Release the buffers
    pub fn destroy(&self, backend: &mut dyn RendererBackend) {
        backend.destroy_vertex_array(self.fullscreen);
        backend.destroy_vertex_buffer(self.fullscreen_vertices);
        backend.destroy_index_buffer(self.fullscreen_indices);
        self.skybox.destroy(backend);
    }

    /// Full-screen quad
    pub const fn fullscreen(&self) -> VertexArrayHandle {
        self.fullscreen
    }

    /// Skybox cube
    pub const fn skybox(&self) -> &Mesh {
        &self.skybox
    }
}

/// Everything the pass recorder reads while the graph executes
pub struct PassRecorder<'a> {
    /// Settings of this frame
    pub info: &'a SceneInfo,
    /// Camera of this frame
    pub camera: &'a SceneCamera,
    /// Meshes submitted this frame
    pub draws: &'a [MeshDrawCommand],
    /// Lights of this frame
    pub lights: &'a EnvironmentLight,
    /// Scene pipelines
    pub pipelines: &'a ScenePipelines,
    /// Full-screen quad and skybox cube
    pub geometry: &'a SceneGeometry,
    /// G-buffer framebuffer
    pub g_buffer: FramebufferHandle,
    /// Entity ID attachment of the target, if it has one
    pub target_id_attachment: Option<usize>,
    /// World to shadow-map clip space
    pub light_space: Mat4,
    /// Image-based lighting maps, when IBL is active
    pub ibl: Option<&'a IblMaps>,
    /// Receives the AABB outline lines
    pub renderer2d: &'a mut Renderer2D,
    /// Draw counters
    pub stats: &'a mut Renderer3DStatistics,
}

impl PassRecorder<'_> {
    /// Record `pass` into `cmd` and count its draws
    pub fn record(&mut self, pass: &ScenePass, ctx: &PassContext<'_>, cmd: &mut CommandBuffer) {
        match pass {
            ScenePass::Shadow { shadow_map } => self.record_shadow(ctx, cmd, *shadow_map),
            ScenePass::GBuffer {
                g_buffer,
                scene_depth,
            } => self.record_gbuffer(ctx, cmd, *g_buffer, *scene_depth),
            ScenePass::Ssgi { frame, .. } => self.record_ssgi(cmd, frame),
            ScenePass::Gtao {
                scene_depth,
                output,
                ..
            } => self.record_gtao(ctx, cmd, *scene_depth, *output),
            ScenePass::Lighting {
                target,
                shadow_map,
                ssgi,
                gtao,
                ..
            } => self.record_lighting(ctx, cmd, target, *shadow_map, *ssgi, *gtao),
            ScenePass::Forward {
                target,
                scene_depth,
                shadow_map,
            } => self.record_forward(ctx, cmd, target, *scene_depth, *shadow_map),
            ScenePass::Transparent { target, shadow_map } => {
                if self.bind_target(ctx, cmd, target).is_some() {
                    cmd.record(RenderCmd::SetBlendEnabled(true));
                    cmd.record(RenderCmd::UpdateCamera(self.camera.uniform()));
                    self.record_meshes(ctx, cmd, false, true, *shadow_map);
                }
            }
            ScenePass::Outline { target, ids, .. } => self.record_outline(ctx, cmd, target, ids),
            ScenePass::OutlineAabb { target } => {
                if self.bind_target(ctx, cmd, target).is_some() {
                    self.renderer2d
                        .record_outline_pass(cmd, self.draws, &self.info.mesh_outline_color);
                }
            }
            ScenePass::Skybox { target, skybox } => self.record_skybox(ctx, cmd, target, skybox.as_ref()),
            ScenePass::GBufferDebug {
                scene_depth,
                target,
                mode,
                ssgi,
                gtao,
                ..
            } => self.record_gbuffer_debug(ctx, cmd, target, *scene_depth, *mode, *ssgi, *gtao),
            ScenePass::DepthView {
                scene_depth,
                target,
            } => self.record_depth_view(ctx, cmd, target, *scene_depth),
        }

        let draws = cmd.draw_count();
        match pass.category() {
            DrawCategory::Geometry => self.stats.geometry_draw_calls += draws,
            DrawCategory::Shadow => self.stats.shadow_draw_calls += draws,
            DrawCategory::Skybox => self.stats.skybox_draw_calls += draws,
            DrawCategory::PostProcess => self.stats.post_process_draw_calls += draws,
            DrawCategory::Overlay => {}
        }
    }

    fn bind_target(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
    ) -> Option<FramebufferHandle> {
        let framebuffer = resolve(ctx, target.resource)?;
        cmd.record(RenderCmd::BindFramebuffer(framebuffer));
        if target.clear {
            cmd.record(RenderCmd::SetClearColor(Vec4::new(0.1, 0.1, 0.1, 1.0)));
            cmd.record(RenderCmd::Clear);
            if let Some(attachment) = self.target_id_attachment {
                cmd.record(RenderCmd::ClearAttachment {
                    attachment,
                    value: -1,
                });
            }
        }
        Some(framebuffer)
    }

    /// Whether the G-buffer receives any geometry this frame
    fn has_opaque_geometry(&self) -> bool {
        self.draws.iter().any(|draw| draw.visible && !draw.transparent)
    }

    /// Full-screen draw of a pass that resolves G-buffer contents
    ///
    /// Skipped when no opaque mesh reached the G-buffer.
    fn draw_gbuffer_resolve(&self, cmd: &mut CommandBuffer, pass: &str) {
        if self.has_opaque_geometry() {
            self.draw_fullscreen(cmd);
        } else {
            trace!("{pass} skipped: no opaque geometry");
        }
    }

    fn draw_fullscreen(&self, cmd: &mut CommandBuffer) {
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: self.geometry.fullscreen(),
            index_count: FULLSCREEN_INDEX_COUNT,
            first_index: 0,
        });
    }

    fn record_shadow(&self, ctx: &PassContext<'_>, cmd: &mut CommandBuffer, shadow_map: ResourceHandle) {
        let Some(framebuffer) = resolve(ctx, shadow_map) else {
            return;
        };
        cmd.record(RenderCmd::BindFramebuffer(framebuffer));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.shadow));
        cmd.record(RenderCmd::uniform(
            "u_LightSpaceMatrix",
            UniformValue::Mat4(self.light_space),
        ));
        for draw in self.draws.iter().filter(|draw| !draw.transparent) {
            cmd.record(RenderCmd::uniform("u_Model", UniformValue::Mat4(draw.transform)));
            cmd.record(draw_mesh(draw));
        }
    }

    fn record_gbuffer(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        g_buffer: ResourceHandle,
        scene_depth: ResourceHandle,
    ) {
        let Some(framebuffer) = resolve(ctx, g_buffer) else {
            return;
        };
        cmd.record(RenderCmd::BindFramebuffer(framebuffer));
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::SetClearColor(Vec4::new(0.0, 0.0, 0.0, 0.0)));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::ClearAttachment {
            attachment: GBufferAttachment::ObjectId.index(),
            value: -1,
        });
        cmd.record(RenderCmd::UpdateCamera(self.camera.uniform()));

        self.record_meshes(ctx, cmd, true, false, None);

        if let Some(depth) = resolve(ctx, scene_depth) {
            cmd.record(RenderCmd::BlitFramebuffer {
                source: framebuffer,
                destination: depth,
                mask: BlitMask::DEPTH,
            });
        }
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    /// Visible meshes whose transparency matches `transparent`
    fn record_meshes(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        deferred: bool,
        transparent: bool,
        shadow_map: Option<ResourceHandle>,
    ) {
        let view_projection = self.camera.view_projection();
        let mut bound = None;

        for draw in self
            .draws
            .iter()
            .filter(|draw| draw.visible && draw.transparent == transparent)
        {
            let material_type = draw.material.material_type();
            let pipeline = self.pipelines.mesh_pipeline(material_type, deferred);
            if bound != Some(pipeline) {
                cmd.record(RenderCmd::BindPipeline(pipeline));
                cmd.record(RenderCmd::uniform(
                    "u_ViewProjection",
                    UniformValue::Mat4(view_projection),
                ));
                if material_type == MaterialType::Pbr {
                    let environment = &self.info.environment;
                    cmd.record(RenderCmd::uniform(
                        "u_NormalStrength",
                        UniformValue::Float(environment.normal_map_strength),
                    ));
                    cmd.record(RenderCmd::uniform(
                        "u_ToksvigStrength",
                        UniformValue::Float(environment.toksvig_strength),
                    ));
                }
                if !deferred {
                    self.record_scene_lighting(ctx, cmd, shadow_map);
                }
                bound = Some(pipeline);
            }

            cmd.record(RenderCmd::uniform("u_Model", UniformValue::Mat4(draw.transform)));
            cmd.record(RenderCmd::uniform("u_ObjectID", UniformValue::Int(draw.object_id)));
            draw.material.record_uniforms(cmd);
            cmd.record(draw_mesh(draw));
        }
    }

    /// Camera, ambient, shadow and light uniforms of the lit shaders
    fn record_scene_lighting(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        shadow_map: Option<ResourceHandle>,
    ) {
        let environment = &self.info.environment;
        cmd.record(RenderCmd::uniform(
            "u_CameraPosition",
            UniformValue::Float3(self.camera.position()),
        ));
        cmd.record(RenderCmd::uniform(
            "u_AmbientIntensity",
            UniformValue::Float(environment.ambient_intensity),
        ));

        let ibl = self.ibl.filter(|_| environment.use_ibl);
        cmd.record(RenderCmd::uniform("u_UseIBL", UniformValue::Bool(ibl.is_some())));
        if let Some(maps) = ibl {
            maps.record_bindings(cmd);
        }

        let shadow = shadow_map.and_then(|resource| resolve(ctx, resource));
        cmd.record(RenderCmd::uniform(
            "u_EnableShadows",
            UniformValue::Bool(shadow.is_some()),
        ));
        if let Some(framebuffer) = shadow {
            cmd.record(RenderCmd::uniform(
                "u_LightSpaceMatrix",
                UniformValue::Mat4(self.light_space),
            ));
            cmd.record(RenderCmd::uniform(
                "u_ShadowBias",
                UniformValue::Float(environment.shadow_bias),
            ));
            cmd.record(RenderCmd::uniform(
                "u_ShadowSoftness",
                UniformValue::Float(environment.shadow_softness),
            ));
            cmd.record(RenderCmd::BindDepthAttachment {
                slot: SHADOW_MAP_SLOT,
                framebuffer,
            });
            cmd.record(RenderCmd::uniform(
                "u_ShadowMap",
                UniformValue::Int(SHADOW_MAP_SLOT as i32),
            ));
        }

        self.lights.record_uniforms(cmd);
    }

    fn record_ssgi(&self, cmd: &mut CommandBuffer, frame: &SsgiFrame) {
        let view_projection = self.camera.view_projection();
        let inverse = view_projection.try_inverse().unwrap_or_else(Mat4::identity);

        cmd.record(RenderCmd::BindFramebuffer(frame.current));
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::SetClearColor(Vec4::new(0.0, 0.0, 0.0, 1.0)));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.ssgi));
        self.bind_gbuffer_color(cmd, 0, GBufferAttachment::Albedo, "u_GBufferAlbedo");
        self.bind_gbuffer_color(cmd, 1, GBufferAttachment::Normal, "u_GBufferNormal");
        cmd.record(RenderCmd::BindDepthAttachment {
            slot: 2,
            framebuffer: self.g_buffer,
        });
        cmd.record(RenderCmd::uniform("u_GBufferDepth", UniformValue::Int(2)));
        cmd.record(RenderCmd::BindColorAttachment {
            slot: 3,
            framebuffer: frame.history,
            attachment: 0,
        });
        cmd.record(RenderCmd::uniform("u_SSGIHistory", UniformValue::Int(3)));

        cmd.record(RenderCmd::uniform("u_ViewProjection", UniformValue::Mat4(view_projection)));
        cmd.record(RenderCmd::uniform("u_InverseViewProjection", UniformValue::Mat4(inverse)));
        cmd.record(RenderCmd::uniform("u_SSGISampleCount", UniformValue::Int(frame.sample_count)));
        cmd.record(RenderCmd::uniform("u_SSGIRadius", UniformValue::Float(frame.params.radius)));
        cmd.record(RenderCmd::uniform("u_SSGIBias", UniformValue::Float(frame.params.bias)));
        cmd.record(RenderCmd::uniform(
            "u_SSGIIntensity",
            UniformValue::Float(frame.params.intensity),
        ));
        cmd.record(RenderCmd::uniform(
            "u_FrameIndex",
            UniformValue::Int(i32::try_from(frame.frame_index).unwrap_or(i32::MAX)),
        ));
        self.draw_gbuffer_resolve(cmd, "SSGI");
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    fn record_gtao(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        scene_depth: ResourceHandle,
        output: ResourceHandle,
    ) {
        let (Some(framebuffer), Some(depth)) = (resolve(ctx, output), resolve(ctx, scene_depth)) else {
            return;
        };
        let projection = self.camera.camera.projection;
        let gtao = &self.info.gtao;

        cmd.record(RenderCmd::BindFramebuffer(framebuffer));
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::SetClearColor(Vec4::new(1.0, 1.0, 1.0, 1.0)));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.gtao));
        self.bind_gbuffer_color(cmd, 0, GBufferAttachment::Normal, "u_GBufferNormal");
        cmd.record(RenderCmd::BindDepthAttachment {
            slot: 1,
            framebuffer: depth,
        });
        cmd.record(RenderCmd::uniform("u_GBufferDepth", UniformValue::Int(1)));

        cmd.record(RenderCmd::uniform("u_Projection", UniformValue::Mat4(projection)));
        cmd.record(RenderCmd::uniform(
            "u_InverseProjection",
            UniformValue::Mat4(projection.try_inverse().unwrap_or_else(Mat4::identity)),
        ));
        cmd.record(RenderCmd::uniform("u_View", UniformValue::Mat4(self.camera.view)));
        cmd.record(RenderCmd::uniform("u_GTAORadius", UniformValue::Float(gtao.radius)));
        cmd.record(RenderCmd::uniform("u_GTAOBias", UniformValue::Float(gtao.bias)));
        cmd.record(RenderCmd::uniform("u_GTAOPower", UniformValue::Float(gtao.power)));
        cmd.record(RenderCmd::uniform("u_GTAOIntensity", UniformValue::Float(gtao.intensity)));
        cmd.record(RenderCmd::uniform(
            "u_GTAOSliceCount",
            UniformValue::Int(gtao.clamped_slice_count()),
        ));
        cmd.record(RenderCmd::uniform(
            "u_GTAOStepCount",
            UniformValue::Int(gtao.clamped_step_count()),
        ));
        self.draw_gbuffer_resolve(cmd, "GTAO");
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    fn record_lighting(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        shadow_map: Option<ResourceHandle>,
        ssgi: Option<FramebufferHandle>,
        gtao: Option<ResourceHandle>,
    ) {
        let Some(framebuffer) = self.bind_target(ctx, cmd, target) else {
            return;
        };
        cmd.record(RenderCmd::BlitFramebuffer {
            source: self.g_buffer,
            destination: framebuffer,
            mask: BlitMask::DEPTH,
        });
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::BindPipeline(self.pipelines.lighting));

        self.bind_gbuffer_color(cmd, 0, GBufferAttachment::Albedo, "u_GBufferAlbedo");
        self.bind_gbuffer_color(cmd, 1, GBufferAttachment::Normal, "u_GBufferNormal");
        self.bind_gbuffer_color(cmd, 2, GBufferAttachment::Material, "u_GBufferMaterial");
        self.bind_gbuffer_color(cmd, 3, GBufferAttachment::Emissive, "u_GBufferEmissive");
        cmd.record(RenderCmd::BindDepthAttachment {
            slot: 4,
            framebuffer: self.g_buffer,
        });
        cmd.record(RenderCmd::uniform("u_GBufferDepth", UniformValue::Int(4)));

        cmd.record(RenderCmd::uniform("u_EnableSSGI", UniformValue::Bool(ssgi.is_some())));
        if let Some(ssgi) = ssgi {
            cmd.record(RenderCmd::BindColorAttachment {
                slot: 5,
                framebuffer: ssgi,
                attachment: 0,
            });
            cmd.record(RenderCmd::uniform("u_SSGI", UniformValue::Int(5)));
        }

        let gtao = gtao.and_then(|resource| resolve(ctx, resource));
        cmd.record(RenderCmd::uniform("u_EnableGTAO", UniformValue::Bool(gtao.is_some())));
        if let Some(gtao) = gtao {
            cmd.record(RenderCmd::BindColorAttachment {
                slot: 6,
                framebuffer: gtao,
                attachment: 0,
            });
            cmd.record(RenderCmd::uniform("u_GTAO", UniformValue::Int(6)));
        }

        let inverse = self
            .camera
            .view_projection()
            .try_inverse()
            .unwrap_or_else(Mat4::identity);
        cmd.record(RenderCmd::uniform("u_InverseViewProjection", UniformValue::Mat4(inverse)));
        self.record_scene_lighting(ctx, cmd, shadow_map);

        self.draw_gbuffer_resolve(cmd, "lighting");
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    fn record_forward(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        scene_depth: ResourceHandle,
        shadow_map: Option<ResourceHandle>,
    ) {
        let Some(framebuffer) = self.bind_target(ctx, cmd, target) else {
            return;
        };
        cmd.record(RenderCmd::UpdateCamera(self.camera.uniform()));

        cmd.record(RenderCmd::SetBlendEnabled(false));
        self.record_meshes(ctx, cmd, false, false, shadow_map);
        cmd.record(RenderCmd::SetBlendEnabled(true));
        self.record_meshes(ctx, cmd, false, true, shadow_map);

        if let Some(depth) = resolve(ctx, scene_depth) {
            cmd.record(RenderCmd::BlitFramebuffer {
                source: framebuffer,
                destination: depth,
                mask: BlitMask::DEPTH,
            });
        }
    }

    fn record_outline(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        ids: &[i32],
    ) {
        if ids.is_empty() || self.bind_target(ctx, cmd, target).is_none() {
            return;
        }
        let info = self.info;

        cmd.record(RenderCmd::SetBlendEnabled(true));
        cmd.record(RenderCmd::BindPipeline(self.pipelines.outline));
        self.bind_gbuffer_color(cmd, 0, GBufferAttachment::Normal, "u_GBufferNormal");
        cmd.record(RenderCmd::BindDepthAttachment {
            slot: 1,
            framebuffer: self.g_buffer,
        });
        cmd.record(RenderCmd::uniform("u_GBufferDepth", UniformValue::Int(1)));
        self.bind_gbuffer_color(cmd, 2, GBufferAttachment::ObjectId, "u_GBufferObjectID");

        cmd.record(RenderCmd::uniform(
            "u_OutlineColor",
            UniformValue::Float4(info.mesh_outline_color),
        ));
        cmd.record(RenderCmd::uniform(
            "u_OutlineIDCount",
            UniformValue::Int(i32::try_from(ids.len()).unwrap_or(i32::MAX)),
        ));
        cmd.record(RenderCmd::uniform("u_OutlineIDs", UniformValue::IntArray(ids.to_vec())));
        cmd.record(RenderCmd::uniform("u_Near", UniformValue::Float(self.camera.near)));
        cmd.record(RenderCmd::uniform("u_Far", UniformValue::Float(self.camera.far)));
        cmd.record(RenderCmd::uniform(
            "u_DepthThreshold",
            UniformValue::Float(info.outline_depth_threshold),
        ));
        cmd.record(RenderCmd::uniform(
            "u_NormalThreshold",
            UniformValue::Float(info.outline_normal_threshold),
        ));
        cmd.record(RenderCmd::uniform(
            "u_Thickness",
            UniformValue::Float(info.outline_thickness),
        ));
        self.draw_fullscreen(cmd);
    }

    fn record_skybox(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        skybox: Option<&SkyboxDrawCommand>,
    ) {
        let Some(skybox) = skybox else {
            trace!("skybox pass without environment map");
            return;
        };
        if self.bind_target(ctx, cmd, target).is_none() {
            return;
        }
        cmd.record(RenderCmd::BindPipeline(self.pipelines.skybox));
        cmd.record(RenderCmd::BindTexture {
            slot: 0,
            texture: skybox.cubemap,
        });
        cmd.record(RenderCmd::uniform("u_Skybox", UniformValue::Int(0)));
        cmd.record(RenderCmd::uniform("u_View", UniformValue::Mat4(skybox.view)));
        cmd.record(RenderCmd::uniform("u_Projection", UniformValue::Mat4(skybox.projection)));
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: skybox.vertex_array,
            index_count: skybox.index_count,
            first_index: 0,
        });
    }

    fn record_gbuffer_debug(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        scene_depth: ResourceHandle,
        mode: GBufferDebugMode,
        ssgi: Option<FramebufferHandle>,
        gtao: Option<ResourceHandle>,
    ) {
        if self.bind_target(ctx, cmd, target).is_none() {
            return;
        }
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::BindPipeline(self.pipelines.gbuffer_debug));
        self.bind_gbuffer_color(cmd, 0, GBufferAttachment::Albedo, "u_GBufferAlbedo");
        self.bind_gbuffer_color(cmd, 1, GBufferAttachment::Normal, "u_GBufferNormal");
        self.bind_gbuffer_color(cmd, 2, GBufferAttachment::Material, "u_GBufferMaterial");
        self.bind_gbuffer_color(cmd, 3, GBufferAttachment::Emissive, "u_GBufferEmissive");
        if let Some(depth) = resolve(ctx, scene_depth) {
            cmd.record(RenderCmd::BindDepthAttachment {
                slot: 4,
                framebuffer: depth,
            });
            cmd.record(RenderCmd::uniform("u_GBufferDepth", UniformValue::Int(4)));
        }
        self.bind_gbuffer_color(cmd, 5, GBufferAttachment::ObjectId, "u_GBufferObjectID");
        if let Some(ssgi) = ssgi {
            cmd.record(RenderCmd::BindColorAttachment {
                slot: 6,
                framebuffer: ssgi,
                attachment: 0,
            });
            cmd.record(RenderCmd::uniform("u_SSGI", UniformValue::Int(6)));
        }
        if let Some(gtao) = gtao.and_then(|resource| resolve(ctx, resource)) {
            cmd.record(RenderCmd::BindColorAttachment {
                slot: 7,
                framebuffer: gtao,
                attachment: 0,
            });
            cmd.record(RenderCmd::uniform("u_GTAO", UniformValue::Int(7)));
        }

        cmd.record(RenderCmd::uniform("u_Mode", UniformValue::Int(mode.shader_index())));
        cmd.record(RenderCmd::uniform("u_Near", UniformValue::Float(self.camera.near)));
        cmd.record(RenderCmd::uniform("u_Far", UniformValue::Float(self.camera.far)));
        cmd.record(RenderCmd::uniform(
            "u_DepthPower",
            UniformValue::Float(self.info.depth_view_power),
        ));
        self.draw_fullscreen(cmd);
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    fn record_depth_view(
        &self,
        ctx: &PassContext<'_>,
        cmd: &mut CommandBuffer,
        target: &TargetWrite,
        scene_depth: ResourceHandle,
    ) {
        let Some(depth) = resolve(ctx, scene_depth) else {
            return;
        };
        if self.bind_target(ctx, cmd, target).is_none() {
            return;
        }
        cmd.record(RenderCmd::SetBlendEnabled(false));
        cmd.record(RenderCmd::BindPipeline(self.pipelines.depth_view));
        cmd.record(RenderCmd::BindDepthAttachment {
            slot: 0,
            framebuffer: depth,
        });
        cmd.record(RenderCmd::uniform("u_Depth", UniformValue::Int(0)));
        cmd.record(RenderCmd::uniform("u_Near", UniformValue::Float(self.camera.near)));
        cmd.record(RenderCmd::uniform("u_Far", UniformValue::Float(self.camera.far)));
        cmd.record(RenderCmd::uniform("u_IsPerspective", UniformValue::Int(1)));
        cmd.record(RenderCmd::uniform(
            "u_Power",
            UniformValue::Float(self.info.depth_view_power),
        ));
        self.draw_fullscreen(cmd);
        cmd.record(RenderCmd::SetBlendEnabled(true));
    }

    fn bind_gbuffer_color(
        &self,
        cmd: &mut CommandBuffer,
        slot: u32,
        attachment: GBufferAttachment,
        uniform: &str,
    ) {
        cmd.record(RenderCmd::BindColorAttachment {
            slot,
            framebuffer: self.g_buffer,
            attachment: attachment.index(),
        });
        cmd.record(RenderCmd::uniform(uniform, UniformValue::Int(slot as i32)));
    }
}

fn resolve(ctx: &PassContext<'_>, resource: ResourceHandle) -> Option<FramebufferHandle> {
    let framebuffer = ctx.framebuffer(resource);
    if framebuffer.is_none() {
        trace!(
            "resource {:?} has no framebuffer this frame",
            ctx.name(resource).unwrap_or("<unknown>")
        );
    }
    framebuffer
}

const fn draw_mesh(draw: &MeshDrawCommand) -> RenderCmd {
    RenderCmd::DrawIndexed {
        vertex_array: draw.vertex_array,
        index_count: draw.index_count,
        first_index: draw.index_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::foundation::math::Aabb;
    use crate::render::api::VertexArrayHandle;
    use crate::render::scene::mesh::Material;

    fn draw(object_id: i32, draw_outline: bool, visible: bool) -> MeshDrawCommand {
        MeshDrawCommand {
            vertex_array: VertexArrayHandle(1),
            index_offset: 0,
            index_count: 36,
            material: Arc::new(Material::default()),
            transform: Mat4::identity(),
            object_id,
            draw_outline,
            visible,
            transparent: false,
            local_bounds: Aabb::default(),
        }
    }

    #[test]
    fn test_outline_ids_merge_and_filter() {
        let draws = [draw(3, true, true), draw(4, true, false), draw(5, false, true), draw(-1, true, true)];
        assert_eq!(outline_ids(&[7, 3, -2], &draws), vec![7, 3]);
    }

    #[test]
    fn test_outline_ids_are_capped() {
        let explicit: Vec<i32> = (0..40).collect();
        let ids = outline_ids(&explicit, &[]);
        assert_eq!(ids.len(), MAX_OUTLINE_IDS);
        assert_eq!(ids.last(), Some(&31));
    }

    #[test]
    fn test_pass_categories() {
        let target = TargetWrite {
            resource: ResourceHandle::default(),
            clear: true,
        };
        assert_eq!(ScenePass::OutlineAabb { target }.category(), DrawCategory::Overlay);
        assert_eq!(
            ScenePass::Skybox { target, skybox: None }.category(),
            DrawCategory::Skybox
        );
        assert_eq!(
            ScenePass::Transparent { target, shadow_map: None }.category(),
            DrawCategory::Geometry
        );
    }
}
