//! Image-based lighting maps
//!
//! The environment map is convolved once into three maps the lit shaders
//! sample: a diffuse irradiance cube, a specular prefiltered cube with one
//! mip per roughness step and a split-sum BRDF lookup table. The maps are
//! regenerated only when the environment map or the [`IblParams`] change.
//!
//! Cube maps are stored as six square faces stacked vertically in a 2D
//! framebuffer, face `i` occupying rows `i * size .. (i + 1) * size`. The
//! prefiltered map places its mips side by side, each mip half the size of
//! the previous one.

use log::{debug, info};

use super::mesh::Mesh;
use super::passes::{SceneGeometry, FULLSCREEN_INDEX_COUNT};
use super::scene_info::IblParams;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::api::{
    BackendResult, CompareOp, FramebufferHandle, FramebufferSpecification,
    FramebufferTextureFormat, PipelineHandle, PipelineSpecification, RendererBackend,
    TextureHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd, UniformValue};

/// Sampler slot of the irradiance map in lit shaders
pub const IRRADIANCE_MAP_SLOT: u32 = 11;

/// Sampler slot of the prefiltered environment map in lit shaders
pub const PREFILTER_MAP_SLOT: u32 = 12;

/// Sampler slot of the BRDF lookup table in lit shaders
pub const BRDF_LUT_SLOT: u32 = 13;

/// Sampler slot of the source environment map while convolving
const SOURCE_SLOT: u32 = 0;

/// Faces of a cube map
pub const CUBE_FACES: usize = 6;

/// 90° square projection covering one cube face from the origin
pub fn capture_projection() -> Mat4 {
    Mat4::new_perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 10.0)
}

/// Views from the origin toward +X, -X, +Y, -Y, +Z and -Z
pub fn capture_views() -> [Mat4; CUBE_FACES] {
    let face = |target: Vec3, up: Vec3| Mat4::look_at_rh(&Point3::origin(), &Point3::from(target), &up);
    [
        face(Vec3::x(), -Vec3::y()),
        face(-Vec3::x(), -Vec3::y()),
        face(Vec3::y(), Vec3::z()),
        face(-Vec3::y(), -Vec3::z()),
        face(Vec3::z(), -Vec3::y()),
        face(-Vec3::z(), -Vec3::y()),
    ]
}

/// Edge length of prefilter mip `mip`
pub fn mip_size(base: u32, mip: u32) -> u32 {
    base.checked_shr(mip).unwrap_or(0).max(1)
}

/// Roughness the prefilter shader convolves mip `mip` with
pub fn mip_roughness(mip: u32, levels: u32) -> f32 {
    if levels <= 1 {
        0.0
    } else {
        mip as f32 / (levels - 1) as f32
    }
}

/// Maps generated from one environment map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblMaps {
    source: TextureHandle,
    params: IblParams,
    irradiance: FramebufferHandle,
    prefilter: FramebufferHandle,
    brdf_lut: FramebufferHandle,
}

impl IblMaps {
    /// Environment map the maps were generated from
    pub const fn source(&self) -> TextureHandle {
        self.source
    }

    /// Diffuse irradiance faces
    pub const fn irradiance(&self) -> FramebufferHandle {
        self.irradiance
    }

    /// Prefiltered specular faces, one column per mip
    pub const fn prefilter(&self) -> FramebufferHandle {
        self.prefilter
    }

    /// Split-sum BRDF lookup table
    pub const fn brdf_lut(&self) -> FramebufferHandle {
        self.brdf_lut
    }

    /// Bind the three maps and their sampler uniforms for a lit shader
    pub fn record_bindings(&self, cmd: &mut CommandBuffer) {
        for (slot, framebuffer, name) in [
            (IRRADIANCE_MAP_SLOT, self.irradiance, "u_IrradianceMap"),
            (PREFILTER_MAP_SLOT, self.prefilter, "u_PrefilterMap"),
            (BRDF_LUT_SLOT, self.brdf_lut, "u_BRDFLT"),
        ] {
            cmd.record(RenderCmd::BindColorAttachment {
                slot,
                framebuffer,
                attachment: 0,
            });
            cmd.record(RenderCmd::uniform(name, UniformValue::Int(slot as i32)));
        }
        let max_lod = self.params.clamped_mip_levels() - 1;
        cmd.record(RenderCmd::uniform(
            "u_PrefilterMaxLOD",
            UniformValue::Float(max_lod as f32),
        ));
    }

    fn destroy(&self, backend: &mut dyn RendererBackend) {
        backend.destroy_framebuffer(self.irradiance);
        backend.destroy_framebuffer(self.prefilter);
        backend.destroy_framebuffer(self.brdf_lut);
    }
}

/// Pipelines of the three convolutions
#[derive(Debug, Clone, Copy)]
struct IblPipelines {
    irradiance: PipelineHandle,
    prefilter: PipelineHandle,
    brdf: PipelineHandle,
}

/// Owns the IBL maps of the current environment map
#[derive(Debug)]
pub struct EnvironmentIbl {
    pipelines: IblPipelines,
    maps: Option<IblMaps>,
}

impl EnvironmentIbl {
    /// Compile the convolution pipelines
    pub fn new(backend: &mut dyn RendererBackend) -> BackendResult<Self> {
        let capture = |shader: &str| PipelineSpecification::new(shader).with_depth(false, CompareOp::LessEqual);
        Ok(Self {
            pipelines: IblPipelines {
                irradiance: backend.create_pipeline(&capture("IBLIrradiance"))?,
                prefilter: backend.create_pipeline(&capture("IBLPrefilter"))?,
                brdf: backend.create_pipeline(&PipelineSpecification::fullscreen("IBLBrdf"))?,
            },
            maps: None,
        })
    }

    /// Maps of the last precompute, if any
    pub const fn maps(&self) -> Option<&IblMaps> {
        self.maps.as_ref()
    }

    /// Make sure the maps of `source` exist
    ///
    /// Returns the convolution commands when the maps had to be
    /// (re)generated, `None` when the current maps already match. The
    /// commands must run before anything samples the maps.
    pub fn ensure(
        &mut self,
        backend: &mut dyn RendererBackend,
        source: TextureHandle,
        params: &IblParams,
        geometry: &SceneGeometry,
    ) -> BackendResult<Option<CommandBuffer>> {
        if let Some(maps) = &self.maps {
            if maps.source == source && maps.params == *params {
                return Ok(None);
            }
            debug!("environment changed, regenerating IBL maps");
            maps.destroy(backend);
            self.maps = None;
        }

        let maps = create_maps(backend, source, params)?;
        let mut cmd = CommandBuffer::new();
        self.record_precompute(&maps, geometry, &mut cmd);
        info!(
            "IBL maps generated ({} draws, irradiance {}, prefilter {}x{} mips, BRDF LUT {})",
            cmd.draw_count(),
            params.irradiance_map_size,
            params.prefilter_map_size,
            params.clamped_mip_levels(),
            params.brdf_lut_size
        );
        self.maps = Some(maps);
        Ok(Some(cmd))
    }

    /// Destroy the maps, keeping the pipelines
    pub fn release_maps(&mut self, backend: &mut dyn RendererBackend) {
        if let Some(maps) = self.maps.take() {
            maps.destroy(backend);
        }
    }

    /// Destroy the maps and pipelines
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        self.release_maps(backend);
        for pipeline in [
            self.pipelines.irradiance,
            self.pipelines.prefilter,
            self.pipelines.brdf,
        ] {
            backend.destroy_pipeline(pipeline);
        }
    }

    fn record_precompute(&self, maps: &IblMaps, geometry: &SceneGeometry, cmd: &mut CommandBuffer) {
        let cube = geometry.skybox();
        let params = &maps.params;

        cmd.record(RenderCmd::BindFramebuffer(maps.irradiance));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.irradiance));
        bind_source(maps.source, cmd);
        let size = params.irradiance_map_size.max(1);
        record_faces(cube, cmd, |face| (0, face * size, size));

        cmd.record(RenderCmd::BindFramebuffer(maps.prefilter));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.prefilter));
        bind_source(maps.source, cmd);
        let levels = params.clamped_mip_levels();
        let base = params.prefilter_map_size.max(1);
        let mut x = 0;
        for mip in 0..levels {
            let size = mip_size(base, mip);
            cmd.record(RenderCmd::uniform(
                "u_Roughness",
                UniformValue::Float(mip_roughness(mip, levels)),
            ));
            record_faces(cube, cmd, |face| (x, face * size, size));
            x += size;
        }

        cmd.record(RenderCmd::BindFramebuffer(maps.brdf_lut));
        cmd.record(RenderCmd::Clear);
        cmd.record(RenderCmd::BindPipeline(self.pipelines.brdf));
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: geometry.fullscreen(),
            index_count: FULLSCREEN_INDEX_COUNT,
            first_index: 0,
        });
        cmd.record(RenderCmd::UnbindFramebuffer);
    }
}

fn bind_source(source: TextureHandle, cmd: &mut CommandBuffer) {
    cmd.record(RenderCmd::BindTexture {
        slot: SOURCE_SLOT,
        texture: source,
    });
    cmd.record(RenderCmd::uniform(
        "u_EnvironmentMap",
        UniformValue::Int(SOURCE_SLOT as i32),
    ));
    cmd.record(RenderCmd::uniform(
        "u_Projection",
        UniformValue::Mat4(capture_projection()),
    ));
}

/// One cube draw per face into the viewport `region(face)` = (x, y, size)
fn record_faces(cube: &Mesh, cmd: &mut CommandBuffer, region: impl Fn(u32) -> (u32, u32, u32)) {
    let index_count = cube.submeshes().first().map_or(0, |submesh| submesh.index_count);
    for (face, view) in (0..).zip(capture_views()) {
        let (x, y, size) = region(face);
        cmd.record(RenderCmd::SetViewport {
            x,
            y,
            width: size,
            height: size,
        });
        cmd.record(RenderCmd::uniform("u_View", UniformValue::Mat4(view)));
        cmd.record(RenderCmd::DrawIndexed {
            vertex_array: cube.vertex_array(),
            index_count,
            first_index: 0,
        });
    }
}

fn create_maps(
    backend: &mut dyn RendererBackend,
    source: TextureHandle,
    params: &IblParams,
) -> BackendResult<IblMaps> {
    let faces = CUBE_FACES as u32;
    let irradiance_size = params.irradiance_map_size.max(1);
    let prefilter_size = params.prefilter_map_size.max(1);
    let prefilter_width = (0..params.clamped_mip_levels())
        .map(|mip| mip_size(prefilter_size, mip))
        .sum();
    let lut_size = params.brdf_lut_size.max(1);

    let specs = [
        FramebufferSpecification::new(
            irradiance_size,
            irradiance_size * faces,
            vec![FramebufferTextureFormat::Rgb16F],
        ),
        FramebufferSpecification::new(
            prefilter_width,
            prefilter_size * faces,
            vec![FramebufferTextureFormat::Rgb16F],
        ),
        FramebufferSpecification::new(lut_size, lut_size, vec![FramebufferTextureFormat::Rg16F]),
    ];
    let mut created = Vec::with_capacity(specs.len());
    for spec in &specs {
        match backend.create_framebuffer(spec) {
            Ok(framebuffer) => created.push(framebuffer),
            Err(error) => {
                for framebuffer in created {
                    backend.destroy_framebuffer(framebuffer);
                }
                return Err(error);
            }
        }
    }

    Ok(IblMaps {
        source,
        params: *params,
        irradiance: created[0],
        prefilter: created[1],
        brdf_lut: created[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use crate::render::api::TextureSpecification;
    use crate::render::backends::HeadlessBackend;
    use approx::assert_relative_eq;

    fn setup() -> (HeadlessBackend, EnvironmentIbl, SceneGeometry, TextureHandle) {
        let mut backend = HeadlessBackend::new();
        let ibl = EnvironmentIbl::new(&mut backend).unwrap();
        let geometry = SceneGeometry::create(&mut backend).unwrap();
        let source = backend
            .create_texture(&TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        (backend, ibl, geometry, source)
    }

    #[test]
    fn test_capture_views_face_their_axis() {
        let projection = capture_projection();
        let targets = [
            Vec3::x(),
            -Vec3::x(),
            Vec3::y(),
            -Vec3::y(),
            Vec3::z(),
            -Vec3::z(),
        ];
        for (view, target) in capture_views().iter().zip(targets) {
            let clip = projection * view * Vec4::new(target.x, target.y, target.z, 1.0);
            assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
            assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_mip_chain() {
        assert_eq!(mip_size(128, 0), 128);
        assert_eq!(mip_size(128, 4), 8);
        assert_eq!(mip_size(4, 10), 1);
        assert_relative_eq!(mip_roughness(0, 5), 0.0);
        assert_relative_eq!(mip_roughness(4, 5), 1.0);
        assert_relative_eq!(mip_roughness(0, 1), 0.0);
    }

    #[test]
    fn test_precompute_runs_once_per_environment() {
        let (mut backend, mut ibl, geometry, source) = setup();
        let params = IblParams::default();

        let cmd = ibl.ensure(&mut backend, source, &params, &geometry).unwrap().unwrap();
        // 6 irradiance faces, 6 faces per prefilter mip, one LUT quad
        assert_eq!(cmd.draw_count(), 6 + 6 * 5 + 1);
        cmd.execute(&mut backend).unwrap();
        assert!(ibl.ensure(&mut backend, source, &params, &geometry).unwrap().is_none());

        let maps = *ibl.maps().unwrap();
        let prefilter = backend.framebuffer_specification(maps.prefilter()).unwrap();
        assert_eq!(prefilter.width, 128 + 64 + 32 + 16 + 8);
        assert_eq!(prefilter.height, 128 * 6);
        let lut = backend.framebuffer_specification(maps.brdf_lut()).unwrap();
        assert_eq!(lut.attachments, vec![FramebufferTextureFormat::Rg16F]);
    }

    #[test]
    fn test_new_environment_replaces_maps() {
        let (mut backend, mut ibl, geometry, source) = setup();
        let params = IblParams::default();
        ibl.ensure(&mut backend, source, &params, &geometry).unwrap();
        let first = *ibl.maps().unwrap();
        let count = backend.resource_count();

        let other = backend
            .create_texture(&TextureSpecification::rgba8(1, 1), None)
            .unwrap();
        assert!(ibl.ensure(&mut backend, other, &params, &geometry).unwrap().is_some());
        assert!(backend.framebuffer_specification(first.irradiance()).is_none());
        assert_eq!(ibl.maps().unwrap().source(), other);
        // old maps destroyed, new texture and new maps created
        assert_eq!(backend.resource_count(), count + 1);

        let smaller = IblParams {
            prefilter_mip_levels: 1,
            ..params
        };
        let cmd = ibl.ensure(&mut backend, other, &smaller, &geometry).unwrap().unwrap();
        assert_eq!(cmd.draw_count(), 6 + 6 + 1);
    }

    #[test]
    fn test_bindings_use_lit_shader_slots() {
        let (mut backend, mut ibl, geometry, source) = setup();
        ibl.ensure(&mut backend, source, &IblParams::default(), &geometry).unwrap();
        let mut cmd = CommandBuffer::new();
        ibl.maps().unwrap().record_bindings(&mut cmd);

        let slots: Vec<u32> = cmd
            .commands()
            .iter()
            .filter_map(|command| match command {
                RenderCmd::BindColorAttachment { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![IRRADIANCE_MAP_SLOT, PREFILTER_MAP_SLOT, BRDF_LUT_SLOT]);
        assert!(cmd.commands().contains(&RenderCmd::uniform(
            "u_PrefilterMaxLOD",
            UniformValue::Float(4.0)
        )));
        cmd.execute(&mut backend).unwrap();
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (mut backend, mut ibl, geometry, source) = setup();
        ibl.ensure(&mut backend, source, &IblParams::default(), &geometry).unwrap();
        ibl.shutdown(&mut backend);
        geometry.destroy(&mut backend);
        backend.destroy_texture(source);
        assert_eq!(backend.resource_count(), 0);
    }
}
