//! Editor-facing scene settings
//!
//! [`SceneInfo`] is what the editor panels edit between frames. The render
//! mode, G-buffer debug view and the SSGI/GTAO toggles depend on each other,
//! so those four fields are private and only change through setters that
//! keep them consistent:
//!
//! - enabling SSGI or GTAO switches to [`RenderMode::DeferredHybrid`]
//! - selecting a G-buffer debug view switches to [`RenderMode::DeferredHybrid`]
//! - switching to [`RenderMode::Forward`] clears the debug view

use log::debug;
use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec4;

/// Lighting path of the scene renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Meshes are lit while they are drawn
    Forward,
    /// Opaque meshes go through the G-buffer, transparent ones are forward shaded
    #[default]
    DeferredHybrid,
}

/// Full-screen visualisation of one G-buffer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GBufferDebugMode {
    /// Regular lit output
    #[default]
    None,
    /// Base colour
    Albedo,
    /// World-space normals
    Normal,
    /// Packed material channel
    Material,
    /// Roughness only
    Roughness,
    /// Metallic only
    Metallic,
    /// Ambient occlusion from the material
    Ao,
    /// Emissive colour
    Emissive,
    /// Linearised depth
    Depth,
    /// False-coloured entity IDs
    ObjectId,
    /// Screen-space global illumination buffer
    Ssgi,
    /// Ground-truth ambient occlusion buffer
    Gtao,
}

impl GBufferDebugMode {
    /// Value of the `u_Mode` uniform
    pub const fn shader_index(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Albedo => 1,
            Self::Normal => 2,
            Self::Material => 3,
            Self::Roughness => 4,
            Self::Metallic => 5,
            Self::Ao => 6,
            Self::Emissive => 7,
            Self::Depth => 8,
            Self::ObjectId => 9,
            Self::Ssgi => 10,
            Self::Gtao => 11,
        }
    }
}

/// Attachment indices of the G-buffer framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferAttachment {
    /// RGBA8 base colour
    Albedo = 0,
    /// RGB16F normal
    Normal = 1,
    /// RGB16F metallic / roughness / AO
    Material = 2,
    /// RGB16F emissive
    Emissive = 3,
    /// R32I entity ID
    ObjectId = 4,
}

impl GBufferAttachment {
    /// Attachment index in the G-buffer specification
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Lighting environment toggles and tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Draw the environment cubemap behind the scene
    pub show_skybox: bool,
    /// Render the directional shadow map
    pub enable_shadows: bool,
    /// Constant ambient term
    pub ambient_intensity: f32,
    /// Shadow map edge length in texels
    pub shadow_map_size: u32,
    /// Depth bias applied when sampling the shadow map
    pub shadow_bias: f32,
    /// PCF kernel scale
    pub shadow_softness: f32,
    /// Normal map strength of PBR materials
    pub normal_map_strength: f32,
    /// Specular anti-aliasing strength
    pub toksvig_strength: f32,
    /// Image-based ambient lighting from the environment map
    pub use_ibl: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            show_skybox: true,
            enable_shadows: true,
            ambient_intensity: 0.1,
            shadow_map_size: 2048,
            shadow_bias: 0.01,
            shadow_softness: 1.0,
            normal_map_strength: 1.0,
            toksvig_strength: 1.0,
            use_ibl: true,
        }
    }
}

/// Screen-space global illumination tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsgiParams {
    /// Strength of the bounced light
    pub intensity: f32,
    /// World-space sampling radius
    pub radius: f32,
    /// Depth bias against self-occlusion
    pub bias: f32,
    /// Rays per pixel, clamped to `1..=64` when used
    pub sample_count: i32,
}

impl Default for SsgiParams {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            radius: 1.0,
            bias: 0.05,
            sample_count: 16,
        }
    }
}

impl SsgiParams {
    /// Sample count the SSGI shader receives
    pub fn clamped_sample_count(&self) -> i32 {
        self.sample_count.clamp(1, 64)
    }
}

/// Ground-truth ambient occlusion tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtaoParams {
    /// Occlusion strength
    pub intensity: f32,
    /// World-space horizon search radius
    pub radius: f32,
    /// Depth bias
    pub bias: f32,
    /// Exponent applied to the visibility term
    pub power: f32,
    /// Horizon slices per pixel, clamped to `1..=12`
    pub slice_count: i32,
    /// Steps per slice direction, clamped to `1..=16`
    pub step_count: i32,
}

impl Default for GtaoParams {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            radius: 1.0,
            bias: 0.03,
            power: 1.25,
            slice_count: 6,
            step_count: 6,
        }
    }
}

impl GtaoParams {
    /// Slice count the GTAO shader receives
    pub fn clamped_slice_count(&self) -> i32 {
        self.slice_count.clamp(1, 12)
    }

    /// Step count the GTAO shader receives
    pub fn clamped_step_count(&self) -> i32 {
        self.step_count.clamp(1, 16)
    }
}

/// Sizes of the maps precomputed for image-based lighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IblParams {
    /// Edge length of one irradiance face
    pub irradiance_map_size: u32,
    /// Edge length of one prefiltered face at mip 0
    pub prefilter_map_size: u32,
    /// Edge length of the BRDF lookup table
    pub brdf_lut_size: u32,
    /// Roughness levels of the prefiltered map, at least 1
    pub prefilter_mip_levels: u32,
}

impl Default for IblParams {
    fn default() -> Self {
        Self {
            irradiance_map_size: 32,
            prefilter_map_size: 128,
            brdf_lut_size: 512,
            prefilter_mip_levels: 5,
        }
    }
}

impl IblParams {
    /// Mip levels actually generated
    pub fn clamped_mip_levels(&self) -> u32 {
        self.prefilter_mip_levels.max(1)
    }
}

/// Persistent scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneInfo {
    /// Environment toggles
    pub environment: EnvironmentSettings,
    /// Replace the final image with linearised depth
    pub enable_depth_view: bool,
    /// Contrast exponent of the depth view
    pub depth_view_power: f32,
    /// Colour of selection outlines
    pub mesh_outline_color: Vec4,
    /// Outline width in pixels
    pub outline_thickness: f32,
    /// Depth discontinuity that counts as an edge
    pub outline_depth_threshold: f32,
    /// Normal discontinuity that counts as an edge
    pub outline_normal_threshold: f32,
    /// SSGI tunables
    pub ssgi: SsgiParams,
    /// GTAO tunables
    pub gtao: GtaoParams,
    /// IBL map sizes
    pub ibl: IblParams,

    render_mode: RenderMode,
    gbuffer_debug: GBufferDebugMode,
    enable_ssgi: bool,
    enable_gtao: bool,
}

impl Default for SceneInfo {
    fn default() -> Self {
        Self {
            environment: EnvironmentSettings::default(),
            enable_depth_view: false,
            depth_view_power: 3.0,
            mesh_outline_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            outline_thickness: 2.0,
            outline_depth_threshold: 0.1,
            outline_normal_threshold: 0.4,
            ssgi: SsgiParams::default(),
            gtao: GtaoParams::default(),
            ibl: IblParams::default(),
            render_mode: RenderMode::DeferredHybrid,
            gbuffer_debug: GBufferDebugMode::None,
            enable_ssgi: false,
            enable_gtao: false,
        }
    }
}

impl SceneInfo {
    /// Active lighting path
    pub const fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Active G-buffer visualisation
    pub const fn gbuffer_debug(&self) -> GBufferDebugMode {
        self.gbuffer_debug
    }

    /// Whether SSGI was requested
    pub const fn ssgi_enabled(&self) -> bool {
        self.enable_ssgi
    }

    /// Whether GTAO was requested
    pub const fn gtao_enabled(&self) -> bool {
        self.enable_gtao
    }

    /// Whether the deferred path is active
    pub fn is_deferred(&self) -> bool {
        self.render_mode == RenderMode::DeferredHybrid
    }

    /// Whether a G-buffer visualisation replaces the lit image
    pub fn is_debug_view(&self) -> bool {
        self.gbuffer_debug != GBufferDebugMode::None
    }

    /// SSGI runs when requested or when its buffer is being visualised
    pub fn use_ssgi(&self) -> bool {
        self.is_deferred() && (self.enable_ssgi || self.gbuffer_debug == GBufferDebugMode::Ssgi)
    }

    /// GTAO runs when requested or when its buffer is being visualised
    pub fn use_gtao(&self) -> bool {
        self.is_deferred() && (self.enable_gtao || self.gbuffer_debug == GBufferDebugMode::Gtao)
    }

    /// Switch the lighting path; Forward has no G-buffer to visualise
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
        if mode == RenderMode::Forward && self.gbuffer_debug != GBufferDebugMode::None {
            debug!("forward rendering selected, clearing G-buffer debug view");
            self.gbuffer_debug = GBufferDebugMode::None;
        }
    }

    /// Select a G-buffer visualisation; any view other than `None` needs the deferred path
    pub fn set_gbuffer_debug(&mut self, mode: GBufferDebugMode) {
        self.gbuffer_debug = mode;
        if mode != GBufferDebugMode::None {
            self.require_deferred("G-buffer debug view");
        }
    }

    /// Toggle SSGI; enabling it needs the deferred path
    pub fn set_ssgi_enabled(&mut self, enabled: bool) {
        self.enable_ssgi = enabled;
        if enabled {
            self.require_deferred("SSGI");
        }
    }

    /// Toggle GTAO; enabling it needs the deferred path
    pub fn set_gtao_enabled(&mut self, enabled: bool) {
        self.enable_gtao = enabled;
        if enabled {
            self.require_deferred("GTAO");
        }
    }

    fn require_deferred(&mut self, feature: &str) {
        if self.render_mode != RenderMode::DeferredHybrid {
            debug!("{feature} requires deferred rendering, switching render mode");
            self.render_mode = RenderMode::DeferredHybrid;
        }
    }

    /// Re-apply the coupling rules to values that bypassed the setters
    /// (deserialized settings)
    pub fn normalize(&mut self) {
        if self.enable_ssgi || self.enable_gtao || self.gbuffer_debug != GBufferDebugMode::None {
            self.require_deferred("loaded settings");
        }
    }
}
