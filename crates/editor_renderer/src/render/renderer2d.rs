//! # Renderer2D
//!
//! Batched immediate-mode drawing of quads, circles, lines and MSDF text.
//!
//! ## Frame flow
//!
//! `begin_scene*` records the camera and starts a batch epoch; `draw_*` calls
//! write vertices into the staging buffers; `end_scene` flushes the remaining
//! batches and executes everything recorded this frame against the backend.
//!
//! Recording never touches the backend. When a batch fills up, the texture
//! slot table runs out or the text atlas changes mid-epoch, every batch is
//! flushed into the pending command buffer and a new epoch begins. Overflow
//! therefore shows up as additional draw calls, never as lost geometry.

use std::sync::Arc;

use log::{info, trace};

use crate::config::Renderer2DConfig;
use crate::foundation::math::{quad_transform, strip_translation, Aabb, Mat4, Vec2, Vec3, Vec4};
use crate::render::api::{FramebufferHandle, IndexBufferHandle, RendererBackend};
use crate::render::batch::{
    default_tex_coords, generate_quad_indices, quad_corner, CircleBatch, LineBatch, QuadBatch,
    TextBatch,
};
use crate::render::camera::{camera_position, Camera, CameraUniform, SceneCamera};
use crate::render::commands::{CommandBuffer, RenderCmd};
use crate::render::scene::MeshDrawCommand;
use crate::render::text::{layout_text, MsdfFont, TextParams};
use crate::render::texture::{SubTexture2D, Texture2D, TextureSlots};
use crate::render::{RenderError, RenderResult};

/// Counters accumulated until [`Renderer2D::reset_statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renderer2DStatistics {
    /// Draw submissions issued by flushes
    pub draw_calls: usize,
    /// Quads drawn (instanced included)
    pub quad_count: usize,
    /// Line segments drawn
    pub line_count: usize,
    /// Circles drawn
    pub circle_count: usize,
}

impl Renderer2DStatistics {
    /// Vertices written for quads, circles and lines
    pub const fn total_vertex_count(&self) -> usize {
        (self.quad_count + self.circle_count) * 4 + self.line_count * 2
    }

    /// Indices consumed by quads and circles
    pub const fn total_index_count(&self) -> usize {
        (self.quad_count + self.circle_count) * 6
    }
}

/// Batched 2D renderer
#[derive(Debug)]
pub struct Renderer2D {
    quads: QuadBatch,
    circles: CircleBatch,
    lines: LineBatch,
    text: TextBatch,
    index_buffer: IndexBufferHandle,

    white_texture: Arc<Texture2D>,
    texture_slots: TextureSlots,

    camera: CameraUniform,
    target: Option<FramebufferHandle>,
    commands: CommandBuffer,
    stats: Renderer2DStatistics,
}

impl Renderer2D {
    /// Create batches, the shared quad index buffer and the white texture
    pub fn new(backend: &mut dyn RendererBackend, config: &Renderer2DConfig) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let index_quads = config
            .max_quads
            .max(config.max_circles)
            .max(config.max_text_quads);
        let index_buffer = backend.create_index_buffer(&generate_quad_indices(index_quads))?;

        let quads = QuadBatch::init(backend, config.max_quads, index_buffer)?;
        let circles = CircleBatch::init(backend, config.max_circles, index_buffer)?;
        let lines = LineBatch::init(backend, config.max_lines, config.line_width)?;
        let text = TextBatch::init(backend, config.max_text_quads, index_buffer)?;

        let white_texture = Texture2D::white(backend)?;
        let texture_slots = TextureSlots::new(Arc::clone(&white_texture), config.max_texture_slots);

        info!(
            "Renderer2D initialized on {} ({} quads, {} circles, {} lines, {} glyphs, {} texture slots)",
            backend.name(),
            config.max_quads,
            config.max_circles,
            config.max_lines,
            config.max_text_quads,
            config.max_texture_slots
        );

        Ok(Self {
            quads,
            circles,
            lines,
            text,
            index_buffer,
            white_texture,
            texture_slots,
            camera: CameraUniform::default(),
            target: None,
            commands: CommandBuffer::new(),
            stats: Renderer2DStatistics::default(),
        })
    }

    /// Release every GPU resource
    pub fn shutdown(&self, backend: &mut dyn RendererBackend) {
        self.quads.shutdown(backend);
        self.circles.shutdown(backend);
        self.lines.shutdown(backend);
        self.text.shutdown(backend);
        backend.destroy_index_buffer(self.index_buffer);
        backend.destroy_texture(self.white_texture.handle());
    }

    /// Framebuffer bound at the start of every scene; `None` keeps the current one
    pub fn set_target_framebuffer(&mut self, target: Option<FramebufferHandle>) {
        self.target = target;
    }

    // === Scene lifecycle ===

    /// Begin a scene seen through an editor camera
    pub fn begin_scene(&mut self, camera: &SceneCamera) {
        self.begin(camera.uniform());
    }

    /// Begin a scene from a projection and the camera's world transform
    pub fn begin_scene_with_transform(&mut self, camera: &Camera, transform: &Mat4) {
        let view = transform.try_inverse().unwrap_or_else(Mat4::identity);
        self.begin(CameraUniform {
            view_projection: camera.projection * view,
            view,
            position: camera_position(&view),
        });
    }

    /// Begin an overlay scene from a combined matrix (typically orthographic)
    pub fn begin_scene_view_projection(&mut self, view_projection: &Mat4) {
        self.begin(CameraUniform::from_view_projection(*view_projection));
    }

    fn begin(&mut self, camera: CameraUniform) {
        self.camera = camera;
        if let Some(target) = self.target {
            self.commands.record(RenderCmd::BindFramebuffer(target));
        }
        self.commands.record(RenderCmd::UpdateCamera(camera));
        self.start_batch();
    }

    /// Flush the last batches and execute everything recorded this frame
    pub fn end_scene(&mut self, backend: &mut dyn RendererBackend) -> RenderResult<()> {
        self.flush_and_reset();
        let result = self.commands.execute(backend);
        self.commands.clear();
        result
    }

    /// Commands recorded but not yet executed
    pub const fn pending_commands(&self) -> &CommandBuffer {
        &self.commands
    }

    fn start_batch(&mut self) {
        self.quads.reset();
        self.circles.reset();
        self.lines.reset();
        self.text.reset();
        self.texture_slots.reset();
    }

    /// Record upload, binds and one draw for every non-empty batch
    ///
    /// Order: quads, instanced quads, circles, lines, text.
    pub fn flush(&mut self) {
        if self.quads.has_data() {
            self.quads.upload(&mut self.commands);
            self.bind_texture_slots();
            self.quads.record_draw(&mut self.commands);
            self.stats.draw_calls += 1;
        }

        if self.quads.has_instances() {
            self.quads.upload_instances(&mut self.commands);
            self.bind_texture_slots();
            self.quads.record_instanced_draw(&mut self.commands);
            self.stats.draw_calls += 1;
        }

        if self.circles.has_data() {
            self.circles.upload(&mut self.commands);
            self.circles.record_draw(&mut self.commands);
            self.stats.draw_calls += 1;
        }

        if self.lines.has_data() {
            self.lines.upload(&mut self.commands);
            self.lines.record_draw(&mut self.commands);
            self.stats.draw_calls += 1;
        }

        if self.text.has_data() {
            self.text.upload(&mut self.commands);
            self.text.record_draw(&mut self.commands);
            self.stats.draw_calls += 1;
        }
    }

    /// Flush every batch, then start a new epoch
    pub fn flush_and_reset(&mut self) {
        self.flush();
        self.start_batch();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bind_texture_slots(&mut self) {
        for (slot, texture) in self.texture_slots.handles().enumerate() {
            self.commands.record(RenderCmd::BindTexture {
                slot: slot as u32,
                texture,
            });
        }
    }

    fn texture_index(&mut self, texture: &Arc<Texture2D>) -> f32 {
        if let Some(index) = self.texture_slots.find_or_assign(texture) {
            return index;
        }
        trace!("texture slots exhausted, starting a new batch");
        self.flush_and_reset();
        self.texture_slots.find_or_assign(texture).unwrap_or(0.0)
    }

    fn submit_quad(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        tex_coords: &[Vec2; 4],
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        object_id: i32,
    ) {
        if self.quads.is_full() {
            trace!("quad batch full, starting a new batch");
            self.flush_and_reset();
        }
        let tex_index = texture.map_or(0.0, |texture| self.texture_index(texture));
        self.quads
            .submit(transform, color, tex_coords, tex_index, tiling_factor, object_id);
        self.stats.quad_count += 1;
    }

    // === Quads ===

    /// Flat-coloured quad
    pub fn draw_quad(&mut self, transform: &Mat4, color: &Vec4, object_id: i32) {
        self.submit_quad(transform, color, &default_tex_coords(), None, 1.0, object_id);
    }

    /// Flat-coloured, axis-aligned quad centred on `position`
    pub fn draw_quad_at(&mut self, position: &Vec3, size: &Vec2, color: &Vec4) {
        self.draw_quad(&quad_transform(*position, *size, 0.0), color, -1);
    }

    /// Textured quad; does nothing without a texture
    pub fn draw_textured_quad(
        &mut self,
        transform: &Mat4,
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        tint: &Vec4,
        object_id: i32,
    ) {
        let Some(texture) = texture else {
            trace!("draw_textured_quad without texture skipped");
            return;
        };
        self.submit_quad(
            transform,
            tint,
            &default_tex_coords(),
            Some(texture),
            tiling_factor,
            object_id,
        );
    }

    /// Quad showing a sprite-sheet region
    pub fn draw_sub_textured_quad(
        &mut self,
        transform: &Mat4,
        sub_texture: &SubTexture2D,
        tiling_factor: f32,
        tint: &Vec4,
        object_id: i32,
    ) {
        let tex_coords = *sub_texture.tex_coords();
        self.submit_quad(
            transform,
            tint,
            &tex_coords,
            Some(sub_texture.texture()),
            tiling_factor,
            object_id,
        );
    }

    /// Flat-coloured quad rotated about Z
    pub fn draw_rotated_quad(&mut self, position: &Vec3, size: &Vec2, radians: f32, color: &Vec4) {
        self.draw_quad(&quad_transform(*position, *size, radians), color, -1);
    }

    /// Textured quad rotated about Z; does nothing without a texture
    pub fn draw_rotated_textured_quad(
        &mut self,
        position: &Vec3,
        size: &Vec2,
        radians: f32,
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        tint: &Vec4,
    ) {
        let transform = quad_transform(*position, *size, radians);
        self.draw_textured_quad(&transform, texture, tiling_factor, tint, -1);
    }

    /// Model matrix of a camera-facing quad at `position`
    ///
    /// The view matrix with its translation removed holds the camera
    /// rotation; its inverse turns the unit quad to face the camera.
    pub fn billboard_transform(&self, position: &Vec3, size: &Vec2) -> Mat4 {
        let rotation = strip_translation(&self.camera.view)
            .try_inverse()
            .unwrap_or_else(Mat4::identity);
        Mat4::new_translation(position)
            * rotation
            * Mat4::new_nonuniform_scaling(&Vec3::new(size.x, size.y, 1.0))
    }

    /// Flat-coloured quad facing the camera
    pub fn draw_quad_billboard(&mut self, position: &Vec3, size: &Vec2, color: &Vec4, object_id: i32) {
        let transform = self.billboard_transform(position, size);
        self.draw_quad(&transform, color, object_id);
    }

    /// Textured quad facing the camera; does nothing without a texture
    pub fn draw_textured_quad_billboard(
        &mut self,
        position: &Vec3,
        size: &Vec2,
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        tint: &Vec4,
        object_id: i32,
    ) {
        let transform = self.billboard_transform(position, size);
        self.draw_textured_quad(&transform, texture, tiling_factor, tint, object_id);
    }

    /// Quad drawn through the instanced path; `None` samples the white texture
    pub fn draw_quad_instanced(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        texture: Option<&Arc<Texture2D>>,
        tiling_factor: f32,
        object_id: i32,
    ) {
        if self.quads.is_instance_full() {
            trace!("instance batch full, starting a new batch");
            self.flush_and_reset();
        }
        let tex_index = texture.map_or(0.0, |texture| self.texture_index(texture));
        self.quads
            .submit_instanced(transform, color, tex_index, tiling_factor, object_id);
        self.stats.quad_count += 1;
    }

    // === Circles and lines ===

    /// Disc or ring inscribed in `transform * unit quad`
    pub fn draw_circle(
        &mut self,
        transform: &Mat4,
        color: &Vec4,
        thickness: f32,
        fade: f32,
        object_id: i32,
    ) {
        if self.circles.is_full() {
            trace!("circle batch full, starting a new batch");
            self.flush_and_reset();
        }
        self.circles
            .submit(transform, color, thickness, fade, object_id);
        self.stats.circle_count += 1;
    }

    /// Line segment
    pub fn draw_line(&mut self, p0: &Vec3, p1: &Vec3, color: &Vec4, object_id: i32) {
        if self.lines.is_full() {
            trace!("line batch full, starting a new batch");
            self.flush_and_reset();
        }
        self.lines.submit(p0, p1, color, object_id);
        self.stats.line_count += 1;
    }

    /// Outline of an axis-aligned rectangle centred on `position`
    pub fn draw_rect(&mut self, position: &Vec3, size: &Vec2, color: &Vec4, object_id: i32) {
        let (hx, hy) = (size.x * 0.5, size.y * 0.5);
        let corners = [
            Vec3::new(position.x - hx, position.y - hy, position.z),
            Vec3::new(position.x + hx, position.y - hy, position.z),
            Vec3::new(position.x + hx, position.y + hy, position.z),
            Vec3::new(position.x - hx, position.y + hy, position.z),
        ];
        self.draw_loop(&corners, color, object_id);
    }

    /// Outline of `transform * unit quad`
    pub fn draw_rect_transform(&mut self, transform: &Mat4, color: &Vec4, object_id: i32) {
        let corners = [0, 1, 2, 3].map(|i| (transform * quad_corner(i)).xyz());
        self.draw_loop(&corners, color, object_id);
    }

    /// Twelve edges of `aabb` transformed by `transform`
    pub fn draw_aabb(&mut self, aabb: &Aabb, transform: &Mat4, color: &Vec4, object_id: i32) {
        let (min, max) = (aabb.min, aabb.max);
        let local = [
            // front face (max z)
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            // back face (min z)
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
        ];
        let corners = local.map(|corner| transform.transform_point(&corner.into()).coords);

        self.draw_loop(&[corners[0], corners[1], corners[2], corners[3]], color, object_id);
        self.draw_loop(&[corners[4], corners[5], corners[6], corners[7]], color, object_id);
        for i in 0..4 {
            self.draw_line(&corners[i], &corners[i + 4], color, object_id);
        }
    }

    fn draw_loop(&mut self, corners: &[Vec3; 4], color: &Vec4, object_id: i32) {
        for i in 0..4 {
            self.draw_line(&corners[i], &corners[(i + 1) % 4], color, object_id);
        }
    }

    /// Width applied to the line batch at its next flush
    pub fn set_line_width(&mut self, width: f32) {
        self.lines.set_line_width(width);
    }

    /// Current line width
    pub const fn line_width(&self) -> f32 {
        self.lines.line_width()
    }

    // === Text ===

    /// Draw `text` in text space transformed by `transform`
    ///
    /// Does nothing when the font, its atlas or a glyph (and the `?`
    /// fallback) is missing.
    pub fn draw_string(
        &mut self,
        text: &str,
        font: Option<&Arc<MsdfFont>>,
        transform: &Mat4,
        params: &TextParams,
        object_id: i32,
    ) {
        let Some(font) = font else {
            trace!("draw_string without font skipped");
            return;
        };
        let Some(atlas) = font.atlas() else {
            trace!("draw_string with a font lacking an atlas skipped");
            return;
        };
        let glyphs = match layout_text(text, font, params) {
            Ok(glyphs) => glyphs,
            Err(err) => {
                trace!("draw_string skipped {text:?}: {err}");
                return;
            }
        };

        if !self.text.accepts_atlas(atlas) {
            trace!("text atlas changed, starting a new batch");
            self.flush_and_reset();
        }
        self.text.set_atlas(atlas);

        for glyph in &glyphs {
            if !self.text.submit_glyph(glyph, transform, &params.color, object_id) {
                trace!("text batch full, starting a new batch");
                self.flush_and_reset();
                self.text.set_atlas(atlas);
                self.text.submit_glyph(glyph, transform, &params.color, object_id);
            }
        }
    }

    // === Editor helpers ===

    /// Record AABB outlines of every visible mesh flagged for outlining into `cmd`
    ///
    /// Overlay geometry submitted so far is flushed into the renderer's own
    /// stream first, so `cmd` only receives the outline lines.
    pub fn record_outline_pass(
        &mut self,
        cmd: &mut CommandBuffer,
        draws: &[MeshDrawCommand],
        color: &Vec4,
    ) {
        let mut outlined = draws
            .iter()
            .filter(|draw| draw.draw_outline && draw.visible)
            .peekable();
        if outlined.peek().is_none() {
            return;
        }

        self.flush_and_reset();
        let overlay = std::mem::take(&mut self.commands);
        self.commands.record(RenderCmd::UpdateCamera(self.camera));
        for draw in outlined {
            self.draw_aabb(&draw.local_bounds, &draw.transform, color, draw.object_id);
        }
        self.flush_and_reset();

        let outline = std::mem::replace(&mut self.commands, overlay);
        cmd.extend(outline.into_commands());
    }

    // === Statistics ===

    /// Counters since the last reset
    pub const fn statistics(&self) -> Renderer2DStatistics {
        self.stats
    }

    /// Zero the counters
    pub fn reset_statistics(&mut self) {
        self.stats = Renderer2DStatistics::default();
    }

    /// Texture slots in use this epoch, white included
    pub fn bound_texture_count(&self) -> usize {
        self.texture_slots.len()
    }

    /// The white fallback texture
    pub const fn white_texture(&self) -> &Arc<Texture2D> {
        &self.white_texture
    }

    /// Camera of the current scene
    pub const fn camera(&self) -> &CameraUniform {
        &self.camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{TextureHandle, TextureSpecification};
    use crate::render::backends::HeadlessBackend;
    use crate::render::text::{Bounds, FontMetrics, GlyphEntry, GlyphGeometry, MsdfFontDescription};
    use approx::assert_relative_eq;

    fn small_config() -> Renderer2DConfig {
        Renderer2DConfig {
            max_quads: 8,
            max_circles: 8,
            max_lines: 8,
            max_text_quads: 8,
            ..Default::default()
        }
    }

    fn setup(config: &Renderer2DConfig) -> (HeadlessBackend, Renderer2D) {
        let mut backend = HeadlessBackend::new();
        let renderer = Renderer2D::new(&mut backend, config).unwrap();
        (backend, renderer)
    }

    fn white() -> Vec4 {
        Vec4::new(1.0, 1.0, 1.0, 1.0)
    }

    fn font_with(chars: &[char], atlas: TextureHandle) -> Arc<MsdfFont> {
        let mut glyphs = vec![GlyphEntry {
            unicode: ' ',
            geometry: GlyphGeometry {
                advance: 0.3,
                ..Default::default()
            },
        }];
        glyphs.extend(chars.iter().map(|&unicode| GlyphEntry {
            unicode,
            geometry: GlyphGeometry {
                advance: 0.5,
                atlas_bounds: Some(Bounds::new(0.0, 0.0, 16.0, 16.0)),
                plane_bounds: Some(Bounds::new(0.0, 0.0, 0.5, 0.8)),
            },
        }));
        let description = MsdfFontDescription {
            atlas_width: 64,
            atlas_height: 64,
            metrics: FontMetrics::default(),
            glyphs,
            kerning: Vec::new(),
        };
        let atlas = Arc::new(Texture2D::new(atlas, 64, 64));
        Arc::new(MsdfFont::from_description(&description, Some(atlas)).unwrap())
    }

    #[test]
    fn test_overflow_flushes_every_batch() {
        let (mut backend, mut renderer) = setup(&small_config());
        renderer.begin_scene_view_projection(&Mat4::identity());
        for _ in 0..9 {
            renderer.draw_quad(&Mat4::identity(), &white(), 1);
        }
        renderer.end_scene(&mut backend).unwrap();

        let stats = renderer.statistics();
        assert_eq!(stats.quad_count, 9);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.total_vertex_count(), 36);
        assert_eq!(stats.total_index_count(), 54);
    }

    #[test]
    fn test_flush_order_and_line_width() {
        let (mut backend, mut renderer) = setup(&small_config());
        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_line(&Vec3::zeros(), &Vec3::x(), &white(), -1);
        renderer.draw_circle(&Mat4::identity(), &white(), 1.0, 0.005, -1);
        renderer.draw_quad(&Mat4::identity(), &white(), -1);
        renderer.set_line_width(3.0);
        renderer.end_scene(&mut backend).unwrap();

        let draws: Vec<_> = backend.draw_commands().into_iter().cloned().collect();
        assert_eq!(draws.len(), 3);
        assert!(matches!(draws[0], RenderCmd::DrawIndexed { index_count: 6, .. }));
        assert!(matches!(draws[2], RenderCmd::DrawLines { vertex_count: 2, .. }));
        assert!(backend.submitted().contains(&RenderCmd::SetLineWidth(3.0)));
        assert_eq!(renderer.statistics().draw_calls, 3);
    }

    #[test]
    fn test_empty_scene_issues_no_draws() {
        let (mut backend, mut renderer) = setup(&small_config());
        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.end_scene(&mut backend).unwrap();
        assert!(backend.draw_commands().is_empty());
        assert_eq!(renderer.statistics().draw_calls, 0);
    }

    #[test]
    fn test_textured_quad_without_texture_is_noop() {
        let (mut backend, mut renderer) = setup(&small_config());
        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_textured_quad(&Mat4::identity(), None, 1.0, &white(), 1);
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.statistics().quad_count, 0);
        assert!(backend.draw_commands().is_empty());
    }

    #[test]
    fn test_texture_slot_overflow_flushes() {
        let config = Renderer2DConfig {
            max_texture_slots: 4,
            ..small_config()
        };
        let (mut backend, mut renderer) = setup(&config);
        let textures: Vec<_> = (0..4)
            .map(|_| Texture2D::create(&mut backend, &TextureSpecification::rgba8(2, 2), None).unwrap())
            .collect();

        renderer.begin_scene_view_projection(&Mat4::identity());
        for texture in &textures[..3] {
            renderer.draw_textured_quad(&Mat4::identity(), Some(texture), 1.0, &white(), -1);
        }
        renderer.draw_textured_quad(&Mat4::identity(), Some(&textures[0]), 1.0, &white(), -1);
        assert_eq!(renderer.bound_texture_count(), 4);
        assert_eq!(renderer.statistics().draw_calls, 0);

        renderer.draw_textured_quad(&Mat4::identity(), Some(&textures[3]), 1.0, &white(), -1);
        assert_eq!(renderer.statistics().draw_calls, 1);
        assert_eq!(renderer.bound_texture_count(), 2);
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.statistics().draw_calls, 2);
    }

    #[test]
    fn test_default_slots_hold_white_and_31_textures() {
        let config = Renderer2DConfig::default();
        assert_eq!(config.max_texture_slots, 32);
        let (mut backend, mut renderer) = setup(&config);
        let textures: Vec<_> = (0..32)
            .map(|_| Texture2D::create(&mut backend, &TextureSpecification::rgba8(2, 2), None).unwrap())
            .collect();

        renderer.begin_scene_view_projection(&Mat4::identity());
        for texture in &textures[..31] {
            renderer.draw_textured_quad(&Mat4::identity(), Some(texture), 1.0, &white(), -1);
        }
        assert_eq!(renderer.bound_texture_count(), 32);
        assert_eq!(renderer.statistics().draw_calls, 0);

        renderer.draw_textured_quad(&Mat4::identity(), Some(&textures[31]), 1.0, &white(), -1);
        assert_eq!(renderer.statistics().draw_calls, 1);
        assert_eq!(renderer.bound_texture_count(), 2);
        renderer.end_scene(&mut backend).unwrap();
        assert_eq!(renderer.statistics().draw_calls, 2);
    }

    #[test]
    fn test_billboard_faces_camera() {
        let (_backend, mut renderer) = setup(&small_config());
        let camera = SceneCamera::perspective(1.0, 1.0, 0.1, 100.0).looking_at(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::zeros(),
            Vec3::y(),
        );
        renderer.begin_scene(&camera);

        let transform = renderer.billboard_transform(&Vec3::zeros(), &Vec2::new(1.0, 1.0));
        let normal = transform.transform_vector(&Vec3::z());
        assert_relative_eq!(normal, Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_draw_aabb_emits_twelve_lines() {
        let (mut backend, mut renderer) = setup(&Renderer2DConfig::default());
        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_aabb(&Aabb::default(), &Mat4::identity(), &white(), 4);
        assert_eq!(renderer.statistics().line_count, 12);
        renderer.end_scene(&mut backend).unwrap();
        assert!(backend
            .draw_commands()
            .iter()
            .any(|cmd| matches!(cmd, RenderCmd::DrawLines { vertex_count: 24, .. })));
    }

    #[test]
    fn test_draw_string_falls_back_to_question_mark() {
        let (mut backend, mut renderer) = setup(&small_config());
        let font = font_with(&['i', '?'], TextureHandle(900));

        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_string("Hi", Some(&font), &Mat4::identity(), &TextParams::default(), 5);
        renderer.end_scene(&mut backend).unwrap();

        assert!(backend
            .draw_commands()
            .iter()
            .any(|cmd| matches!(cmd, RenderCmd::DrawIndexed { index_count: 12, .. })));
        assert!(backend.submitted().contains(&RenderCmd::BindTexture {
            slot: 0,
            texture: TextureHandle(900),
        }));
    }

    #[test]
    fn test_draw_string_aborts_without_fallback() {
        let (mut backend, mut renderer) = setup(&small_config());
        let font = font_with(&['i'], TextureHandle(900));

        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_string("Hi", Some(&font), &Mat4::identity(), &TextParams::default(), 5);
        renderer.draw_string("x", None, &Mat4::identity(), &TextParams::default(), 5);
        renderer.end_scene(&mut backend).unwrap();

        assert!(backend.draw_commands().is_empty());
    }

    #[test]
    fn test_atlas_change_starts_new_batch() {
        let (mut backend, mut renderer) = setup(&small_config());
        let first = font_with(&['a'], TextureHandle(900));
        let second = font_with(&['a'], TextureHandle(901));

        renderer.begin_scene_view_projection(&Mat4::identity());
        renderer.draw_string("a", Some(&first), &Mat4::identity(), &TextParams::default(), -1);
        renderer.draw_string("a", Some(&second), &Mat4::identity(), &TextParams::default(), -1);
        renderer.end_scene(&mut backend).unwrap();

        assert_eq!(renderer.statistics().draw_calls, 2);
    }
}
