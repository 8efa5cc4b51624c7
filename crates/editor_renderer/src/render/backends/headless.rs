//! CPU reference backend
//!
//! `HeadlessBackend` implements [`RendererBackend`] without a GPU. Resources
//! live in hash maps, every submitted [`RenderCmd`] is recorded for
//! inspection, and framebuffers carry CPU planes for their integer and depth
//! attachments. Triangles drawn with a pipeline that writes entity IDs are
//! rasterised into the bound framebuffer's first `RedInteger` attachment with
//! a depth test, which is enough for picking to work end to end.
//!
//! Colour attachments are placeholders: shading is not emulated.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;

use image::{Rgba, RgbaImage};
use log::{debug, trace, warn};

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{
    BackendResult, BlitMask, BufferLayout, FramebufferHandle, FramebufferSpecification,
    FramebufferTextureFormat, IndexBufferHandle, PipelineHandle, PipelineSpecification,
    RendererBackend, ShaderDataType, TextureHandle, TextureSpecification, VertexArrayHandle,
    VertexBufferHandle, VertexStep,
};
use crate::render::camera::CameraUniform;
use crate::render::commands::{RenderCmd, UniformValue};
use crate::render::RenderError;

/// Largest framebuffer edge accepted by `create_framebuffer` and `resize_framebuffer`
pub const MAX_FRAMEBUFFER_SIZE: u32 = 8192;

/// Viewport rectangle in pixels, bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// What a sampler slot is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerBinding {
    /// Standalone texture
    Texture(TextureHandle),
    /// Colour attachment of a framebuffer
    ColorAttachment {
        /// Framebuffer
        framebuffer: FramebufferHandle,
        /// Attachment index
        attachment: usize,
    },
    /// Depth attachment of a framebuffer
    DepthAttachment(FramebufferHandle),
}

#[derive(Debug)]
struct VertexBufferData {
    layout: BufferLayout,
    capacity: usize,
    data: Vec<u8>,
}

#[derive(Debug)]
struct VertexArrayData {
    vertex_buffers: Vec<VertexBufferHandle>,
    index_buffer: Option<IndexBufferHandle>,
}

#[derive(Debug, Clone)]
enum Plane {
    Color,
    Integer(Vec<i32>),
    Depth(Vec<f32>),
}

impl Plane {
    fn allocate(format: FramebufferTextureFormat, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        if format.is_integer() {
            Self::Integer(vec![0; len])
        } else if format.is_depth() {
            Self::Depth(vec![1.0; len])
        } else {
            Self::Color
        }
    }
}

#[derive(Debug)]
struct FramebufferData {
    spec: FramebufferSpecification,
    planes: Vec<Plane>,
    attachment_textures: Vec<TextureHandle>,
}

#[derive(Debug)]
struct PipelineData {
    spec: PipelineSpecification,
    uniforms: HashMap<String, UniformValue>,
}

impl PipelineData {
    fn mat4(&self, name: &str) -> Option<Mat4> {
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4(matrix)) => Some(*matrix),
            _ => None,
        }
    }

    fn int(&self, name: &str) -> Option<i32> {
        match self.uniforms.get(name) {
            Some(UniformValue::Int(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Triangle in window space: `x`, `y` in pixels, `z` in [0, 1]
#[derive(Debug, Clone, Copy)]
struct ScreenTriangle {
    corners: [Vec3; 3],
    id: i32,
}

/// Software backend used by tests and the demo application
#[derive(Debug)]
pub struct HeadlessBackend {
    next_handle: u64,
    vertex_buffers: HashMap<VertexBufferHandle, VertexBufferData>,
    index_buffers: HashMap<IndexBufferHandle, Vec<u32>>,
    vertex_arrays: HashMap<VertexArrayHandle, VertexArrayData>,
    textures: HashMap<TextureHandle, TextureSpecification>,
    framebuffers: HashMap<FramebufferHandle, FramebufferData>,
    pipelines: HashMap<PipelineHandle, PipelineData>,

    bound_framebuffer: Option<FramebufferHandle>,
    bound_pipeline: Option<PipelineHandle>,
    samplers: HashMap<u32, SamplerBinding>,
    camera: Option<CameraUniform>,
    viewport: Option<Viewport>,
    clear_color: Vec4,
    line_width: f32,
    blend_enabled: bool,

    submitted: Vec<RenderCmd>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(kind: &str, handle: impl Debug) -> RenderError {
    RenderError::BackendError(format!("unknown {kind} {handle:?}"))
}

fn read_f32(data: &[u8], offset: usize) -> Option<f32> {
    data.get(offset..offset + 4).map(bytemuck::pod_read_unaligned::<f32>)
}

fn read_i32(data: &[u8], offset: usize) -> Option<i32> {
    data.get(offset..offset + 4).map(bytemuck::pod_read_unaligned::<i32>)
}

fn read_vec3(data: &[u8], offset: usize) -> Option<Vec3> {
    Some(Vec3::new(
        read_f32(data, offset)?,
        read_f32(data, offset + 4)?,
        read_f32(data, offset + 8)?,
    ))
}

fn read_mat4(data: &[u8], offset: usize) -> Option<Mat4> {
    let mut columns = [0.0_f32; 16];
    for (i, value) in columns.iter_mut().enumerate() {
        *value = read_f32(data, offset + i * 4)?;
    }
    Some(Mat4::from_column_slice(&columns))
}

fn edge(a: &Vec3, b: &Vec3, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Nearest-neighbour copy between planes of possibly different sizes
fn resample<T: Copy>(src: &[T], src_size: (usize, usize), dst: &mut [T], dst_size: (usize, usize)) {
    let (sw, sh) = src_size;
    let (dw, dh) = dst_size;
    if sw == 0 || sh == 0 {
        return;
    }
    for y in 0..dh {
        let sy = y * sh / dh;
        for x in 0..dw {
            let sx = x * sw / dw;
            dst[y * dw + x] = src[sy * sw + sx];
        }
    }
}

/// False colour for an entity ID; negative IDs are black
fn id_color(id: i32) -> Rgba<u8> {
    if id < 0 {
        return Rgba([0, 0, 0, 255]);
    }
    let hash = id.unsigned_abs().wrapping_add(1).wrapping_mul(0x9E37_79B1);
    let [r, g, b, _] = hash.to_le_bytes();
    Rgba([r | 0x40, g | 0x40, b | 0x40, 255])
}

impl HeadlessBackend {
    /// Backend with no resources
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            vertex_buffers: HashMap::new(),
            index_buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            pipelines: HashMap::new(),
            bound_framebuffer: None,
            bound_pipeline: None,
            samplers: HashMap::new(),
            camera: None,
            viewport: None,
            clear_color: Vec4::zeros(),
            line_width: 1.0,
            blend_enabled: false,
            submitted: Vec::new(),
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Every command submitted so far, in order
    pub fn submitted(&self) -> &[RenderCmd] {
        &self.submitted
    }

    /// Submitted draw commands only
    pub fn draw_commands(&self) -> Vec<&RenderCmd> {
        self.submitted.iter().filter(|command| command.is_draw()).collect()
    }

    /// Forget the command history (resources and bound state are kept)
    pub fn clear_submitted(&mut self) {
        self.submitted.clear();
    }

    /// Currently bound framebuffer
    pub const fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    /// Currently bound pipeline
    pub const fn bound_pipeline(&self) -> Option<PipelineHandle> {
        self.bound_pipeline
    }

    /// Last camera uniform uploaded
    pub const fn camera(&self) -> Option<&CameraUniform> {
        self.camera.as_ref()
    }

    /// Active viewport
    pub const fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Current clear colour
    pub const fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    /// Current line width
    pub const fn line_width(&self) -> f32 {
        self.line_width
    }

    /// Whether blending is enabled
    pub const fn blend_enabled(&self) -> bool {
        self.blend_enabled
    }

    /// Binding of a sampler slot
    pub fn sampler(&self, slot: u32) -> Option<SamplerBinding> {
        self.samplers.get(&slot).copied()
    }

    /// Specification a pipeline was created with
    pub fn pipeline_specification(&self, pipeline: PipelineHandle) -> Option<&PipelineSpecification> {
        self.pipelines.get(&pipeline).map(|data| &data.spec)
    }

    /// Last value of a uniform set on `pipeline`
    pub fn uniform(&self, pipeline: PipelineHandle, name: &str) -> Option<&UniformValue> {
        self.pipelines.get(&pipeline)?.uniforms.get(name)
    }

    /// Bytes last uploaded to a vertex buffer
    pub fn vertex_buffer_data(&self, buffer: VertexBufferHandle) -> Option<&[u8]> {
        self.vertex_buffers.get(&buffer).map(|data| data.data.as_slice())
    }

    /// Stored depth at `(x, y)` (bottom-left origin)
    pub fn depth_at(&self, framebuffer: FramebufferHandle, x: u32, y: u32) -> Option<f32> {
        let data = self.framebuffers.get(&framebuffer)?;
        if x >= data.spec.width || y >= data.spec.height {
            return None;
        }
        let index = data.spec.depth_attachment()?;
        match &data.planes[index] {
            Plane::Depth(values) => values.get((y * data.spec.width + x) as usize).copied(),
            _ => None,
        }
    }

    /// Number of live resources of every kind
    pub fn resource_count(&self) -> usize {
        self.vertex_buffers.len()
            + self.index_buffers.len()
            + self.vertex_arrays.len()
            + self.textures.len()
            + self.framebuffers.len()
            + self.pipelines.len()
    }

    /// Export an integer attachment as a false-colour image (row 0 at the top)
    pub fn object_id_image(
        &self,
        framebuffer: FramebufferHandle,
        attachment: usize,
    ) -> BackendResult<RgbaImage> {
        let data = self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| unknown("framebuffer", framebuffer))?;
        let Some(Plane::Integer(values)) = data.planes.get(attachment) else {
            return Err(RenderError::BackendError(format!(
                "attachment {attachment} of {framebuffer:?} is not an integer attachment"
            )));
        };

        let (width, height) = (data.spec.width, data.spec.height);
        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let row = height - 1 - y;
            id_color(values[(row * width + x) as usize])
        }))
    }

    fn bound_target(&mut self) -> Option<&mut FramebufferData> {
        let handle = self.bound_framebuffer?;
        self.framebuffers.get_mut(&handle)
    }

    fn clear(&mut self) {
        if let Some(target) = self.bound_target() {
            for plane in &mut target.planes {
                match plane {
                    Plane::Integer(values) => values.fill(0),
                    Plane::Depth(values) => values.fill(1.0),
                    Plane::Color => {}
                }
            }
        }
    }

    fn clear_attachment(&mut self, attachment: usize, value: i32) -> BackendResult<()> {
        let Some(target) = self.bound_target() else {
            return Ok(());
        };
        match target.planes.get_mut(attachment) {
            Some(Plane::Integer(values)) => {
                values.fill(value);
                Ok(())
            }
            _ => Err(RenderError::BackendError(format!(
                "cannot clear attachment {attachment}: not an integer attachment"
            ))),
        }
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> BackendResult<()> {
        let pipeline = self.bound_pipeline.ok_or_else(|| {
            RenderError::RenderingFailed(format!("uniform '{name}' set with no pipeline bound"))
        })?;
        let data = self
            .pipelines
            .get_mut(&pipeline)
            .ok_or_else(|| unknown("pipeline", pipeline))?;
        data.uniforms.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn upload(&mut self, buffer: VertexBufferHandle, bytes: &[u8]) -> BackendResult<()> {
        let data = self
            .vertex_buffers
            .get_mut(&buffer)
            .ok_or_else(|| unknown("vertex buffer", buffer))?;
        if bytes.len() > data.capacity {
            return Err(RenderError::RenderingFailed(format!(
                "upload of {} bytes exceeds vertex buffer capacity {}",
                bytes.len(),
                data.capacity
            )));
        }
        data.data.clear();
        data.data.extend_from_slice(bytes);
        Ok(())
    }

    fn blit(
        &mut self,
        source: FramebufferHandle,
        destination: FramebufferHandle,
        mask: BlitMask,
    ) -> BackendResult<()> {
        let src = self
            .framebuffers
            .get(&source)
            .ok_or_else(|| unknown("framebuffer", source))?;
        let src_size = (src.spec.width as usize, src.spec.height as usize);
        let src_planes = src.planes.clone();

        let dst = self
            .framebuffers
            .get_mut(&destination)
            .ok_or_else(|| unknown("framebuffer", destination))?;
        let dst_size = (dst.spec.width as usize, dst.spec.height as usize);

        if mask.contains(BlitMask::DEPTH) {
            let from = src_planes.iter().find_map(|plane| match plane {
                Plane::Depth(values) => Some(values),
                _ => None,
            });
            let to = dst.planes.iter_mut().find_map(|plane| match plane {
                Plane::Depth(values) => Some(values),
                _ => None,
            });
            if let (Some(from), Some(to)) = (from, to) {
                resample(from, src_size, to, dst_size);
            }
        }

        if mask.contains(BlitMask::COLOR) {
            let from = src_planes.iter().filter_map(|plane| match plane {
                Plane::Integer(values) => Some(values),
                _ => None,
            });
            let to = dst.planes.iter_mut().filter_map(|plane| match plane {
                Plane::Integer(values) => Some(values),
                _ => None,
            });
            for (from, to) in from.zip(to) {
                resample(from, src_size, to, dst_size);
            }
        }

        Ok(())
    }

    fn draw_triangles(
        &mut self,
        vertex_array: VertexArrayHandle,
        first_index: u32,
        index_count: u32,
        instance_count: Option<u32>,
    ) -> BackendResult<()> {
        let pipeline = self.bound_pipeline.ok_or_else(|| {
            RenderError::RenderingFailed("draw submitted with no pipeline bound".to_string())
        })?;
        let spec = self
            .pipelines
            .get(&pipeline)
            .ok_or_else(|| unknown("pipeline", pipeline))?
            .spec
            .clone();

        let triangles = self.assemble(pipeline, vertex_array, first_index, index_count, instance_count)?;
        if !spec.writes_object_id {
            return Ok(());
        }
        let Some(framebuffer) = self.bound_framebuffer else {
            return Ok(());
        };
        self.rasterise(framebuffer, &spec, &triangles)
    }

    /// Transform the referenced triangles to window space
    fn assemble(
        &self,
        pipeline: PipelineHandle,
        vertex_array: VertexArrayHandle,
        first_index: u32,
        index_count: u32,
        instance_count: Option<u32>,
    ) -> BackendResult<Vec<ScreenTriangle>> {
        let array = self
            .vertex_arrays
            .get(&vertex_array)
            .ok_or_else(|| unknown("vertex array", vertex_array))?;
        let pipeline = self
            .pipelines
            .get(&pipeline)
            .ok_or_else(|| unknown("pipeline", pipeline))?;

        let index_buffer = array.index_buffer.ok_or_else(|| {
            RenderError::RenderingFailed(format!("{vertex_array:?} has no index buffer"))
        })?;
        let indices = self
            .index_buffers
            .get(&index_buffer)
            .ok_or_else(|| unknown("index buffer", index_buffer))?;
        let start = first_index as usize;
        let end = start + index_count as usize;
        let indices = indices.get(start..end).ok_or_else(|| {
            RenderError::RenderingFailed(format!(
                "index range {start}..{end} exceeds index buffer of {} indices",
                indices.len()
            ))
        })?;

        let mut per_vertex = None;
        let mut per_instance = None;
        for handle in &array.vertex_buffers {
            let buffer = self
                .vertex_buffers
                .get(handle)
                .ok_or_else(|| unknown("vertex buffer", handle))?;
            match buffer.layout.step() {
                VertexStep::Vertex if per_vertex.is_none() => per_vertex = Some(buffer),
                VertexStep::Instance if per_instance.is_none() => per_instance = Some(buffer),
                _ => {}
            }
        }

        if !pipeline.spec.writes_object_id {
            return Ok(Vec::new());
        }
        let Some(vertices) = per_vertex else {
            return Ok(Vec::new());
        };
        let Some(position) = vertices
            .layout
            .elements()
            .iter()
            .find(|element| element.data_type == ShaderDataType::Float3)
        else {
            return Ok(Vec::new());
        };
        let vertex_id = vertices
            .layout
            .find("a_ObjectID")
            .filter(|element| element.data_type == ShaderDataType::Int);
        let uniform_id = pipeline.int("u_ObjectID");
        let view_projection = self
            .camera
            .map(|camera| camera.view_projection)
            .or_else(|| pipeline.mat4("u_ViewProjection"))
            .unwrap_or_else(Mat4::identity);

        let instances: Vec<(Mat4, Option<i32>)> = match instance_count {
            None => vec![(pipeline.mat4("u_Model").unwrap_or_else(Mat4::identity), None)],
            Some(count) => {
                let buffer = per_instance.ok_or_else(|| {
                    RenderError::RenderingFailed(format!(
                        "instanced draw on {vertex_array:?} without a per-instance buffer"
                    ))
                })?;
                let stride = buffer.layout.stride();
                if count as usize * stride > buffer.data.len() {
                    return Err(RenderError::RenderingFailed(format!(
                        "{count} instances exceed the uploaded instance data"
                    )));
                }
                let transform = buffer.layout.find("a_Transform");
                let id = buffer.layout.find("a_ObjectID");
                (0..count as usize)
                    .map(|instance| {
                        let base = instance * stride;
                        let matrix = transform
                            .and_then(|element| read_mat4(&buffer.data, base + element.offset))
                            .unwrap_or_else(Mat4::identity);
                        let id = id.and_then(|element| read_i32(&buffer.data, base + element.offset));
                        (matrix, id)
                    })
                    .collect()
            }
        };

        let viewport = self.viewport.unwrap_or(Viewport {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        });
        let stride = vertices.layout.stride();
        let mut triangles = Vec::new();

        for (model, instance_id) in instances {
            let mvp = view_projection * model;
            'triangles: for triangle in indices.chunks_exact(3) {
                let mut corners = [Vec3::zeros(); 3];
                for (corner, &index) in corners.iter_mut().zip(triangle) {
                    let offset = index as usize * stride + position.offset;
                    let local = read_vec3(&vertices.data, offset).ok_or_else(|| {
                        RenderError::RenderingFailed(format!(
                            "index {index} reads past the uploaded vertex data"
                        ))
                    })?;
                    let clip = mvp * Vec4::new(local.x, local.y, local.z, 1.0);
                    if clip.w <= 0.0 {
                        continue 'triangles;
                    }
                    let ndc = clip.xyz() / clip.w;
                    *corner = Vec3::new(
                        viewport.x as f32 + (ndc.x * 0.5 + 0.5) * viewport.width as f32,
                        viewport.y as f32 + (ndc.y * 0.5 + 0.5) * viewport.height as f32,
                        ndc.z * 0.5 + 0.5,
                    );
                }

                let id = instance_id
                    .or_else(|| {
                        vertex_id.and_then(|element| {
                            read_i32(&vertices.data, triangle[0] as usize * stride + element.offset)
                        })
                    })
                    .or(uniform_id);
                if let Some(id) = id {
                    triangles.push(ScreenTriangle { corners, id });
                }
            }
        }

        Ok(triangles)
    }

    fn rasterise(
        &mut self,
        framebuffer: FramebufferHandle,
        spec: &PipelineSpecification,
        triangles: &[ScreenTriangle],
    ) -> BackendResult<()> {
        let viewport = self.viewport;
        let target = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| unknown("framebuffer", framebuffer))?;
        let width = target.spec.width as usize;
        let height = target.spec.height as usize;
        let Some(id_index) = target.spec.first_integer_attachment() else {
            return Ok(());
        };
        let depth_index = target.spec.depth_attachment();

        let mut ids = None;
        let mut depth = None;
        for (index, plane) in target.planes.iter_mut().enumerate() {
            match plane {
                Plane::Integer(values) if index == id_index => ids = Some(values),
                Plane::Depth(values) if Some(index) == depth_index => depth = Some(values),
                _ => {}
            }
        }
        let Some(ids) = ids else {
            return Ok(());
        };

        let (clip_x0, clip_y0, clip_x1, clip_y1) = viewport.map_or((0, 0, width, height), |v| {
            (
                v.x as usize,
                v.y as usize,
                (v.x + v.width) as usize,
                (v.y + v.height) as usize,
            )
        });
        let clip_x1 = clip_x1.min(width);
        let clip_y1 = clip_y1.min(height);

        for triangle in triangles {
            let [a, b, c] = triangle.corners;
            let area = edge(&a, &b, c.x, c.y);
            if area.abs() <= f32::EPSILON {
                continue;
            }

            let min_x = (a.x.min(b.x).min(c.x).floor().max(0.0) as usize).max(clip_x0);
            let min_y = (a.y.min(b.y).min(c.y).floor().max(0.0) as usize).max(clip_y0);
            let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as usize).min(clip_x1);
            let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as usize).min(clip_y1);

            for y in min_y..max_y {
                let py = y as f32 + 0.5;
                for x in min_x..max_x {
                    let px = x as f32 + 0.5;
                    let w0 = edge(&b, &c, px, py) / area;
                    let w1 = edge(&c, &a, px, py) / area;
                    let w2 = edge(&a, &b, px, py) / area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }

                    let z = w0 * a.z + w1 * b.z + w2 * c.z;
                    if !(0.0..=1.0).contains(&z) {
                        continue;
                    }

                    let index = y * width + x;
                    if spec.depth_test {
                        if let Some(depth) = depth.as_deref_mut() {
                            if !spec.depth_op.passes(z, depth[index]) {
                                continue;
                            }
                            if spec.depth_write {
                                depth[index] = z;
                            }
                        }
                    }
                    ids[index] = triangle.id;
                }
            }
        }

        Ok(())
    }

    fn allocate_attachments(&mut self, spec: &FramebufferSpecification) -> (Vec<Plane>, Vec<TextureHandle>) {
        let planes = spec
            .attachments
            .iter()
            .map(|&format| Plane::allocate(format, spec.width, spec.height))
            .collect();
        let textures = spec
            .attachments
            .iter()
            .map(|_| TextureHandle(self.allocate_handle()))
            .collect();
        (planes, textures)
    }
}

const fn valid_size(width: u32, height: u32) -> bool {
    width > 0 && height > 0 && width <= MAX_FRAMEBUFFER_SIZE && height <= MAX_FRAMEBUFFER_SIZE
}

impl RendererBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_vertex_buffer(
        &mut self,
        size: usize,
        layout: BufferLayout,
    ) -> BackendResult<VertexBufferHandle> {
        let handle = VertexBufferHandle(self.allocate_handle());
        self.vertex_buffers.insert(
            handle,
            VertexBufferData {
                layout,
                capacity: size,
                data: Vec::new(),
            },
        );
        trace!("created vertex buffer {handle:?} ({size} bytes)");
        Ok(handle)
    }

    fn create_vertex_buffer_with_data(
        &mut self,
        data: &[u8],
        layout: BufferLayout,
    ) -> BackendResult<VertexBufferHandle> {
        let handle = VertexBufferHandle(self.allocate_handle());
        self.vertex_buffers.insert(
            handle,
            VertexBufferData {
                layout,
                capacity: data.len(),
                data: data.to_vec(),
            },
        );
        Ok(handle)
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> BackendResult<IndexBufferHandle> {
        let handle = IndexBufferHandle(self.allocate_handle());
        self.index_buffers.insert(handle, indices.to_vec());
        Ok(handle)
    }

    fn create_vertex_array(
        &mut self,
        vertex_buffers: &[VertexBufferHandle],
        index_buffer: Option<IndexBufferHandle>,
    ) -> BackendResult<VertexArrayHandle> {
        if let Some(missing) = vertex_buffers
            .iter()
            .find(|handle| !self.vertex_buffers.contains_key(*handle))
        {
            return Err(unknown("vertex buffer", missing));
        }
        if let Some(index_buffer) = index_buffer {
            if !self.index_buffers.contains_key(&index_buffer) {
                return Err(unknown("index buffer", index_buffer));
            }
        }

        let handle = VertexArrayHandle(self.allocate_handle());
        self.vertex_arrays.insert(
            handle,
            VertexArrayData {
                vertex_buffers: vertex_buffers.to_vec(),
                index_buffer,
            },
        );
        Ok(handle)
    }

    fn create_texture(
        &mut self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        if let Some(data) = data {
            if data.len() != spec.data_size() {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "texture data is {} bytes, expected {}",
                    data.len(),
                    spec.data_size()
                )));
            }
        }
        let handle = TextureHandle(self.allocate_handle());
        self.textures.insert(handle, spec.clone());
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        spec: &FramebufferSpecification,
    ) -> BackendResult<FramebufferHandle> {
        if !valid_size(spec.width, spec.height) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "invalid framebuffer size {}x{}",
                spec.width, spec.height
            )));
        }
        if spec.attachments.iter().filter(|format| format.is_depth()).count() > 1 {
            return Err(RenderError::ResourceCreationFailed(
                "a framebuffer can have at most one depth attachment".to_string(),
            ));
        }

        let (planes, attachment_textures) = self.allocate_attachments(spec);
        let handle = FramebufferHandle(self.allocate_handle());
        self.framebuffers.insert(
            handle,
            FramebufferData {
                spec: spec.clone(),
                planes,
                attachment_textures,
            },
        );
        debug!(
            "created framebuffer {handle:?} {}x{} with {} attachments",
            spec.width,
            spec.height,
            spec.attachments.len()
        );
        Ok(handle)
    }

    fn resize_framebuffer(
        &mut self,
        framebuffer: FramebufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if !valid_size(width, height) {
            warn!("attempted to resize framebuffer to {width}x{height}");
            return Ok(());
        }

        let mut spec = self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| unknown("framebuffer", framebuffer))?
            .spec
            .clone();
        if spec.width == width && spec.height == height {
            return Ok(());
        }
        spec.width = width;
        spec.height = height;

        let (planes, attachment_textures) = self.allocate_attachments(&spec);
        if let Some(data) = self.framebuffers.get_mut(&framebuffer) {
            data.spec = spec;
            data.planes = planes;
            data.attachment_textures = attachment_textures;
        }
        Ok(())
    }

    fn framebuffer_specification(
        &self,
        framebuffer: FramebufferHandle,
    ) -> Option<FramebufferSpecification> {
        self.framebuffers.get(&framebuffer).map(|data| data.spec.clone())
    }

    fn create_pipeline(&mut self, spec: &PipelineSpecification) -> BackendResult<PipelineHandle> {
        let handle = PipelineHandle(self.allocate_handle());
        self.pipelines.insert(
            handle,
            PipelineData {
                spec: spec.clone(),
                uniforms: HashMap::new(),
            },
        );
        trace!("created pipeline {handle:?} for shader '{}'", spec.shader);
        Ok(handle)
    }

    fn color_attachment_renderer_id(
        &self,
        framebuffer: FramebufferHandle,
        index: usize,
    ) -> Option<TextureHandle> {
        let data = self.framebuffers.get(&framebuffer)?;
        if data.spec.attachments.get(index)?.is_depth() {
            return None;
        }
        data.attachment_textures.get(index).copied()
    }

    fn read_pixel(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: usize,
        x: i32,
        y: i32,
    ) -> BackendResult<i32> {
        let data = self
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| unknown("framebuffer", framebuffer))?;
        let Some(Plane::Integer(values)) = data.planes.get(attachment) else {
            return Err(RenderError::BackendError(format!(
                "attachment {attachment} of {framebuffer:?} is not an integer attachment"
            )));
        };

        let (width, height) = (data.spec.width as i32, data.spec.height as i32);
        if !(0..width).contains(&x) || !(0..height).contains(&y) {
            return Err(RenderError::BackendError(format!(
                "pixel ({x}, {y}) outside {width}x{height} framebuffer"
            )));
        }
        Ok(values[(y * width + x) as usize])
    }

    fn submit(&mut self, command: &RenderCmd) -> BackendResult<()> {
        self.submitted.push(command.clone());

        match command {
            RenderCmd::SetViewport {
                x,
                y,
                width,
                height,
            } => {
                self.viewport = Some(Viewport {
                    x: *x,
                    y: *y,
                    width: *width,
                    height: *height,
                });
            }
            RenderCmd::SetClearColor(color) => self.clear_color = *color,
            RenderCmd::Clear => self.clear(),
            RenderCmd::ClearAttachment { attachment, value } => {
                self.clear_attachment(*attachment, *value)?;
            }
            RenderCmd::SetBlendEnabled(enabled) => self.blend_enabled = *enabled,
            RenderCmd::SetLineWidth(width) => self.line_width = *width,
            RenderCmd::BindPipeline(pipeline) => {
                if !self.pipelines.contains_key(pipeline) {
                    return Err(unknown("pipeline", pipeline));
                }
                self.bound_pipeline = Some(*pipeline);
            }
            RenderCmd::BindFramebuffer(framebuffer) => {
                let data = self
                    .framebuffers
                    .get(framebuffer)
                    .ok_or_else(|| unknown("framebuffer", framebuffer))?;
                self.viewport = Some(Viewport {
                    x: 0,
                    y: 0,
                    width: data.spec.width,
                    height: data.spec.height,
                });
                self.bound_framebuffer = Some(*framebuffer);
            }
            RenderCmd::UnbindFramebuffer => self.bound_framebuffer = None,
            RenderCmd::BindTexture { slot, texture } => {
                if !self.textures.contains_key(texture) {
                    trace!("binding texture {texture:?} not created by this backend");
                }
                self.samplers.insert(*slot, SamplerBinding::Texture(*texture));
            }
            RenderCmd::BindColorAttachment {
                slot,
                framebuffer,
                attachment,
            } => {
                if self.color_attachment_renderer_id(*framebuffer, *attachment).is_none() {
                    return Err(RenderError::BackendError(format!(
                        "{framebuffer:?} has no colour attachment {attachment}"
                    )));
                }
                self.samplers.insert(
                    *slot,
                    SamplerBinding::ColorAttachment {
                        framebuffer: *framebuffer,
                        attachment: *attachment,
                    },
                );
            }
            RenderCmd::BindDepthAttachment { slot, framebuffer } => {
                if !self.framebuffers.contains_key(framebuffer) {
                    return Err(unknown("framebuffer", framebuffer));
                }
                self.samplers
                    .insert(*slot, SamplerBinding::DepthAttachment(*framebuffer));
            }
            RenderCmd::SetUniform { name, value } => self.set_uniform(name, value)?,
            RenderCmd::UpdateCamera(camera) => self.camera = Some(*camera),
            RenderCmd::UploadVertexData { buffer, data } => self.upload(*buffer, data)?,
            RenderCmd::BlitFramebuffer {
                source,
                destination,
                mask,
            } => self.blit(*source, *destination, *mask)?,
            RenderCmd::DrawIndexed {
                vertex_array,
                index_count,
                first_index,
            } => self.draw_triangles(*vertex_array, *first_index, *index_count, None)?,
            RenderCmd::DrawIndexedInstanced {
                vertex_array,
                index_count,
                instance_count,
            } => self.draw_triangles(*vertex_array, 0, *index_count, Some(*instance_count))?,
            RenderCmd::DrawLines { vertex_array, .. } => {
                if !self.vertex_arrays.contains_key(vertex_array) {
                    return Err(unknown("vertex array", vertex_array));
                }
            }
        }

        Ok(())
    }

    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        if self.vertex_buffers.remove(&handle).is_none() {
            debug!("destroy of unknown vertex buffer {handle:?}");
        }
    }

    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) {
        if self.index_buffers.remove(&handle).is_none() {
            debug!("destroy of unknown index buffer {handle:?}");
        }
    }

    fn destroy_vertex_array(&mut self, handle: VertexArrayHandle) {
        if self.vertex_arrays.remove(&handle).is_none() {
            debug!("destroy of unknown vertex array {handle:?}");
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_none() {
            debug!("destroy of unknown texture {handle:?}");
        }
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        if self.framebuffers.remove(&handle).is_none() {
            debug!("destroy of unknown framebuffer {handle:?}");
        }
        if self.bound_framebuffer == Some(handle) {
            self.bound_framebuffer = None;
        }
    }

    fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        if self.pipelines.remove(&handle).is_none() {
            debug!("destroy of unknown pipeline {handle:?}");
        }
        if self.bound_pipeline == Some(handle) {
            self.bound_pipeline = None;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    struct TestVertex {
        position: [f32; 3],
        object_id: i32,
    }

    fn test_layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Int, "a_ObjectID"),
        ])
    }

    fn square(half: f32, z: f32, object_id: i32) -> [TestVertex; 4] {
        [
            TestVertex { position: [-half, -half, z], object_id },
            TestVertex { position: [half, -half, z], object_id },
            TestVertex { position: [half, half, z], object_id },
            TestVertex { position: [-half, half, z], object_id },
        ]
    }

    struct Fixture {
        backend: HeadlessBackend,
        framebuffer: FramebufferHandle,
        pipeline: PipelineHandle,
    }

    fn fixture() -> Fixture {
        let mut backend = HeadlessBackend::new();
        let framebuffer = backend
            .create_framebuffer(&FramebufferSpecification::new(
                8,
                8,
                vec![
                    FramebufferTextureFormat::Rgba8,
                    FramebufferTextureFormat::RedInteger,
                    FramebufferTextureFormat::Depth24Stencil8,
                ],
            ))
            .unwrap();
        let pipeline = backend
            .create_pipeline(&PipelineSpecification::new("Test").with_object_id())
            .unwrap();
        backend.submit(&RenderCmd::BindFramebuffer(framebuffer)).unwrap();
        backend
            .submit(&RenderCmd::ClearAttachment {
                attachment: 1,
                value: -1,
            })
            .unwrap();
        backend.submit(&RenderCmd::BindPipeline(pipeline)).unwrap();
        Fixture {
            backend,
            framebuffer,
            pipeline,
        }
    }

    fn draw_square(backend: &mut HeadlessBackend, vertices: &[TestVertex; 4]) {
        let buffer = backend
            .create_vertex_buffer_with_data(bytemuck::cast_slice(vertices), test_layout())
            .unwrap();
        let indices = backend.create_index_buffer(&[0, 1, 2, 2, 3, 0]).unwrap();
        let array = backend.create_vertex_array(&[buffer], Some(indices)).unwrap();
        backend
            .submit(&RenderCmd::DrawIndexed {
                vertex_array: array,
                index_count: 6,
                first_index: 0,
            })
            .unwrap();
    }

    #[test]
    fn test_records_submitted_commands() {
        let mut backend = HeadlessBackend::new();
        backend.submit(&RenderCmd::SetLineWidth(4.0)).unwrap();
        backend.submit(&RenderCmd::SetBlendEnabled(true)).unwrap();

        assert_eq!(backend.submitted().len(), 2);
        assert!(backend.draw_commands().is_empty());
        assert_relative_eq!(backend.line_width(), 4.0);
        assert!(backend.blend_enabled());
    }

    #[test]
    fn test_clear_attachment_and_read_pixel() {
        let mut f = fixture();
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 3, 3).unwrap(), -1);
        assert!(f.backend.read_pixel(f.framebuffer, 0, 3, 3).is_err());
        assert!(f.backend.read_pixel(f.framebuffer, 1, 8, 0).is_err());
        assert!(f.backend.read_pixel(f.framebuffer, 1, 0, -1).is_err());
    }

    #[test]
    fn test_rasterises_object_id_inside_triangle_only() {
        let mut f = fixture();
        draw_square(&mut f.backend, &square(0.5, 0.0, 7));

        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 4, 4).unwrap(), 7);
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 2, 5).unwrap(), 7);
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 0, 0).unwrap(), -1);
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 7, 7).unwrap(), -1);
        assert_eq!(f.backend.draw_commands().len(), 1);
    }

    #[test]
    fn test_depth_test_keeps_nearest_surface() {
        let mut f = fixture();
        draw_square(&mut f.backend, &square(0.5, 0.2, 1));
        draw_square(&mut f.backend, &square(0.5, -0.5, 2));
        draw_square(&mut f.backend, &square(0.5, 0.8, 3));

        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 4, 4).unwrap(), 2);
        assert_relative_eq!(f.backend.depth_at(f.framebuffer, 4, 4).unwrap(), 0.25);
    }

    #[test]
    fn test_pipeline_without_object_id_leaves_attachment() {
        let mut f = fixture();
        let plain = f.backend.create_pipeline(&PipelineSpecification::new("Plain")).unwrap();
        f.backend.submit(&RenderCmd::BindPipeline(plain)).unwrap();
        draw_square(&mut f.backend, &square(0.5, 0.0, 9));

        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 4, 4).unwrap(), -1);
    }

    #[test]
    fn test_uniform_object_id_and_model() {
        let mut f = fixture();
        let layout = BufferLayout::new(&[(ShaderDataType::Float3, "a_Position")]);
        let positions: [f32; 12] = [
            -0.25, -0.25, 0.0, 0.25, -0.25, 0.0, 0.25, 0.25, 0.0, -0.25, 0.25, 0.0,
        ];
        let buffer = f
            .backend
            .create_vertex_buffer_with_data(bytemuck::cast_slice(&positions), layout)
            .unwrap();
        let indices = f.backend.create_index_buffer(&[0, 1, 2, 2, 3, 0]).unwrap();
        let array = f.backend.create_vertex_array(&[buffer], Some(indices)).unwrap();

        let model = Mat4::new_translation(&Vec3::new(0.5, 0.5, 0.0));
        f.backend.submit(&RenderCmd::uniform("u_Model", UniformValue::Mat4(model))).unwrap();
        f.backend.submit(&RenderCmd::uniform("u_ObjectID", UniformValue::Int(42))).unwrap();
        f.backend
            .submit(&RenderCmd::DrawIndexed {
                vertex_array: array,
                index_count: 6,
                first_index: 0,
            })
            .unwrap();

        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 6, 6).unwrap(), 42);
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 4, 4).unwrap(), -1);
        assert_eq!(
            f.backend.uniform(f.pipeline, "u_ObjectID"),
            Some(&UniformValue::Int(42))
        );
    }

    #[test]
    fn test_uniform_requires_bound_pipeline() {
        let mut backend = HeadlessBackend::new();
        let result = backend.submit(&RenderCmd::uniform("u_Color", UniformValue::Float(1.0)));
        assert!(result.is_err());
    }

    #[test]
    fn test_resize_rejects_zero_size() {
        let mut f = fixture();
        f.backend.resize_framebuffer(f.framebuffer, 0, 16).unwrap();
        let spec = f.backend.framebuffer_specification(f.framebuffer).unwrap();
        assert_eq!((spec.width, spec.height), (8, 8));

        f.backend.resize_framebuffer(f.framebuffer, 16, 4).unwrap();
        let spec = f.backend.framebuffer_specification(f.framebuffer).unwrap();
        assert_eq!((spec.width, spec.height), (16, 4));
        assert_eq!(f.backend.read_pixel(f.framebuffer, 1, 15, 3).unwrap(), 0);
    }

    #[test]
    fn test_blit_copies_depth() {
        let mut f = fixture();
        draw_square(&mut f.backend, &square(1.0, 0.0, 5));
        let copy = f
            .backend
            .create_framebuffer(&FramebufferSpecification::new(
                8,
                8,
                vec![FramebufferTextureFormat::DepthComponent32F],
            ))
            .unwrap();
        f.backend
            .submit(&RenderCmd::BlitFramebuffer {
                source: f.framebuffer,
                destination: copy,
                mask: BlitMask::DEPTH,
            })
            .unwrap();

        assert_relative_eq!(f.backend.depth_at(copy, 2, 2).unwrap(), 0.5);
    }

    #[test]
    fn test_object_id_image_flips_rows() {
        let mut f = fixture();
        draw_square(&mut f.backend, &square(0.5, 0.0, 3));
        let image = f.backend.object_id_image(f.framebuffer, 1).unwrap();

        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*image.get_pixel(4, 4), id_color(3));
        assert!(f.backend.object_id_image(f.framebuffer, 0).is_err());
    }

    #[test]
    fn test_color_attachment_ids() {
        let f = fixture();
        assert!(f.backend.color_attachment_renderer_id(f.framebuffer, 0).is_some());
        assert!(f.backend.color_attachment_renderer_id(f.framebuffer, 2).is_none());
        assert!(f.backend.color_attachment_renderer_id(f.framebuffer, 5).is_none());
    }
}
