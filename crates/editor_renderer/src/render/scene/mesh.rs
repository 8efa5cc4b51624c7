//! Meshes and materials submitted to the scene renderer

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Aabb, Vec3, Vec4};
use crate::render::api::{
    BackendResult, BufferLayout, IndexBufferHandle, RendererBackend, ShaderDataType,
    VertexArrayHandle, VertexBufferHandle,
};
use crate::render::commands::{CommandBuffer, RenderCmd, UniformValue};
use crate::render::texture::Texture2D;

/// Vertex of a static mesh
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl MeshVertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Attribute layout shared by every mesh pipeline
    pub fn layout() -> BufferLayout {
        BufferLayout::new(&[
            (ShaderDataType::Float3, "a_Position"),
            (ShaderDataType::Float3, "a_Normal"),
            (ShaderDataType::Float2, "a_TexCoord"),
        ])
    }
}

/// Index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    /// First index
    pub index_offset: u32,
    /// Number of indices
    pub index_count: u32,
}

/// Static mesh uploaded to the backend
#[derive(Debug)]
pub struct Mesh {
    vertex_buffer: VertexBufferHandle,
    index_buffer: IndexBufferHandle,
    vertex_array: VertexArrayHandle,
    submeshes: Vec<Submesh>,
    bounds: Aabb,
}

impl Mesh {
    /// Upload vertices and indices; an empty submesh list draws every index with material 0
    pub fn create(
        backend: &mut dyn RendererBackend,
        vertices: &[MeshVertex],
        indices: &[u32],
        submeshes: Vec<Submesh>,
    ) -> BackendResult<Self> {
        let vertex_buffer =
            backend.create_vertex_buffer_with_data(bytemuck::cast_slice(vertices), MeshVertex::layout())?;
        let index_buffer = backend.create_index_buffer(indices)?;
        let vertex_array = backend.create_vertex_array(&[vertex_buffer], Some(index_buffer))?;

        let submeshes = if submeshes.is_empty() {
            vec![Submesh {
                index_offset: 0,
                index_count: indices.len() as u32,
            }]
        } else {
            submeshes
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_array,
            submeshes,
            bounds: bounds_of(vertices),
        })
    }

    /// Unit cube centred on the origin, one submesh
    pub fn cube(backend: &mut dyn RendererBackend) -> BackendResult<Self> {
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]]),
            ([0.0, 0.0, -1.0], [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]]),
            ([-1.0, 0.0, 0.0], [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]]),
            ([1.0, 0.0, 0.0], [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]]),
            ([0.0, 1.0, 0.0], [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]]),
            ([0.0, -1.0, 0.0], [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]]),
        ];
        let tex_coords = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, corners)) in faces.iter().enumerate() {
            let base = face as u32 * 4;
            for (corner, tex_coord) in corners.iter().zip(tex_coords) {
                vertices.push(MeshVertex::new(*corner, *normal, tex_coord));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::create(backend, &vertices, &indices, Vec::new())
    }

    /// Release the GPU buffers
    pub fn destroy(&self, backend: &mut dyn RendererBackend) {
        backend.destroy_vertex_array(self.vertex_array);
        backend.destroy_vertex_buffer(self.vertex_buffer);
        backend.destroy_index_buffer(self.index_buffer);
    }

    /// Vertex array drawn by every submesh
    pub const fn vertex_array(&self) -> VertexArrayHandle {
        self.vertex_array
    }

    /// Index ranges in material order
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    /// Object-space bounds
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }
}

fn bounds_of(vertices: &[MeshVertex]) -> Aabb {
    if vertices.is_empty() {
        return Aabb::new(Vec3::zeros(), Vec3::zeros());
    }
    let mut min = Vec3::repeat(f32::MAX);
    let mut max = Vec3::repeat(f32::MIN);
    for vertex in vertices {
        let position = Vec3::from(vertex.position);
        min = min.inf(&position);
        max = max.sup(&position);
    }
    Aabb::new(min, max)
}

/// Shading model of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialType {
    /// Blinn-Phong
    Phong,
    /// Metallic-roughness PBR
    Pbr,
}

/// Blinn-Phong parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PhongMaterial {
    /// Diffuse colour; alpha below 1 makes the material transparent
    pub diffuse: Vec4,
    /// Ambient colour
    pub ambient: Vec3,
    /// Specular colour
    pub specular: Vec3,
    /// Specular exponent
    pub shininess: f32,
    /// Diffuse texture
    pub diffuse_map: Option<Arc<Texture2D>>,
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            ambient: Vec3::new(0.1, 0.1, 0.1),
            specular: Vec3::new(0.5, 0.5, 0.5),
            shininess: 32.0,
            diffuse_map: None,
        }
    }
}

/// Metallic-roughness parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PbrMaterial {
    /// Base colour
    pub albedo: Vec4,
    /// Metalness in `[0, 1]`
    pub metallic: f32,
    /// Perceptual roughness in `[0, 1]`
    pub roughness: f32,
    /// Baked ambient occlusion
    pub ao: f32,
    /// Emitted radiance
    pub emissive: Vec3,
    /// Base colour texture
    pub albedo_map: Option<Arc<Texture2D>>,
    /// Tangent-space normal map
    pub normal_map: Option<Arc<Texture2D>>,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self {
            albedo: Vec4::new(1.0, 1.0, 1.0, 1.0),
            metallic: 0.0,
            roughness: 1.0,
            ao: 1.0,
            emissive: Vec3::zeros(),
            albedo_map: None,
            normal_map: None,
        }
    }
}

/// Surface description of a submesh
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    /// Blinn-Phong surface
    Phong(PhongMaterial),
    /// PBR surface
    Pbr(PbrMaterial),
}

impl Default for Material {
    /// Used for submeshes without a material
    fn default() -> Self {
        Self::Pbr(PbrMaterial::default())
    }
}

impl Material {
    /// Shading model, which selects the pipeline
    pub const fn material_type(&self) -> MaterialType {
        match self {
            Self::Phong(_) => MaterialType::Phong,
            Self::Pbr(_) => MaterialType::Pbr,
        }
    }

    /// Transparent materials are drawn after lighting with blending
    ///
    /// Only Phong materials with a translucent diffuse colour qualify.
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Phong(phong) => phong.diffuse.w < 1.0,
            Self::Pbr(_) => false,
        }
    }

    /// Record the `u_Material` uniforms and texture binds for the bound pipeline
    pub fn record_uniforms(&self, cmd: &mut CommandBuffer) {
        match self {
            Self::Phong(phong) => {
                cmd.record(RenderCmd::uniform("u_Material.diffuse", UniformValue::Float4(phong.diffuse)));
                cmd.record(RenderCmd::uniform("u_Material.ambient", UniformValue::Float3(phong.ambient)));
                cmd.record(RenderCmd::uniform("u_Material.specular", UniformValue::Float3(phong.specular)));
                cmd.record(RenderCmd::uniform("u_Material.shininess", UniformValue::Float(phong.shininess)));
                record_map(cmd, "u_Material.hasDiffuseMap", 0, phong.diffuse_map.as_ref());
            }
            Self::Pbr(pbr) => {
                cmd.record(RenderCmd::uniform("u_Material.albedo", UniformValue::Float4(pbr.albedo)));
                cmd.record(RenderCmd::uniform("u_Material.metallic", UniformValue::Float(pbr.metallic)));
                cmd.record(RenderCmd::uniform("u_Material.roughness", UniformValue::Float(pbr.roughness)));
                cmd.record(RenderCmd::uniform("u_Material.ao", UniformValue::Float(pbr.ao)));
                cmd.record(RenderCmd::uniform("u_Material.emissive", UniformValue::Float3(pbr.emissive)));
                record_map(cmd, "u_Material.hasAlbedoMap", 0, pbr.albedo_map.as_ref());
                record_map(cmd, "u_Material.hasNormalMap", 1, pbr.normal_map.as_ref());
            }
        }
    }
}

fn record_map(cmd: &mut CommandBuffer, flag: &str, slot: u32, texture: Option<&Arc<Texture2D>>) {
    cmd.record(RenderCmd::uniform(flag, UniformValue::Bool(texture.is_some())));
    if let Some(texture) = texture {
        cmd.record(RenderCmd::BindTexture {
            slot,
            texture: texture.handle(),
        });
    }
}
