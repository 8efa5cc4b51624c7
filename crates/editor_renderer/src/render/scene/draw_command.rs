//! Draw lists built while a scene is recorded

use std::sync::Arc;

use super::mesh::Material;
use crate::foundation::math::{strip_translation, Aabb, Mat4};
use crate::render::api::{TextureHandle, VertexArrayHandle};

/// One submesh queued for the 3D passes
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDrawCommand {
    /// Vertex array of the owning mesh
    pub vertex_array: VertexArrayHandle,
    /// First index of the submesh
    pub index_offset: u32,
    /// Index count of the submesh
    pub index_count: u32,
    /// Surface description
    pub material: Arc<Material>,
    /// Object to world
    pub transform: Mat4,
    /// Entity ID written to the pick attachment
    pub object_id: i32,
    /// Selected in the editor
    pub draw_outline: bool,
    /// Result of the frustum test at submission
    pub visible: bool,
    /// Drawn after lighting with blending
    pub transparent: bool,
    /// Object-space bounds of the owning mesh
    pub local_bounds: Aabb,
}

impl MeshDrawCommand {
    /// World-space bounds
    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds.transformed(&self.transform)
    }
}

/// Environment cube drawn behind the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyboxDrawCommand {
    /// Unit cube vertex array
    pub vertex_array: VertexArrayHandle,
    /// Index count of the cube
    pub index_count: u32,
    /// Environment cubemap
    pub cubemap: TextureHandle,
    /// View matrix with translation removed
    pub view: Mat4,
    /// Camera projection
    pub projection: Mat4,
}

impl SkyboxDrawCommand {
    /// Skybox seen from a camera with `view` and `projection`
    pub fn new(
        vertex_array: VertexArrayHandle,
        index_count: u32,
        cubemap: TextureHandle,
        view: &Mat4,
        projection: &Mat4,
    ) -> Self {
        Self {
            vertex_array,
            index_count,
            cubemap,
            view: strip_translation(view),
            projection: *projection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_skybox_view_has_no_translation() {
        let view = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let skybox = SkyboxDrawCommand::new(
            VertexArrayHandle(1),
            36,
            TextureHandle(2),
            &view,
            &Mat4::identity(),
        );
        assert_relative_eq!(skybox.view, Mat4::identity());
    }
}
