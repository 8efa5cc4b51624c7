//! Cameras consumed by the 2D and scene renderers

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Projection-only camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Projection matrix
    pub projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::identity())
    }
}

impl Camera {
    /// Wrap an existing projection
    pub const fn new(projection: Mat4) -> Self {
        Self { projection }
    }

    /// Right-handed perspective projection
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Mat4::new_perspective(aspect, fov_y_radians, near, far))
    }

    /// Orthographic projection
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::new(Mat4::new_orthographic(left, right, bottom, top, near, far))
    }
}

/// Editor camera: projection, view and clip planes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneCamera {
    /// Projection
    pub camera: Camera,
    /// World to view transform
    pub view: Mat4,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl SceneCamera {
    /// Perspective camera at the origin looking down -Z
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            camera: Camera::perspective(fov_y_radians, aspect, near, far),
            view: Mat4::identity(),
            near,
            far,
        }
    }

    /// Builder: place the camera at `eye` looking at `target`
    pub fn looking_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.view = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up);
        self
    }

    /// Builder: view from a camera world transform
    pub fn with_transform(mut self, transform: &Mat4) -> Self {
        self.view = transform.try_inverse().unwrap_or_else(Mat4::identity);
        self
    }

    /// Projection * view
    pub fn view_projection(&self) -> Mat4 {
        self.camera.projection * self.view
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        camera_position(&self.view)
    }

    /// Data uploaded to the camera uniform buffer
    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view_projection: self.view_projection(),
            view: self.view,
            position: self.position(),
        }
    }
}

/// Camera uniform block shared by every pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraUniform {
    /// Projection * view
    pub view_projection: Mat4,
    /// Raw view matrix (billboards, skybox)
    pub view: Mat4,
    /// Eye position
    pub position: Vec3,
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::from_view_projection(Mat4::identity())
    }
}

impl CameraUniform {
    /// Camera data for an overlay that only has a combined matrix
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        Self {
            view_projection,
            view: Mat4::identity(),
            position: Vec3::zeros(),
        }
    }
}

/// Eye position encoded in a view matrix
pub fn camera_position(view: &Mat4) -> Vec3 {
    view.try_inverse()
        .map_or_else(Vec3::zeros, |inverse| inverse.column(3).xyz())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_position_from_look_at() {
        let camera = SceneCamera::perspective(1.0, 1.5, 0.1, 100.0).looking_at(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::zeros(),
            Vec3::y(),
        );
        assert_relative_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_with_transform_inverts() {
        let transform = Mat4::new_translation(&Vec3::new(0.0, 0.0, 10.0));
        let camera = SceneCamera::perspective(1.0, 1.0, 0.1, 100.0).with_transform(&transform);
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, 10.0), epsilon = 1e-5);
        assert_relative_eq!(camera.uniform().view, transform.try_inverse().unwrap());
    }
}
