//! Math utilities and types
//!
//! Provides the fundamental math types used by the renderer: nalgebra aliases,
//! axis-aligned bounding boxes, view frustums and a few matrix helpers that the
//! batch and scene renderers share.

use approx::AbsDiffEq;
pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Axis-aligned bounding box in local or world space
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::new(-0.5, -0.5, -0.5),
            max: Vec3::new(0.5, 0.5, 0.5),
        }
    }
}

impl Aabb {
    /// Create a bounding box from its corners
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The eight corners, bottom face first
    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// World-space box enclosing this box after `transform`
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let mut min = Vec3::repeat(f32::MAX);
        let mut max = Vec3::repeat(f32::MIN);

        for corner in self.corners() {
            let world = transform.transform_point(&Point3::from(corner)).coords;
            min = min.inf(&world);
            max = max.sup(&world);
        }

        Self { min, max }
    }
}

/// Six normalized clip planes extracted from a view-projection matrix
///
/// Plane order: left, right, bottom, top, near, far. Each plane is stored as
/// `(normal.x, normal.y, normal.z, distance)` with normals pointing inward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract the frustum planes (Gribb/Hartmann) from `view_projection`
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2];
        for plane in &mut planes {
            let length = plane.xyz().norm();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Planes in extraction order
    pub const fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Positive-vertex test: false only when the box is fully outside one plane
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Vec3::new(
                if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.xyz().dot(&positive) + plane.w >= 0.0
        })
    }
}

/// Copy of `matrix` with its translation column cleared
///
/// Applied to a view matrix this leaves the pure camera rotation, which is what
/// billboards and the skybox need.
pub fn strip_translation(matrix: &Mat4) -> Mat4 {
    let mut rotation = *matrix;
    rotation.set_column(3, &Vec4::new(0.0, 0.0, 0.0, 1.0));
    rotation
}

/// Whether any element of `a` and `b` differs by more than `epsilon`
pub fn matrices_differ(a: &Mat4, b: &Mat4, epsilon: f32) -> bool {
    !a.abs_diff_eq(b, epsilon)
}

/// Translation * Z-rotation * scale, the transform every 2D quad helper builds
pub fn quad_transform(position: Vec3, size: Vec2, radians: f32) -> Mat4 {
    Mat4::new_translation(&position)
        * Mat4::from_axis_angle(&Vec3::z_axis(), radians)
        * Mat4::new_nonuniform_scaling(&Vec3::new(size.x, size.y, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_transformed_by_translation() {
        let aabb = Aabb::default();
        let moved = aabb.transformed(&Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0)));
        assert_relative_eq!(moved.min, Vec3::new(9.5, -0.5, -0.5));
        assert_relative_eq!(moved.max, Vec3::new(10.5, 0.5, 0.5));
    }

    #[test]
    fn test_frustum_culls_box_behind_camera() {
        let projection = Mat4::new_perspective(1.0, 45f32.to_radians(), 0.1, 100.0);
        let view = Mat4::look_at_rh(
            &Point3::new(0.0, 0.0, 5.0),
            &Point3::origin(),
            &Vec3::y(),
        );
        let frustum = Frustum::from_view_projection(&(projection * view));

        assert!(frustum.intersects_aabb(&Aabb::default()));

        let behind = Aabb::new(Vec3::new(-0.5, -0.5, 20.0), Vec3::new(0.5, 0.5, 21.0));
        assert!(!frustum.intersects_aabb(&behind));
    }

    #[test]
    fn test_strip_translation_keeps_rotation() {
        let rotation = Mat4::from_axis_angle(&Vec3::y_axis(), 0.7);
        let view = Mat4::new_translation(&Vec3::new(3.0, -2.0, 8.0)) * rotation;
        let stripped = strip_translation(&view);

        assert_relative_eq!(stripped, rotation, epsilon = 1e-6);
    }

    #[test]
    fn test_matrices_differ_epsilon() {
        let a = Mat4::identity();
        let mut b = Mat4::identity();
        b[(0, 3)] = 5e-5;
        assert!(!matrices_differ(&a, &b, 1e-4));
        b[(0, 3)] = 1e-3;
        assert!(matrices_differ(&a, &b, 1e-4));
    }
}
