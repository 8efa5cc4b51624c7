//! Directional shadow map

use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::api::{
    BackendResult, FramebufferHandle, FramebufferSpecification, FramebufferTextureFormat,
    RendererBackend,
};

/// Half extent of the orthographic shadow volume
pub const SHADOW_ORTHO_EXTENT: f32 = 20.0;

/// Distance of the virtual light from the origin
pub const SHADOW_LIGHT_DISTANCE: f32 = 20.0;

/// Near plane of the shadow volume
pub const SHADOW_NEAR: f32 = 0.1;

/// Far plane of the shadow volume
pub const SHADOW_FAR: f32 = 60.0;

/// World to light clip space for a directional light with `direction`
///
/// The virtual light sits at `direction * 20` looking at the origin.
pub fn light_space_matrix(direction: &Vec3) -> Mat4 {
    let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::y());
    let eye = Point3::from(direction * SHADOW_LIGHT_DISTANCE);
    let up = if direction.dot(&Vec3::y()).abs() > 0.99 {
        Vec3::x()
    } else {
        Vec3::y()
    };

    let view = Mat4::look_at_rh(&eye, &Point3::origin(), &up);
    let projection = Mat4::new_orthographic(
        -SHADOW_ORTHO_EXTENT,
        SHADOW_ORTHO_EXTENT,
        -SHADOW_ORTHO_EXTENT,
        SHADOW_ORTHO_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    projection * view
}

/// Depth-only framebuffer the shadow pass renders into
#[derive(Debug, Default)]
pub struct ShadowMap {
    framebuffer: Option<FramebufferHandle>,
    size: u32,
}

impl ShadowMap {
    /// Make sure a `size`×`size` depth framebuffer exists
    pub fn ensure(&mut self, backend: &mut dyn RendererBackend, size: u32) -> BackendResult<FramebufferHandle> {
        let size = size.max(1);
        match self.framebuffer {
            Some(framebuffer) if self.size == size => Ok(framebuffer),
            Some(framebuffer) => {
                backend.resize_framebuffer(framebuffer, size, size)?;
                self.size = size;
                Ok(framebuffer)
            }
            None => {
                let framebuffer = backend.create_framebuffer(&FramebufferSpecification::new(
                    size,
                    size,
                    vec![FramebufferTextureFormat::DepthComponent32F],
                ))?;
                self.framebuffer = Some(framebuffer);
                self.size = size;
                Ok(framebuffer)
            }
        }
    }

    /// Framebuffer, once created
    pub const fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Destroy the framebuffer
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        if let Some(framebuffer) = self.framebuffer.take() {
            backend.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use crate::render::backends::HeadlessBackend;
    use approx::assert_relative_eq;

    #[test]
    fn test_origin_lands_mid_volume() {
        let matrix = light_space_matrix(&Vec3::new(0.3, -1.0, 0.2));
        let clip = matrix * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-5);
        assert!(clip.z.abs() < 1.0);
    }

    #[test]
    fn test_vertical_light_uses_x_up() {
        let matrix = light_space_matrix(&Vec3::new(0.0, -1.0, 0.0));
        assert!(matrix.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn test_shadow_map_resizes_in_place() {
        let mut backend = HeadlessBackend::new();
        let mut shadow = ShadowMap::default();
        let first = shadow.ensure(&mut backend, 64).unwrap();
        let second = shadow.ensure(&mut backend, 128).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.framebuffer_specification(first).unwrap().width, 128);
    }
}
