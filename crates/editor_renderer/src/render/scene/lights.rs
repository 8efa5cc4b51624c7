//! Scene lights and their shader uniforms

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;
use crate::render::commands::{CommandBuffer, RenderCmd, UniformValue};

/// Point lights uploaded per frame
pub const MAX_POINT_LIGHTS: usize = 16;

/// Spot lights uploaded per frame
pub const MAX_SPOT_LIGHTS: usize = 16;

/// Sun-like light with parallel rays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    /// Light direction as authored
    pub direction: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Scale applied to the colour
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, -1.0, -0.5),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
        }
    }
}

/// Omnidirectional light with a finite range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Scale applied to the colour
    pub intensity: f32,
    /// Distance at which the light fades out
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            range: 10.0,
        }
    }
}

/// Cone-shaped light
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotLight {
    /// World position
    pub position: Vec3,
    /// Cone axis
    pub direction: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Scale applied to the colour
    pub intensity: f32,
    /// Distance at which the light fades out
    pub range: f32,
    /// Outer cone angle in degrees
    pub angle: f32,
    /// Fraction of the cone used for the falloff, in `[0, 1]`
    pub softness: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            range: 10.0,
            angle: 30.0,
            softness: 0.2,
        }
    }
}

impl SpotLight {
    /// Outer cone half-angle in radians
    pub fn outer_cone_angle(&self) -> f32 {
        self.angle.to_radians()
    }

    /// Inner cone half-angle in radians; the falloff happens between inner and outer
    pub fn inner_cone_angle(&self) -> f32 {
        self.outer_cone_angle() * (1.0 - self.softness.clamp(0.0, 1.0))
    }
}

/// Every light affecting the scene this frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentLight {
    /// The sun
    pub directional: Option<DirectionalLight>,
    /// Point lights; only the first [`MAX_POINT_LIGHTS`] are uploaded
    pub point_lights: Vec<PointLight>,
    /// Spot lights; only the first [`MAX_SPOT_LIGHTS`] are uploaded
    pub spot_lights: Vec<SpotLight>,
}

impl EnvironmentLight {
    /// Direction shadows are cast along, if there is a sun
    pub fn shadow_direction(&self) -> Option<Vec3> {
        self.directional.map(|light| light.direction)
    }

    /// Record the light uniforms for the bound pipeline
    pub fn record_uniforms(&self, cmd: &mut CommandBuffer) {
        let directional = self.directional.unwrap_or(DirectionalLight {
            intensity: 0.0,
            ..Default::default()
        });
        // Shaders expect the direction towards the light
        cmd.record(RenderCmd::uniform(
            "u_DirectionalLight.direction",
            UniformValue::Float3(-directional.direction),
        ));
        cmd.record(RenderCmd::uniform(
            "u_DirectionalLight.color",
            UniformValue::Float3(directional.color),
        ));
        cmd.record(RenderCmd::uniform(
            "u_DirectionalLight.intensity",
            UniformValue::Float(directional.intensity),
        ));

        let point_count = self.point_lights.len().min(MAX_POINT_LIGHTS);
        cmd.record(RenderCmd::uniform(
            "u_PointLightCount",
            UniformValue::Int(point_count as i32),
        ));
        for (i, light) in self.point_lights.iter().take(MAX_POINT_LIGHTS).enumerate() {
            let prefix = format!("u_PointLights[{i}]");
            cmd.record(RenderCmd::uniform(format!("{prefix}.position"), UniformValue::Float3(light.position)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.color"), UniformValue::Float3(light.color)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.intensity"), UniformValue::Float(light.intensity)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.range"), UniformValue::Float(light.range)));
        }

        let spot_count = self.spot_lights.len().min(MAX_SPOT_LIGHTS);
        cmd.record(RenderCmd::uniform(
            "u_SpotLightCount",
            UniformValue::Int(spot_count as i32),
        ));
        for (i, light) in self.spot_lights.iter().take(MAX_SPOT_LIGHTS).enumerate() {
            let prefix = format!("u_SpotLights[{i}]");
            let direction = light.direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::y());
            cmd.record(RenderCmd::uniform(format!("{prefix}.position"), UniformValue::Float3(light.position)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.direction"), UniformValue::Float3(direction)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.color"), UniformValue::Float3(light.color)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.intensity"), UniformValue::Float(light.intensity)));
            cmd.record(RenderCmd::uniform(format!("{prefix}.range"), UniformValue::Float(light.range)));
            cmd.record(RenderCmd::uniform(
                format!("{prefix}.innerConeAngle"),
                UniformValue::Float(light.inner_cone_angle()),
            ));
            cmd.record(RenderCmd::uniform(
                format!("{prefix}.outerConeAngle"),
                UniformValue::Float(light.outer_cone_angle()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform<'a>(cmd: &'a CommandBuffer, name: &str) -> Option<&'a UniformValue> {
        cmd.commands().iter().find_map(|command| match command {
            RenderCmd::SetUniform { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    #[test]
    fn test_light_counts_are_capped() {
        let lights = EnvironmentLight {
            directional: None,
            point_lights: vec![PointLight::default(); 20],
            spot_lights: vec![SpotLight::default(); 3],
        };
        let mut cmd = CommandBuffer::new();
        lights.record_uniforms(&mut cmd);

        assert_eq!(uniform(&cmd, "u_PointLightCount"), Some(&UniformValue::Int(16)));
        assert_eq!(uniform(&cmd, "u_SpotLightCount"), Some(&UniformValue::Int(3)));
        assert!(uniform(&cmd, "u_PointLights[15].range").is_some());
        assert!(uniform(&cmd, "u_PointLights[16].range").is_none());
    }

    #[test]
    fn test_directional_direction_is_negated() {
        let lights = EnvironmentLight {
            directional: Some(DirectionalLight {
                direction: Vec3::new(0.0, -1.0, 0.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut cmd = CommandBuffer::new();
        lights.record_uniforms(&mut cmd);
        assert_eq!(
            uniform(&cmd, "u_DirectionalLight.direction"),
            Some(&UniformValue::Float3(Vec3::new(0.0, 1.0, 0.0)))
        );
    }

    #[test]
    fn test_spot_cone_angles() {
        let spot = SpotLight {
            angle: 40.0,
            softness: 0.25,
            ..Default::default()
        };
        assert_relative_eq!(spot.outer_cone_angle(), 40f32.to_radians());
        assert_relative_eq!(spot.inner_cone_angle(), 30f32.to_radians(), epsilon = 1e-6);
    }
}
