//! Graphics pipeline state descriptions

use serde::{Deserialize, Serialize};

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompareOp {
    /// Never passes
    Never,
    /// Passes when incoming < stored
    #[default]
    Less,
    /// Passes when incoming <= stored
    LessEqual,
    /// Passes when equal
    Equal,
    /// Passes when incoming > stored
    Greater,
    /// Always passes
    Always,
}

impl CompareOp {
    /// Evaluate the comparison for an incoming and a stored depth
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::LessEqual => incoming <= stored,
            Self::Equal => (incoming - stored).abs() <= f32::EPSILON,
            Self::Greater => incoming > stored,
            Self::Always => true,
        }
    }
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// Draw both faces
    #[default]
    None,
    /// Cull back faces
    Back,
    /// Cull front faces
    Front,
}

/// Colour blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Overwrite
    #[default]
    None,
    /// Standard alpha blending
    Alpha,
    /// Additive
    Additive,
}

/// Everything needed to build a pipeline object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineSpecification {
    /// Shader program name
    pub shader: String,
    /// Enable the depth test
    pub depth_test: bool,
    /// Write depth
    pub depth_write: bool,
    /// Depth comparison
    pub depth_op: CompareOp,
    /// Face culling
    pub cull: CullMode,
    /// Blending of the colour attachments
    pub blend: BlendMode,
    /// Whether the shader writes the entity ID into the integer attachment
    pub writes_object_id: bool,
}

impl PipelineSpecification {
    /// Opaque, depth-tested pipeline for `shader`
    pub fn new(shader: impl Into<String>) -> Self {
        Self {
            shader: shader.into(),
            depth_test: true,
            depth_write: true,
            depth_op: CompareOp::Less,
            cull: CullMode::None,
            blend: BlendMode::None,
            writes_object_id: false,
        }
    }

    /// Fullscreen post-process pipeline (no depth)
    pub fn fullscreen(shader: impl Into<String>) -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_op: CompareOp::Always,
            ..Self::new(shader)
        }
    }

    /// Builder: blend mode
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Builder: depth writes and comparison
    pub fn with_depth(mut self, depth_write: bool, depth_op: CompareOp) -> Self {
        self.depth_test = true;
        self.depth_write = depth_write;
        self.depth_op = depth_op;
        self
    }

    /// Builder: face culling
    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    /// Builder: writes entity IDs
    pub fn with_object_id(mut self) -> Self {
        self.writes_object_id = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op() {
        assert!(CompareOp::Less.passes(0.2, 0.5));
        assert!(!CompareOp::Less.passes(0.5, 0.5));
        assert!(CompareOp::LessEqual.passes(0.5, 0.5));
        assert!(CompareOp::Always.passes(1.0, 0.0));
    }

    #[test]
    fn test_fullscreen_has_no_depth() {
        let spec = PipelineSpecification::fullscreen("Lighting");
        assert!(!spec.depth_test);
        assert!(!spec.depth_write);
        assert!(!spec.writes_object_id);
    }
}
