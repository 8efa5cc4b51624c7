//! Deferred debug drawing
//!
//! Gizmos and tools queue primitives here at any point of the frame; the
//! scene renderer replays them into the 2D overlay once the 3D passes ran.

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::renderer2d::Renderer2D;

/// One queued debug primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebugCommand {
    /// Segment between two points
    Line {
        /// Start
        from: Vec3,
        /// End
        to: Vec3,
        /// Colour
        color: Vec4,
    },
    /// Camera-facing quad
    QuadBillboard {
        /// Centre
        position: Vec3,
        /// Width and height
        size: Vec2,
        /// Colour
        color: Vec4,
        /// Entity ID for picking
        object_id: i32,
    },
    /// Line through `point` along `direction`, clipped to twice the far plane
    InfiniteLine {
        /// Point on the line
        point: Vec3,
        /// Line direction
        direction: Vec3,
        /// Colour
        color: Vec4,
    },
    /// Width of the following lines
    SetLineWidth(f32),
}

/// Queue of debug primitives for the current frame
#[derive(Debug, Default)]
pub struct DebugRenderer {
    commands: Vec<DebugCommand>,
}

impl DebugRenderer {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line segment
    pub fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec4) {
        self.commands.push(DebugCommand::Line { from, to, color });
    }

    /// Queue a camera-facing quad
    pub fn draw_quad_billboard(&mut self, position: Vec3, size: Vec2, color: Vec4, object_id: i32) {
        self.commands.push(DebugCommand::QuadBillboard {
            position,
            size,
            color,
            object_id,
        });
    }

    /// Queue a line without end points
    pub fn draw_infinite_line(&mut self, point: Vec3, direction: Vec3, color: Vec4) {
        self.commands.push(DebugCommand::InfiniteLine {
            point,
            direction,
            color,
        });
    }

    /// Queue a line width change
    pub fn set_line_width(&mut self, width: f32) {
        self.commands.push(DebugCommand::SetLineWidth(width));
    }

    /// Queued commands in submission order
    pub fn commands(&self) -> &[DebugCommand] {
        &self.commands
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop the queue
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Draw every queued command into `renderer` and empty the queue
    pub fn replay(&mut self, renderer: &mut Renderer2D, far: f32) {
        for command in self.commands.drain(..) {
            match command {
                DebugCommand::Line { from, to, color } => {
                    renderer.draw_line(&from, &to, &color, -1);
                }
                DebugCommand::QuadBillboard {
                    position,
                    size,
                    color,
                    object_id,
                } => {
                    renderer.draw_quad_billboard(&position, &size, &color, object_id);
                }
                DebugCommand::InfiniteLine {
                    point,
                    direction,
                    color,
                } => {
                    let (from, to) = infinite_line_endpoints(&point, &direction, far);
                    renderer.draw_line(&from, &to, &color, -1);
                }
                DebugCommand::SetLineWidth(width) => renderer.set_line_width(width),
            }
        }
    }
}

/// End points of a line through `point` reaching twice the far plane either way
pub fn infinite_line_endpoints(point: &Vec3, direction: &Vec3, far: f32) -> (Vec3, Vec3) {
    let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);
    let extent = far * 2.0;
    (point - direction * extent, point + direction * extent)
}
