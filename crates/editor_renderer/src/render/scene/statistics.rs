//! Frame counters shown in the editor's statistics panel

use crate::render::renderer2d::Renderer2DStatistics;

/// Counters of the 3D passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renderer3DStatistics {
    /// Mesh draw commands submitted
    pub mesh_count: usize,
    /// Draws of the G-buffer, forward and transparent passes
    pub geometry_draw_calls: usize,
    /// Draws into the shadow map
    pub shadow_draw_calls: usize,
    /// Skybox draws
    pub skybox_draw_calls: usize,
    /// Full-screen draws (SSGI, GTAO, lighting, outline, debug views)
    pub post_process_draw_calls: usize,
    /// Convolution draws of the image-based lighting precompute
    pub ibl_draw_calls: usize,
}

impl Renderer3DStatistics {
    /// Every 3D draw submission
    pub const fn total_draw_calls(&self) -> usize {
        self.geometry_draw_calls
            + self.shadow_draw_calls
            + self.skybox_draw_calls
            + self.post_process_draw_calls
            + self.ibl_draw_calls
    }
}

/// Snapshot of both renderers' counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStatistics {
    /// 2D batcher
    pub renderer2d: Renderer2DStatistics,
    /// Scene passes
    pub renderer3d: Renderer3DStatistics,
}

impl RenderStatistics {
    /// 2D and 3D draw submissions together
    pub const fn total_draw_calls(&self) -> usize {
        self.renderer2d.draw_calls + self.renderer3d.total_draw_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let stats = RenderStatistics {
            renderer2d: Renderer2DStatistics {
                draw_calls: 2,
                quad_count: 3,
                line_count: 1,
                circle_count: 1,
            },
            renderer3d: Renderer3DStatistics {
                mesh_count: 4,
                geometry_draw_calls: 4,
                shadow_draw_calls: 4,
                skybox_draw_calls: 1,
                post_process_draw_calls: 2,
                ibl_draw_calls: 37,
            },
        };
        assert_eq!(stats.renderer3d.total_draw_calls(), 48);
        assert_eq!(stats.total_draw_calls(), 50);
        assert_eq!(stats.renderer2d.total_vertex_count(), 18);
    }
}
