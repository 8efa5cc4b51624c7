//! Temporal history of the SSGI pass
//!
//! SSGI accumulates over frames into one of two framebuffers while sampling
//! the other. Accumulation restarts (frame index 0) whenever the previous
//! result no longer matches the current view: first use, after SSGI was
//! off, when the camera moves or when any tunable changes.

use log::debug;

use super::scene_info::SsgiParams;
use crate::foundation::math::{matrices_differ, Mat4};
use crate::render::api::{
    BackendResult, FramebufferHandle, FramebufferSpecification, FramebufferTextureFormat,
    RendererBackend,
};

/// Change below which view matrices and tunables count as unchanged
pub const HISTORY_EPSILON: f32 = 1e-4;

/// Inputs of one SSGI dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsgiFrame {
    /// Framebuffer written this frame
    pub current: FramebufferHandle,
    /// Framebuffer holding last frame's result
    pub history: FramebufferHandle,
    /// Frames accumulated so far; 0 after a reset
    pub frame_index: u32,
    /// Clamped sample count
    pub sample_count: i32,
    /// Tunables
    pub params: SsgiParams,
}

/// Ping-pong framebuffers and the state that decides when to restart accumulation
#[derive(Debug, Default)]
pub struct SsgiHistory {
    framebuffers: Option<[FramebufferHandle; 2]>,
    width: u32,
    height: u32,
    history_index: usize,
    frame_index: u32,
    valid: bool,
    was_enabled: bool,
    last_view_projection: Mat4,
    last_params: SsgiParams,
}

impl SsgiHistory {
    /// Create or resize the two RGB16F framebuffers
    pub fn ensure(&mut self, backend: &mut dyn RendererBackend, width: u32, height: u32) -> BackendResult<()> {
        match self.framebuffers {
            Some(_) if self.width == width && self.height == height => return Ok(()),
            Some(framebuffers) => {
                for framebuffer in framebuffers {
                    backend.resize_framebuffer(framebuffer, width, height)?;
                }
                debug!("SSGI history resized to {width}x{height}");
            }
            None => {
                let spec = FramebufferSpecification::new(width, height, vec![FramebufferTextureFormat::Rgb16F]);
                let first = backend.create_framebuffer(&spec)?;
                let second = backend.create_framebuffer(&spec)?;
                self.framebuffers = Some([first, second]);
            }
        }
        self.width = width;
        self.height = height;
        self.valid = false;
        Ok(())
    }

    /// Advance to the next frame and decide whether history can be reused
    ///
    /// Returns `None` until [`SsgiHistory::ensure`] has run.
    pub fn begin_frame(&mut self, view_projection: &Mat4, params: &SsgiParams) -> Option<SsgiFrame> {
        let framebuffers = self.framebuffers?;

        let sample_count = params.clamped_sample_count();
        let differs = |a: f32, b: f32| (a - b).abs() > HISTORY_EPSILON;
        let reset = !self.valid
            || !self.was_enabled
            || matrices_differ(view_projection, &self.last_view_projection, HISTORY_EPSILON)
            || differs(params.radius, self.last_params.radius)
            || differs(params.bias, self.last_params.bias)
            || differs(params.intensity, self.last_params.intensity)
            || sample_count != self.last_params.clamped_sample_count();
        if reset {
            self.frame_index = 0;
        }

        let history = self.history_index;
        let current = (history + 1) % 2;
        let frame = SsgiFrame {
            current: framebuffers[current],
            history: framebuffers[history],
            frame_index: self.frame_index,
            sample_count,
            params: *params,
        };

        self.history_index = current;
        self.valid = true;
        self.was_enabled = true;
        self.last_view_projection = *view_projection;
        self.last_params = *params;
        self.frame_index += 1;

        Some(frame)
    }

    /// SSGI is off this frame; the next use starts from scratch
    pub fn disable(&mut self) {
        self.was_enabled = false;
        self.valid = false;
        self.frame_index = 0;
    }

    /// Framebuffer holding the most recent result
    pub fn latest(&self) -> Option<FramebufferHandle> {
        self.framebuffers.map(|framebuffers| framebuffers[self.history_index])
    }

    /// Frames accumulated since the last reset
    pub const fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Destroy both framebuffers
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        if let Some(framebuffers) = self.framebuffers.take() {
            for framebuffer in framebuffers {
                backend.destroy_framebuffer(framebuffer);
            }
        }
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessBackend;

    fn history() -> (HeadlessBackend, SsgiHistory) {
        let mut backend = HeadlessBackend::new();
        let mut history = SsgiHistory::default();
        history.ensure(&mut backend, 32, 32).unwrap();
        (backend, history)
    }

    #[test]
    fn test_requires_framebuffers() {
        let mut history = SsgiHistory::default();
        assert!(history.begin_frame(&Mat4::identity(), &SsgiParams::default()).is_none());
    }

    #[test]
    fn test_static_view_accumulates_and_ping_pongs() {
        let (_backend, mut history) = history();
        let params = SsgiParams::default();

        let first = history.begin_frame(&Mat4::identity(), &params).unwrap();
        let second = history.begin_frame(&Mat4::identity(), &params).unwrap();
        let third = history.begin_frame(&Mat4::identity(), &params).unwrap();

        assert_eq!(first.frame_index, 0);
        assert_eq!(second.frame_index, 1);
        assert_eq!(third.frame_index, 2);
        assert_eq!(second.history, first.current);
        assert_eq!(third.history, second.current);
        assert_ne!(second.current, second.history);
        assert_eq!(history.latest(), Some(third.current));
    }

    #[test]
    fn test_camera_motion_resets() {
        let (_backend, mut history) = history();
        let params = SsgiParams::default();
        history.begin_frame(&Mat4::identity(), &params);
        history.begin_frame(&Mat4::identity(), &params);

        let moved = Mat4::new_translation(&crate::foundation::math::Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(history.begin_frame(&moved, &params).unwrap().frame_index, 0);
    }

    #[test]
    fn test_tiny_changes_keep_history() {
        let (_backend, mut history) = history();
        let params = SsgiParams::default();
        history.begin_frame(&Mat4::identity(), &params);

        let nudged = SsgiParams {
            radius: params.radius + 1e-5,
            ..params
        };
        assert_eq!(history.begin_frame(&Mat4::identity(), &nudged).unwrap().frame_index, 1);
    }

    #[test]
    fn test_parameter_change_resets() {
        let (_backend, mut history) = history();
        let params = SsgiParams::default();
        history.begin_frame(&Mat4::identity(), &params);

        let more_samples = SsgiParams {
            sample_count: 32,
            ..params
        };
        assert_eq!(history.begin_frame(&Mat4::identity(), &more_samples).unwrap().frame_index, 0);
    }

    #[test]
    fn test_disable_resets() {
        let (_backend, mut history) = history();
        let params = SsgiParams::default();
        history.begin_frame(&Mat4::identity(), &params);
        history.begin_frame(&Mat4::identity(), &params);
        history.disable();
        assert_eq!(history.frame_index(), 0);
        assert_eq!(history.begin_frame(&Mat4::identity(), &params).unwrap().frame_index, 0);
    }

    #[test]
    fn test_sample_count_is_clamped() {
        let (_backend, mut history) = history();
        let params = SsgiParams {
            sample_count: 0,
            ..Default::default()
        };
        assert_eq!(history.begin_frame(&Mat4::identity(), &params).unwrap().sample_count, 1);
    }
}
