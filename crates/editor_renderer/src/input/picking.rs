//! Mouse picking through the entity ID attachment

use log::trace;

use crate::render::api::{FramebufferHandle, RendererBackend};
use crate::render::RenderResult;

/// Entity ID of pixels no entity was drawn into
pub const NO_ENTITY: i32 = -1;

/// Viewport position (top-left origin) to attachment texel (bottom-left origin)
///
/// Returns `None` outside a `width`×`height` viewport.
pub fn viewport_to_attachment(x: i32, y: i32, width: u32, height: u32) -> Option<(i32, i32)> {
    let width = i32::try_from(width).ok()?;
    let height = i32::try_from(height).ok()?;
    if !(0..width).contains(&x) || !(0..height).contains(&y) {
        return None;
    }
    Some((x, height - 1 - y))
}

/// Entity under viewport pixel `(x, y)` of an integer `attachment`
///
/// Positions outside the framebuffer yield [`NO_ENTITY`].
pub fn read_entity_id(
    backend: &mut dyn RendererBackend,
    framebuffer: FramebufferHandle,
    attachment: usize,
    x: i32,
    y: i32,
) -> RenderResult<i32> {
    let Some(spec) = backend.framebuffer_specification(framebuffer) else {
        trace!("picking on unknown framebuffer {framebuffer:?}");
        return Ok(NO_ENTITY);
    };
    let Some((tx, ty)) = viewport_to_attachment(x, y, spec.width, spec.height) else {
        return Ok(NO_ENTITY);
    };
    backend.read_pixel(framebuffer, attachment, tx, ty)
}
