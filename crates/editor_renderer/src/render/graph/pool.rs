//! Framebuffer pool reused by transient graph resources

use log::debug;

use super::resource::ResourceDesc;
use crate::render::api::{BackendResult, FramebufferHandle, RendererBackend};

/// Free list of framebuffers keyed by their description
#[derive(Debug, Default)]
pub struct ResourcePool {
    free: Vec<(ResourceDesc, FramebufferHandle)>,
    created: usize,
}

impl ResourcePool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a compatible framebuffer from the pool, creating one if none is free
    pub fn acquire(
        &mut self,
        backend: &mut dyn RendererBackend,
        desc: &ResourceDesc,
    ) -> BackendResult<FramebufferHandle> {
        if let Some(index) = self.free.iter().position(|(free, _)| free.is_compatible(desc)) {
            let (_, framebuffer) = self.free.swap_remove(index);
            return Ok(framebuffer);
        }

        let framebuffer = backend.create_framebuffer(&desc.to_specification())?;
        self.created += 1;
        debug!(
            "resource pool created framebuffer {:?} ({}x{}, {} attachments)",
            framebuffer,
            desc.width,
            desc.height,
            desc.attachments.len()
        );
        Ok(framebuffer)
    }

    /// Destroy free framebuffers whose description is not in `requested`
    ///
    /// Returns how many framebuffers were destroyed.
    pub fn evict_unrequested(
        &mut self,
        backend: &mut dyn RendererBackend,
        requested: &[ResourceDesc],
    ) -> usize {
        let before = self.free.len();
        self.free.retain(|(desc, framebuffer)| {
            let keep = requested.iter().any(|wanted| wanted.is_compatible(desc));
            if !keep {
                backend.destroy_framebuffer(*framebuffer);
            }
            keep
        });
        let evicted = before - self.free.len();
        if evicted > 0 {
            debug!("resource pool evicted {evicted} stale framebuffers");
        }
        evicted
    }

    /// Return a framebuffer for reuse
    pub fn release(&mut self, desc: ResourceDesc, framebuffer: FramebufferHandle) {
        self.free.push((desc, framebuffer));
    }

    /// Framebuffers waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Framebuffers created over the pool's lifetime
    pub const fn created_count(&self) -> usize {
        self.created
    }

    /// Destroy every pooled framebuffer
    pub fn clear(&mut self, backend: &mut dyn RendererBackend) {
        for (_, framebuffer) in self.free.drain(..) {
            backend.destroy_framebuffer(framebuffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::FramebufferTextureFormat;
    use crate::render::backends::HeadlessBackend;

    #[test]
    fn test_compatible_framebuffer_is_reused() {
        let mut backend = HeadlessBackend::new();
        let mut pool = ResourcePool::new();
        let desc = ResourceDesc::new(64, 64, vec![FramebufferTextureFormat::Rg16F]);

        let first = pool.acquire(&mut backend, &desc).unwrap();
        pool.release(desc.clone(), first);
        let second = pool.acquire(&mut backend, &desc).unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_incompatible_size_allocates() {
        let mut backend = HeadlessBackend::new();
        let mut pool = ResourcePool::new();
        let small = ResourceDesc::new(32, 32, vec![FramebufferTextureFormat::Rg16F]);
        let large = ResourceDesc::new(64, 64, vec![FramebufferTextureFormat::Rg16F]);

        let first = pool.acquire(&mut backend, &small).unwrap();
        pool.release(small, first);
        let second = pool.acquire(&mut backend, &large).unwrap();

        assert_ne!(first, second);
        assert_eq!(pool.free_count(), 1);

        pool.clear(&mut backend);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_stale_sizes_are_evicted() {
        let mut backend = HeadlessBackend::new();
        let mut pool = ResourcePool::new();
        let small = ResourceDesc::new(32, 32, vec![FramebufferTextureFormat::Rg16F]);
        let large = ResourceDesc::new(64, 64, vec![FramebufferTextureFormat::Rg16F]);

        let first = pool.acquire(&mut backend, &small).unwrap();
        pool.release(small.clone(), first);
        let second = pool.acquire(&mut backend, &large).unwrap();
        pool.release(large.clone(), second);
        assert_eq!(backend.resource_count(), 2);

        assert_eq!(pool.evict_unrequested(&mut backend, &[large]), 1);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(backend.resource_count(), 1);
        assert!(backend.framebuffer_specification(first).is_none());

        assert_eq!(pool.evict_unrequested(&mut backend, &[small]), 1);
        assert_eq!(backend.resource_count(), 0);
    }
}
