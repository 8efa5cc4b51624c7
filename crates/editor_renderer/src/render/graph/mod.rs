//! # Render graph
//!
//! Passes declare the resources they read and write; the graph derives the
//! execution order from those declarations, allocates transient resources
//! from a pool and hands every enabled pass a fresh [`CommandBuffer`].
//!
//! The graph is rebuilt every frame: [`RenderGraph::reset`] drops all passes
//! and resources, so handles from a previous frame never resolve.

pub mod compiler;
pub mod pass;
pub mod pool;
pub mod resource;

pub use pass::{PassBuilder, PassContext, RenderPass};
pub use pool::ResourcePool;
pub use resource::{ResourceDesc, ResourceEntry, ResourceHandle, ResourceKind};

use log::error;
use slotmap::SlotMap;

use crate::render::api::{FramebufferHandle, RendererBackend};
use crate::render::commands::{CommandBuffer, RenderCommandQueue};
use crate::render::RenderResult;

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderGraphError {
    /// Two passes write the same resource
    #[error("Resource '{resource}' is written by both '{first}' and '{second}'")]
    MultipleProducers {
        /// Resource name
        resource: String,
        /// Pass added first
        first: String,
        /// Pass added second
        second: String,
    },

    /// Dependencies form a cycle
    #[error("Cycle detected between passes: {0}")]
    CycleDetected(String),

    /// A pass references a resource not declared this frame
    #[error("Pass '{pass}' references unknown resource {resource}")]
    UnknownResource {
        /// Pass name
        pass: String,
        /// Offending handle
        resource: String,
    },
}

/// Frame graph of passes carrying payloads of type `P`
pub struct RenderGraph<P> {
    passes: Vec<RenderPass<P>>,
    resources: SlotMap<ResourceHandle, ResourceEntry>,
    order: Vec<usize>,
    compiled: bool,
    last_error: Option<RenderGraphError>,
    executed: Vec<String>,
    pool: ResourcePool,
}

impl<P> Default for RenderGraph<P> {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            resources: SlotMap::with_key(),
            order: Vec::new(),
            compiled: false,
            last_error: None,
            executed: Vec::new(),
            pool: ResourcePool::new(),
        }
    }
}

impl<P> RenderGraph<P> {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a transient resource allocated at execution time
    pub fn create_resource(&mut self, name: impl Into<String>, desc: ResourceDesc) -> ResourceHandle {
        self.compiled = false;
        self.resources.insert(ResourceEntry {
            name: name.into(),
            kind: ResourceKind::Transient(desc),
            framebuffer: None,
        })
    }

    /// Wrap a framebuffer owned outside the graph
    pub fn import_resource(
        &mut self,
        name: impl Into<String>,
        framebuffer: FramebufferHandle,
    ) -> ResourceHandle {
        self.compiled = false;
        self.resources.insert(ResourceEntry {
            name: name.into(),
            kind: ResourceKind::Imported,
            framebuffer: Some(framebuffer),
        })
    }

    /// Add a pass; `setup` declares its reads, writes and condition
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        payload: P,
        setup: impl FnOnce(&mut PassBuilder),
    ) {
        let mut builder = PassBuilder::default();
        setup(&mut builder);
        self.passes.push(RenderPass::new(name.into(), payload, builder));
        self.compiled = false;
    }

    /// Validate declarations and compute the execution order
    ///
    /// On failure the error is logged and kept in [`RenderGraph::last_error`],
    /// and insertion order is used so the frame still renders.
    pub fn compile(&mut self) -> Result<(), RenderGraphError> {
        self.compiled = true;
        match compiler::compile_order(&self.passes, &self.resources) {
            Ok(order) => {
                self.order = order;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                error!("render graph compilation failed: {err}");
                self.order = (0..self.passes.len()).collect();
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Run every enabled pass in order
    ///
    /// Transient resources are acquired from the pool before the first pass
    /// and released after the queue has been flushed. Pooled framebuffers no
    /// resource asks for this frame (old viewport sizes) are destroyed first.
    pub fn execute<F>(
        &mut self,
        queue: &mut RenderCommandQueue,
        backend: &mut dyn RendererBackend,
        mut recorder: F,
    ) -> RenderResult<()>
    where
        F: FnMut(&RenderPass<P>, &PassContext<'_>, &mut CommandBuffer),
    {
        if !self.compiled {
            // Failure is recorded in last_error; execution falls back to insertion order.
            let _ = self.compile();
        }

        let requested: Vec<ResourceDesc> = self
            .resources
            .values()
            .filter_map(|entry| match &entry.kind {
                ResourceKind::Transient(desc) => Some(desc.clone()),
                ResourceKind::Imported => None,
            })
            .collect();
        self.pool.evict_unrequested(backend, &requested);

        for entry in self.resources.values_mut() {
            if let ResourceKind::Transient(desc) = &entry.kind {
                if entry.framebuffer.is_none() {
                    entry.framebuffer = Some(self.pool.acquire(backend, desc)?);
                }
            }
        }

        self.executed.clear();
        let context = PassContext::new(&self.resources);
        for &index in &self.order {
            let pass = &self.passes[index];
            if !pass.is_enabled() {
                continue;
            }

            let mut cmd = CommandBuffer::new();
            recorder(pass, &context, &mut cmd);
            queue.submit(cmd);
            self.executed.push(pass.name().to_string());
        }

        let result = queue.flush(backend);
        self.release_transients();
        result
    }

    fn release_transients(&mut self) {
        for entry in self.resources.values_mut() {
            if let ResourceKind::Transient(desc) = &entry.kind {
                if let Some(framebuffer) = entry.framebuffer.take() {
                    self.pool.release(desc.clone(), framebuffer);
                }
            }
        }
    }

    /// Drop all passes and resources; previously issued handles become invalid
    pub fn reset(&mut self) {
        self.release_transients();
        self.passes.clear();
        self.resources.clear();
        self.order.clear();
        self.compiled = false;
        self.last_error = None;
    }

    /// Passes in insertion order
    pub fn passes(&self) -> &[RenderPass<P>] {
        &self.passes
    }

    /// Pass indices in execution order (valid after compilation)
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// Pass names in execution order
    pub fn pass_names_in_order(&self) -> Vec<&str> {
        self.order.iter().map(|&index| self.passes[index].name()).collect()
    }

    /// Names of the passes that ran during the last execution
    pub fn executed_passes(&self) -> &[String] {
        &self.executed
    }

    /// Error from the last compilation, if it failed
    pub const fn last_error(&self) -> Option<&RenderGraphError> {
        self.last_error.as_ref()
    }

    /// Entry for `resource`, if it was declared this frame
    pub fn resource(&self, resource: ResourceHandle) -> Option<&ResourceEntry> {
        self.resources.get(resource)
    }

    /// Transient framebuffer pool
    pub const fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Destroy pooled framebuffers
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        self.reset();
        self.pool.clear(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::FramebufferTextureFormat;
    use crate::render::backends::HeadlessBackend;
    use crate::render::commands::RenderCmd;

    fn desc() -> ResourceDesc {
        ResourceDesc::new(16, 16, vec![FramebufferTextureFormat::Rgba8])
    }

    #[test]
    fn test_dependencies_reorder_passes() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        let a = graph.create_resource("a", desc());
        let b = graph.create_resource("b", desc());

        graph.add_pass("consumer", (), |pass| {
            pass.read(b);
        });
        graph.add_pass("middle", (), |pass| {
            pass.read(a).write(b);
        });
        graph.add_pass("producer", (), |pass| {
            pass.write(a);
        });

        graph.compile().unwrap();
        assert_eq!(graph.pass_names_in_order(), vec!["producer", "middle", "consumer"]);
    }

    #[test]
    fn test_independent_passes_keep_insertion_order() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        for name in ["first", "second", "third"] {
            let resource = graph.create_resource(name, desc());
            graph.add_pass(name, (), move |pass| {
                pass.write(resource);
            });
        }
        graph.compile().unwrap();
        assert_eq!(graph.execution_order(), &[0, 1, 2]);
    }

    #[test]
    fn test_multiple_producers_rejected() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        let target = graph.create_resource("target", desc());
        graph.add_pass("one", (), |pass| {
            pass.write(target);
        });
        graph.add_pass("two", (), |pass| {
            pass.write(target);
        });

        let err = graph.compile().unwrap_err();
        assert_eq!(
            err,
            RenderGraphError::MultipleProducers {
                resource: "target".to_string(),
                first: "one".to_string(),
                second: "two".to_string(),
            }
        );
        assert_eq!(graph.last_error(), Some(&err));
        assert_eq!(graph.execution_order(), &[0, 1]);
    }

    #[test]
    fn test_cycle_detected_with_names() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        let x = graph.create_resource("x", desc());
        let y = graph.create_resource("y", desc());
        graph.add_pass("ping", (), |pass| {
            pass.read(y).write(x);
        });
        graph.add_pass("pong", (), |pass| {
            pass.read(x).write(y);
        });

        match graph.compile() {
            Err(RenderGraphError::CycleDetected(names)) => {
                assert!(names.contains("ping"));
                assert!(names.contains("pong"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_handles_fail_after_reset() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        let stale = graph.create_resource("old", desc());
        graph.reset();

        graph.add_pass("reader", (), |pass| {
            pass.read(stale);
        });
        assert!(matches!(
            graph.compile(),
            Err(RenderGraphError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_execute_runs_enabled_passes_and_pools_transients() {
        let mut backend = HeadlessBackend::new();
        let mut queue = RenderCommandQueue::new();
        let mut graph: RenderGraph<u32> = RenderGraph::new();

        for frame in 0..2 {
            graph.reset();
            let color = graph.create_resource("color", desc());
            graph.add_pass("draw", 1, |pass| {
                pass.write(color);
            });
            graph.add_pass("skipped", 2, |pass| {
                pass.read(color).condition(|| false);
            });

            let mut seen = Vec::new();
            graph
                .execute(&mut queue, &mut backend, |pass, ctx, cmd| {
                    seen.push(*pass.payload());
                    if let Some(framebuffer) = ctx.framebuffer(color) {
                        cmd.record(RenderCmd::BindFramebuffer(framebuffer));
                    }
                })
                .unwrap();

            assert_eq!(seen, vec![1], "frame {frame}");
            assert_eq!(graph.executed_passes(), &["draw".to_string()]);
            assert_eq!(graph.pool().free_count(), 1);
        }
        assert_eq!(graph.pool().created_count(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_resizing_transients_does_not_grow_the_pool() {
        let mut backend = HeadlessBackend::new();
        let mut queue = RenderCommandQueue::new();
        let mut graph: RenderGraph<()> = RenderGraph::new();

        for size in 16..40 {
            graph.reset();
            let depth = graph.create_resource(
                "depth",
                ResourceDesc::new(size, size, vec![FramebufferTextureFormat::Depth24Stencil8]),
            );
            graph.add_pass("depth", (), |pass| {
                pass.write(depth);
            });
            graph.execute(&mut queue, &mut backend, |_, _, _| {}).unwrap();

            assert_eq!(graph.pool().free_count(), 1);
            assert_eq!(backend.resource_count(), 1, "size {size}");
        }
        assert_eq!(graph.pool().created_count(), 24);

        graph.shutdown(&mut backend);
        assert_eq!(backend.resource_count(), 0);
    }
}
