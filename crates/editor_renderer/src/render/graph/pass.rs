//! Pass declarations

use slotmap::SlotMap;

use super::resource::{ResourceDesc, ResourceEntry, ResourceHandle};
use crate::render::api::FramebufferHandle;

type Condition = Box<dyn Fn() -> bool>;

/// A node of the render graph: declared inputs/outputs plus a payload
/// telling the recorder what to draw
pub struct RenderPass<P> {
    name: String,
    payload: P,
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    condition: Option<Condition>,
}

impl<P> RenderPass<P> {
    pub(super) fn new(name: String, payload: P, builder: PassBuilder) -> Self {
        Self {
            name,
            payload,
            reads: builder.reads,
            writes: builder.writes,
            condition: builder.condition,
        }
    }

    /// Pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the recorder should draw
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// Resources sampled by this pass
    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// Resources produced by this pass
    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }

    /// Whether the pass runs this frame
    pub fn is_enabled(&self) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition())
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for RenderPass<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Collects the declarations of one pass
#[derive(Default)]
pub struct PassBuilder {
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    condition: Option<Condition>,
}

impl PassBuilder {
    /// Declare a sampled resource
    pub fn read(&mut self, resource: ResourceHandle) -> &mut Self {
        if !self.reads.contains(&resource) {
            self.reads.push(resource);
        }
        self
    }

    /// Declare a produced resource
    pub fn write(&mut self, resource: ResourceHandle) -> &mut Self {
        if !self.writes.contains(&resource) {
            self.writes.push(resource);
        }
        self
    }

    /// Only run the pass while `condition` holds
    pub fn condition(&mut self, condition: impl Fn() -> bool + 'static) -> &mut Self {
        self.condition = Some(Box::new(condition));
        self
    }
}

/// Read-only view of the graph's resources handed to the recorder
pub struct PassContext<'a> {
    resources: &'a SlotMap<ResourceHandle, ResourceEntry>,
}

impl<'a> PassContext<'a> {
    pub(super) const fn new(resources: &'a SlotMap<ResourceHandle, ResourceEntry>) -> Self {
        Self { resources }
    }

    /// Framebuffer backing `resource` this frame
    pub fn framebuffer(&self, resource: ResourceHandle) -> Option<FramebufferHandle> {
        self.resources.get(resource).and_then(|entry| entry.framebuffer)
    }

    /// Description of a transient resource
    pub fn desc(&self, resource: ResourceHandle) -> Option<&ResourceDesc> {
        match &self.resources.get(resource)?.kind {
            super::resource::ResourceKind::Transient(desc) => Some(desc),
            super::resource::ResourceKind::Imported => None,
        }
    }

    /// Debug name of `resource`
    pub fn name(&self, resource: ResourceHandle) -> Option<&str> {
        self.resources.get(resource).map(|entry| entry.name.as_str())
    }
}
