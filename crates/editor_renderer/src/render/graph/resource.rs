//! Graph resources
//!
//! A resource names a framebuffer for the duration of one frame. Transient
//! resources are backed by pooled framebuffers allocated at execution time;
//! imported resources wrap framebuffers that outlive the frame.

use slotmap::new_key_type;

use crate::render::api::{FramebufferHandle, FramebufferSpecification, FramebufferTextureFormat};

new_key_type! {
    /// Frame-scoped handle to a graph resource
    pub struct ResourceHandle;
}

/// Size and attachments of a transient resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Attachment formats
    pub attachments: Vec<FramebufferTextureFormat>,
}

impl ResourceDesc {
    /// Describe a resource
    pub fn new(width: u32, height: u32, attachments: Vec<FramebufferTextureFormat>) -> Self {
        Self {
            width,
            height,
            attachments,
        }
    }

    /// Whether a framebuffer created for `other` can back this resource
    pub fn is_compatible(&self, other: &Self) -> bool {
        self == other
    }

    /// Framebuffer specification used to allocate the backing framebuffer
    pub fn to_specification(&self) -> FramebufferSpecification {
        FramebufferSpecification::new(self.width, self.height, self.attachments.clone())
    }
}

/// How a resource is backed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Allocated from the pool for this frame
    Transient(ResourceDesc),
    /// Owned outside the graph
    Imported,
}

/// Graph-side record of a resource
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Debug name
    pub name: String,
    /// Backing kind
    pub kind: ResourceKind,
    /// Framebuffer, once allocated or imported
    pub framebuffer: Option<FramebufferHandle>,
}

impl ResourceEntry {
    /// Whether the graph allocates this resource
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, ResourceKind::Transient(_))
    }
}
