//! Rendering backends
//!
//! The renderer core only depends on [`crate::render::api::RendererBackend`].
//! The headless backend executes commands on the CPU: it keeps every resource
//! in memory, records what was submitted and rasterises entity IDs so picking
//! works without a GPU.

pub mod headless;

pub use headless::HeadlessBackend;
