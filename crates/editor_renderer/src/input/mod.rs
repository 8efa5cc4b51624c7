//! Input helpers
//!
//! Event routing belongs to the host editor; this module only turns viewport
//! positions into renderer queries.

pub mod picking;

pub use picking::{read_entity_id, viewport_to_attachment, NO_ENTITY};
