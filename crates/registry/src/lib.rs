//! `tm-registry` — directory of tool declarations held under time-limited
//! leases, served over the bus control topics.
//!
//! Agents `register` once and then `keepalive` periodically; a declaration
//! whose lease runs out disappears from `list` immediately and is swept by
//! the GC loop on its next tick.

pub mod directory;
pub mod service;

pub use directory::{RegistryEntry, RegistryError, ToolDirectory};
pub use service::Registry;
