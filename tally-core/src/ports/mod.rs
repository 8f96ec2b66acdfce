//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits, never on a concrete store.

mod repository;

pub use repository::Repository;
