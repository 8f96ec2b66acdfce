//! Adapters - concrete implementations of ports
//!
//! Adapters implement the port traits defined in `ports/`.

pub mod duckdb;
pub mod memory;
