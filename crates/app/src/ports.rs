//! Port definitions — the contract between the registry and adapters.
//!
//! Ports live in `app` so that both the registry and the adapter crates
//! can depend on them without creating circular dependencies.

pub mod backend;

pub use backend::{DeviceBackend, RecordSink};
