//! # lanbridge-app
//!
//! Application core — the device registry and **port definitions**.
//!
//! ## Responsibilities
//! - Define the backend port — [`ports::DeviceBackend`] — that every
//!   vendor adapter implements, plus the [`ports::RecordSink`] callback
//!   handle device records flow through
//! - [`registry::DeviceRegistry`] — deduplicate discoveries, wrap raw
//!   records with bound control operations, seed freshness, and deliver
//!   state changes to the single downstream consumer
//! - [`scan::ScanCycle`] — the shared searching/waiting discovery rhythm
//!
//! ## Dependency rule
//! Depends on `lanbridge-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod ports;
pub mod registry;
pub mod scan;
