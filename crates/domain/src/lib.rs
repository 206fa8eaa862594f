//! # lanbridge-domain
//!
//! Pure data model for the lanbridge device bridge.
//!
//! ## Responsibilities
//! - Device keys — registry-wide unique identifiers
//! - Canonical device records: kind-tagged state plus a freshness stamp
//! - The bridge error taxonomy shared by every layer
//! - Operator-supplied metadata overrides (friendly names, placement)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and performs no IO.
//! Transport and scheduling are expressed as ports in `lanbridge-app`;
//! adapters depend on that crate, never the reverse.

pub mod error;
pub mod key;
pub mod overrides;
pub mod record;
pub mod time;
