//! # lanbridge-adapter-http
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the **local control API** for programmatic access
//!   (`/health`, `/devices`, `/power`, `/brightness`)
//! - Map HTTP requests into registry calls (driving adapter)
//! - Map registry errors into JSON error responses
//!
//! ## Dependency rule
//! Depends on `lanbridge-app` (for the device registry) and
//! `lanbridge-domain` (for record types used in response mapping). Never
//! leaks axum types into the domain.

pub mod error;
pub mod router;
