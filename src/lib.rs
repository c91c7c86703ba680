//! Client-side cache and synchronization layer for the Reword dashboard.
//!
//! [`cache`] holds the request cache, the invalidation channel and the
//! optimistic mutation helpers; [`application`] builds the dashboard loads
//! on top of them; [`infra`] carries the HTTP client and telemetry.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
