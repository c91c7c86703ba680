//! Dashboard use-cases on top of the request cache.

pub mod api;
pub mod dashboard;
pub mod error;
pub mod retry;
