//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic: configuration, registry connection management, and retry.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`connection`] - Lazily dialed, poisonable registry connection
//! - [`retry`] - Retry loop with backoff shared by all registry calls

pub mod config;
pub mod connection;
pub mod retry;
