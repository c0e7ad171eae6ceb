//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`registry`]: `FakeRegistry`, an in-memory registry that also acts as
//!   the resolver and dialer, with scripted failures and call counters.
//! - [`config`]: canonical test configurations with short timeouts.
//! - [`wait`]: polling helper for conditions reached by background tasks.

pub mod config;
pub mod registry;
pub mod wait;
