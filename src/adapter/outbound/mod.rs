//! Outbound adapters.

pub mod resolver;
