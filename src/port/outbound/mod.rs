//! Outbound ports: services this crate calls.

pub mod registry;
pub mod resolver;
