//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! The registry service, its transport, and cluster address lookup are
//! external collaborators. Everything this crate needs from them is
//! expressed here so the connection and discovery machinery can be driven by
//! any transport, including the in-memory double in `testkit`.
//!
//! # Available Ports
//!
//! - [`AddressResolver`] - Cluster identifier to dialable address
//! - [`Dialer`] - Opens a registry connection
//! - [`RegistryStub`] - Registry RPC surface over one open connection

pub mod outbound;

pub use outbound::registry::{Dialer, RegistryStub};
pub use outbound::resolver::AddressResolver;
