//! Application layer: the registry client and its address discovery.
//!
//! # Submodules
//!
//! - [`cache`] - Process-wide clients, one per cluster
//! - [`client`] - Administrative calls and address resolution for one cluster
//! - [`replica`] - Replicated modelet address set of one model
//! - `watch` - Background task pair keeping a replica in sync

pub mod cache;
pub mod client;
pub mod replica;
mod watch;

pub use cache::ClientCache;
pub use client::RegistryClient;
pub use replica::AddressReplica;
