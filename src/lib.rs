//! Modelet admin - client-side control plane for a model-serving cluster.
//!
//! A cluster runs a registry that records which models are published and
//! which modelet processes currently serve them. This crate talks to that
//! registry on behalf of two kinds of callers:
//!
//! - **Administrators** publish, update, unpublish, list, and inspect
//!   models through [`RegistryClient`].
//! - **Request routers** ask for a handful of modelet addresses for a
//!   model via [`RegistryClient::resolve_addresses`]. The answer comes from
//!   a local replica that a background watch keeps in sync with the
//!   registry, so the lookup never blocks on the network.
//!
//! # Architecture
//!
//! - [`domain`] - Identifiers, model records, and the watch diff format
//! - [`port`] - Traits for the registry transport and cluster resolution
//! - [`adapter`] - Config-backed cluster resolver
//! - [`infrastructure`] - Configuration, the shared registry connection,
//!   and the retry executor
//! - [`application`] - Registry clients, address replicas, and the
//!   per-cluster client cache
//! - [`error`] - Error types and retry classification
//!
//! # Features
//!
//! - `testkit` - Expose the in-memory registry double used by the tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use modelet_admin::infrastructure::config::settings::Config;
//! use modelet_admin::port::Dialer;
//! use modelet_admin::{ClientCache, ModelId};
//!
//! # async fn run(dialer: Arc<dyn Dialer>) -> modelet_admin::Result<()> {
//! let config = Config::load("modelet.toml")?;
//! config.init_logging();
//!
//! let cache = ClientCache::from_config(&config, dialer);
//! let client = cache.open("/cells/us-east");
//! client.publish(&ModelId::from("lm"), "/models/lm", "/ckpt/lm", 3).await?;
//!
//! let addrs = client.resolve_addresses(&ModelId::from("lm"), 2)?;
//! # let _ = addrs;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use application::{AddressReplica, ClientCache, RegistryClient};
pub use domain::{ClusterId, Model, ModelId};
pub use error::{Error, ErrorKind, Result};
