//! Lazily dialed, poisonable registry connection.
//!
//! One [`ConnectionManager`] exists per cluster client. It caches a single
//! [`RegistryStub`] shared by every operation of that client and guarantees
//! that at most one dial is in flight at any time: a caller that arrives
//! while another is dialing fails fast with [`Error::ResourceExhausted`] and
//! relies on the retry executor's backoff to come back shortly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::ClusterId;
use crate::error::{Error, ErrorKind, Result};
use crate::port::{AddressResolver, Dialer, RegistryStub};

/// Connection state machine: `Idle -> Dialing -> Ready -> (poison) -> Idle`.
enum ConnState {
    Idle,
    Dialing,
    Ready(Arc<dyn RegistryStub>),
}

/// Caches the registry connection for one cluster.
pub struct ConnectionManager {
    cluster: ClusterId,
    resolver: Arc<dyn AddressResolver>,
    dialer: Arc<dyn Dialer>,
    dial_timeout: Duration,
    state: Mutex<ConnState>,
}

/// Returns the state to `Idle` if a dial ends without storing a connection,
/// including when the dialing future is dropped mid-flight.
struct DialGuard<'a> {
    state: &'a Mutex<ConnState>,
    armed: bool,
}

impl DialGuard<'_> {
    fn complete(mut self, stub: Arc<dyn RegistryStub>) {
        *self.state.lock() = ConnState::Ready(stub);
        self.armed = false;
    }
}

impl Drop for DialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            if matches!(*state, ConnState::Dialing) {
                *state = ConnState::Idle;
            }
        }
    }
}

impl ConnectionManager {
    /// Create a manager. No network I/O happens until [`acquire`](Self::acquire).
    pub fn new(
        cluster: ClusterId,
        resolver: Arc<dyn AddressResolver>,
        dialer: Arc<dyn Dialer>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            cluster,
            resolver,
            dialer,
            dial_timeout,
            state: Mutex::new(ConnState::Idle),
        }
    }

    #[must_use]
    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }

    /// Return the cached stub, dialing first if there is none.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceExhausted`] if another caller is already dialing
    /// - [`Error::Unavailable`] if the cluster cannot be resolved, or the
    ///   dial fails or times out
    pub async fn acquire(&self) -> Result<Arc<dyn RegistryStub>> {
        {
            let mut state = self.state.lock();
            match &*state {
                ConnState::Ready(stub) => return Ok(stub.clone()),
                ConnState::Dialing => {
                    return Err(Error::ResourceExhausted(format!(
                        "dial to registry of {} already in progress",
                        self.cluster
                    )));
                }
                ConnState::Idle => *state = ConnState::Dialing,
            }
        }

        let guard = DialGuard {
            state: &self.state,
            armed: true,
        };
        let stub = self.dial().await?;
        guard.complete(stub.clone());
        Ok(stub)
    }

    async fn dial(&self) -> Result<Arc<dyn RegistryStub>> {
        // Lookup failures are transient; NotFound is reserved for the registry.
        let address = self.resolver.resolve(&self.cluster).await.map_err(|e| {
            warn!(cluster = %self.cluster, error = %e, "Registry address lookup failed");
            Error::Unavailable(format!(
                "cannot resolve registry address for {}: {e}",
                self.cluster
            ))
        })?;
        info!(cluster = %self.cluster, address = %address, "Dialing registry");

        match tokio::time::timeout(self.dial_timeout, self.dialer.dial(&address)).await {
            Ok(Ok(stub)) => {
                info!(cluster = %self.cluster, address = %address, "Connected to registry");
                Ok(stub)
            }
            Ok(Err(e)) if e.kind() == ErrorKind::DeadlineExceeded => {
                warn!(cluster = %self.cluster, error = %e, "Registry dial timed out");
                Err(Error::Unavailable(format!(
                    "dial to registry at {address} failed: {e}"
                )))
            }
            Ok(Err(e)) => {
                warn!(cluster = %self.cluster, error = %e, "Registry dial failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    cluster = %self.cluster,
                    timeout_ms = self.dial_timeout.as_millis() as u64,
                    "Registry dial timed out"
                );
                Err(Error::Unavailable(format!(
                    "dial to registry at {address} timed out"
                )))
            }
        }
    }

    /// Discard the cached connection and close it.
    ///
    /// The next [`acquire`](Self::acquire) dials again. A dial already in
    /// flight is left alone.
    pub fn poison(&self) {
        self.discard(|_| true);
    }

    /// Discard the cached connection only if it is `failed`.
    ///
    /// A call that failed on a connection which has since been replaced
    /// leaves the replacement untouched.
    pub fn poison_if(&self, failed: &Arc<dyn RegistryStub>) {
        self.discard(|cached| Arc::ptr_eq(cached, failed));
    }

    fn discard(&self, should_discard: impl FnOnce(&Arc<dyn RegistryStub>) -> bool) {
        let stub = {
            let mut state = self.state.lock();
            let discard = match &*state {
                ConnState::Ready(cached) => should_discard(cached),
                _ => false,
            };
            if discard {
                match std::mem::replace(&mut *state, ConnState::Idle) {
                    ConnState::Ready(stub) => Some(stub),
                    _ => None,
                }
            } else {
                None
            }
        };

        match stub {
            Some(stub) => {
                warn!(cluster = %self.cluster, "Poisoning registry connection");
                stub.close();
            }
            None => debug!(cluster = %self.cluster, "No matching connection to poison"),
        }
    }

    /// Whether a connection is cached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.lock(), ConnState::Ready(_))
    }

    /// Whether a dial is in flight.
    #[must_use]
    pub fn is_dialing(&self) -> bool {
        matches!(*self.state.lock(), ConnState::Dialing)
    }
}
