//! Per-model replica of the registry's modelet address set.
//!
//! The set is a growable array plus an address → position index, so adds,
//! removes, and uniform random picks are all O(1). Removal swaps the last
//! element into the vacated slot; order carries no meaning.
//!
//! Invariant: for every address `x` in `index`, `addrs[index[x]] == x`, and
//! `addrs.len() == index.len()`.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::domain::{DiffBatch, ModelId, MutationKind};

#[derive(Debug, Default)]
struct AddressSet {
    addrs: Vec<String>,
    index: HashMap<String, usize>,
}

impl AddressSet {
    fn replace(&mut self, snapshot: Vec<String>) {
        self.addrs.clear();
        self.index.clear();
        for addr in snapshot {
            self.insert(addr);
        }
    }

    /// Append `addr`. Returns false if it is already present.
    fn insert(&mut self, addr: String) -> bool {
        if self.index.contains_key(&addr) {
            return false;
        }
        self.index.insert(addr.clone(), self.addrs.len());
        self.addrs.push(addr);
        true
    }

    /// Swap-remove `addr`. Returns false if it was absent.
    fn remove(&mut self, addr: &str) -> bool {
        let Some(i) = self.index.remove(addr) else {
            return false;
        };
        self.addrs.swap_remove(i);
        if let Some(moved) = self.addrs.get(i) {
            self.index.insert(moved.clone(), i);
        }
        true
    }
}

/// Replicated address set for one model.
#[derive(Debug)]
pub struct AddressReplica {
    model_id: ModelId,
    set: Mutex<AddressSet>,
}

impl AddressReplica {
    pub fn new(model_id: ModelId) -> Self {
        Self {
            model_id,
            set: Mutex::new(AddressSet::default()),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    /// Apply one diff batch: the snapshot (if any) first, then the log in order.
    ///
    /// Adds of an address already present and removes of an absent one are
    /// no-ops. Mutations of an unknown kind are logged and skipped.
    pub fn apply(&self, batch: &DiffBatch) {
        let mut set = self.set.lock();

        if let Some(snapshot) = &batch.snapshot {
            info!(
                model = %self.model_id,
                addresses = snapshot.len(),
                next_seqno = batch.next_seqno,
                "Received full address set"
            );
            set.replace(snapshot.clone());
        }

        for mutation in &batch.log {
            match mutation.kind {
                MutationKind::Add => {
                    if !set.insert(mutation.address.clone()) {
                        debug!(model = %self.model_id, address = %mutation.address, "Address already present");
                    }
                }
                MutationKind::Remove => {
                    if !set.remove(&mutation.address) {
                        debug!(model = %self.model_id, address = %mutation.address, "Address already absent");
                    }
                }
                MutationKind::Unknown(tag) => {
                    warn!(
                        model = %self.model_id,
                        kind = tag,
                        address = %mutation.address,
                        "Unexpected mutation kind, skipping"
                    );
                }
            }
        }

        if !batch.log.is_empty() {
            debug!(
                model = %self.model_id,
                mutations = batch.log.len(),
                size = set.addrs.len(),
                next_seqno = batch.next_seqno,
                "Applied address updates"
            );
        }
    }

    /// Pick up to `want` addresses.
    ///
    /// Returns every address when `want` covers the whole set. Otherwise
    /// draws `want` addresses uniformly at random with replacement, so the
    /// result may contain duplicates.
    #[must_use]
    pub fn sample(&self, want: usize) -> Vec<String> {
        let set = self.set.lock();
        let n = set.addrs.len();
        if n == 0 {
            return Vec::new();
        }
        if want >= n {
            return set.addrs.clone();
        }

        let mut rng = rand::thread_rng();
        (0..want)
            .map(|_| set.addrs[rng.gen_range(0..n)].clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.set.lock().addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current addresses in storage order.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.set.lock().addrs.clone()
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.set.lock().index.contains_key(address)
    }
}
