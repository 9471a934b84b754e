use std::collections::{BTreeMap, HashSet};

use crate::literal::Hash;

/// Ops received before one of their dependencies, parked under the first
/// missing hash and handed back when that hash is admitted.
#[derive(Debug, Clone)]
pub struct PendingOps<O> {
    by_missing: BTreeMap<Hash, Vec<(Hash, O)>>,
    parked: HashSet<Hash>,
}

impl<O> Default for PendingOps<O> {
    fn default() -> Self {
        Self {
            by_missing: BTreeMap::new(),
            parked: HashSet::new(),
        }
    }
}

impl<O> PendingOps<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `op` until `missing` arrives. Returns `false` if it was already parked.
    pub fn park(&mut self, missing: Hash, op_hash: Hash, op: O) -> bool {
        if !self.parked.insert(op_hash.clone()) {
            return false;
        }
        self.by_missing.entry(missing).or_default().push((op_hash, op));
        true
    }

    /// Removes and returns the ops waiting on `hash`.
    pub fn release(&mut self, hash: &Hash) -> Vec<O> {
        let waiting = self.by_missing.remove(hash).unwrap_or_default();
        waiting
            .into_iter()
            .map(|(op_hash, op)| {
                self.parked.remove(&op_hash);
                op
            })
            .collect()
    }

    pub fn is_parked(&self, op_hash: &Hash) -> bool {
        self.parked.contains(op_hash)
    }

    /// Hashes some parked op is waiting on.
    pub fn missing_dependencies(&self) -> impl Iterator<Item = &Hash> {
        self.by_missing.keys()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}
