use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::state::CausalHistoryState;
use crate::core::{HashspaceError, Result};
use crate::literal::{Hash, Literal, LiteralContext};
use crate::store::Store;

/// Collects literals into a [`LiteralContext`] for transfer, one dependency
/// closure at a time.
///
/// Embedded dependencies are followed, by-hash references are not. Hashes
/// marked as omitted (the receiver already has them) are never packed.
pub struct ObjectPacker {
    store: Store,
    content: LiteralContext,
    omitted: HashSet<Hash>,
}

impl ObjectPacker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            content: LiteralContext::new(),
            omitted: HashSet::new(),
        }
    }

    pub fn content(&self) -> &LiteralContext {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_context(self) -> LiteralContext {
        self.content
    }

    pub fn allow_omission(&mut self, hash: Hash) {
        self.omitted.insert(hash);
    }

    /// Omits `hash` and everything it depends on that the store knows,
    /// embedded or referenced.
    pub async fn allow_omission_with_references(&mut self, hash: &Hash) -> Result<()> {
        let mut queue = vec![hash.clone()];
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(literal) = self.store.load_literal(&current).await? {
                queue.extend(literal.dependencies.iter().map(|d| d.hash.clone()));
            }
            self.omitted.insert(current);
        }
        Ok(())
    }

    fn is_packed_or_omitted(&self, hash: &Hash) -> bool {
        self.content.contains(hash) || self.omitted.contains(hash)
    }

    /// Adds `hash` and its embedded closure, dependencies before dependents.
    ///
    /// Returns `Ok(false)`, leaving the content untouched, when the packed
    /// total would exceed `max_objects`.
    pub async fn try_to_add_object_with_deps(&mut self, hash: &Hash, max_objects: usize) -> Result<bool> {
        let mut ordered: Vec<Literal> = Vec::new();
        let mut loaded: HashMap<Hash, Literal> = HashMap::new();
        let mut seen: HashSet<Hash> = HashSet::new();
        let mut stack = vec![(hash.clone(), false)];

        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                if let Some(literal) = loaded.remove(&current) {
                    ordered.push(literal);
                }
                continue;
            }
            if self.is_packed_or_omitted(&current) || !seen.insert(current.clone()) {
                continue;
            }
            if self.content.len() + seen.len() > max_objects {
                debug!(
                    root = %hash.short(),
                    max_objects,
                    "closure does not fit the packing budget"
                );
                return Ok(false);
            }
            let literal = self
                .store
                .load_literal(&current)
                .await?
                .ok_or_else(|| HashspaceError::MissingDependency(current.clone()))?;
            stack.push((current.clone(), true));
            stack.extend(literal.embedded().map(|d| (d.hash.clone(), false)));
            loaded.insert(current, literal);
        }

        for literal in ordered {
            self.content.insert(literal);
        }
        if self.content.contains(hash) {
            self.content.add_root(hash.clone());
        }
        Ok(true)
    }
}

/// Packs ops of one object for a peer, in causal order, skipping
/// everything the peer's state shows it already has.
pub struct CausalHistoryPacker {
    packer: ObjectPacker,
    max_objects: usize,
}

impl CausalHistoryPacker {
    pub async fn new(store: Store, remote: Option<&CausalHistoryState>, max_objects: usize) -> Result<Self> {
        let mut packer = ObjectPacker::new(store);
        if let Some(remote) = remote {
            for op in remote.terminal_ops() {
                packer.allow_omission_with_references(op).await?;
            }
        }
        Ok(Self {
            packer,
            max_objects,
        })
    }

    /// Packs as many of `ops` as fit, lowest height first. Returns the ops
    /// that made it in; the rest go in a later batch.
    pub async fn add_ops(&mut self, ops: &[Hash]) -> Result<Vec<Hash>> {
        let mut by_height = BTreeSet::new();
        for op in ops {
            let height = match self.packer.store.op_header(op).await? {
                Some(header) => header.height(),
                None => u32::MAX,
            };
            by_height.insert((height, op.clone()));
        }

        let mut packed = Vec::new();
        for (_, op) in by_height {
            if !self
                .packer
                .try_to_add_object_with_deps(&op, self.max_objects)
                .await?
            {
                break;
            }
            packed.push(op);
        }
        Ok(packed)
    }

    pub fn content(&self) -> &LiteralContext {
        self.packer.content()
    }

    pub fn into_context(self) -> LiteralContext {
        self.packer.into_context()
    }
}
