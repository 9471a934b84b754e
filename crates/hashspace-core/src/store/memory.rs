use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::{fold_terminal, page, Backend, SearchParams, SearchResults};
use crate::core::Result;
use crate::literal::{Hash, Literal};

#[derive(Default)]
struct Inner {
    next_seq: u64,
    by_seq: BTreeMap<u64, Literal>,
    seq_of: HashMap<Hash, u64>,
    by_class: HashMap<String, BTreeSet<u64>>,
    by_reference: HashMap<(String, Hash), BTreeSet<u64>>,
    op_headers: HashMap<Hash, Literal>,
    terminal_ops: HashMap<Hash, BTreeSet<Hash>>,
}

impl Inner {
    fn results(&self, seqs: Vec<u64>) -> SearchResults {
        SearchResults {
            start: seqs.first().copied(),
            end: seqs.last().copied(),
            items: seqs
                .iter()
                .filter_map(|seq| self.by_seq.get(seq).cloned())
                .collect(),
        }
    }
}

/// In-process backend. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store(&self, literal: &Literal) -> Result<bool> {
        let mut inner = self.inner.write();
        if inner.seq_of.contains_key(&literal.hash) {
            return Ok(false);
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.seq_of.insert(literal.hash.clone(), seq);
        if let Some(class_name) = literal.class_name() {
            inner
                .by_class
                .entry(class_name.to_string())
                .or_default()
                .insert(seq);
        }
        for dependency in &literal.dependencies {
            inner
                .by_reference
                .entry((dependency.path.clone(), dependency.hash.clone()))
                .or_default()
                .insert(seq);
        }
        inner.by_seq.insert(seq, literal.clone());
        Ok(true)
    }

    async fn load(&self, hash: &Hash) -> Result<Option<Literal>> {
        let inner = self.inner.read();
        Ok(inner
            .seq_of
            .get(hash)
            .and_then(|seq| inner.by_seq.get(seq))
            .cloned())
    }

    async fn search_by_class(
        &self,
        class_name: &str,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        let inner = self.inner.read();
        let seqs = match inner.by_class.get(class_name) {
            Some(seqs) => page(seqs.iter().copied(), params),
            None => Vec::new(),
        };
        Ok(inner.results(seqs))
    }

    async fn search_by_reference(
        &self,
        class_name: Option<&str>,
        path: &str,
        target: &Hash,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        let inner = self.inner.read();
        let Some(seqs) = inner
            .by_reference
            .get(&(path.to_string(), target.clone()))
        else {
            return Ok(SearchResults::default());
        };
        let matching = seqs.iter().copied().filter(|seq| match class_name {
            Some(class_name) => inner
                .by_seq
                .get(seq)
                .and_then(Literal::class_name)
                .is_some_and(|c| c == class_name),
            None => true,
        });
        let seqs: Vec<u64> = matching.collect();
        Ok(inner.results(page(seqs.into_iter(), params)))
    }

    async fn store_op_header(&self, op_hash: &Hash, header: &Literal) -> Result<()> {
        self.inner
            .write()
            .op_headers
            .insert(op_hash.clone(), header.clone());
        Ok(())
    }

    async fn load_op_header(&self, op_hash: &Hash) -> Result<Option<Literal>> {
        Ok(self.inner.read().op_headers.get(op_hash).cloned())
    }

    async fn load_terminal_ops(&self, target: &Hash) -> Result<BTreeSet<Hash>> {
        Ok(self
            .inner
            .read()
            .terminal_ops
            .get(target)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_terminal_op(&self, target: &Hash, op: &Hash, prev_ops: &[Hash]) -> Result<bool> {
        let mut inner = self.inner.write();
        let has_successor = inner
            .by_reference
            .get(&("prevOps".to_string(), op.clone()))
            .is_some_and(|seqs| !seqs.is_empty());
        let before = inner.terminal_ops.get(target).cloned().unwrap_or_default();
        let after = fold_terminal(before.clone(), op, prev_ops, has_successor);
        if after == before {
            return Ok(false);
        }
        inner.terminal_ops.insert(target.clone(), after);
        Ok(true)
    }
}
