use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::literal::{Hash, Literal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    #[default]
    Asc,
    Desc,
}

/// Paging for searches. `start` is an exclusive cursor taken from a
/// previous [`SearchResults::end`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub order: SearchOrder,
    pub start: Option<u64>,
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: Option<u64>) -> Self {
        self.start = cursor;
        self
    }
}

/// One page of literals in insertion order. `start` and `end` are the
/// cursors of the first and last item.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub items: Vec<Literal>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Persistence for literals, op headers and terminal-op sets.
///
/// Every literal gets a sequence number on first store; searches page over
/// it. `search_by_reference` matches dependencies (embedded or by-reference)
/// recorded at `path` and pointing at `target`.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Stores a literal. Returns `false` when it was already present.
    async fn store(&self, literal: &Literal) -> Result<bool>;

    async fn load(&self, hash: &Hash) -> Result<Option<Literal>>;

    async fn search_by_class(&self, class_name: &str, params: &SearchParams)
        -> Result<SearchResults>;

    async fn search_by_reference(
        &self,
        class_name: Option<&str>,
        path: &str,
        target: &Hash,
        params: &SearchParams,
    ) -> Result<SearchResults>;

    async fn store_op_header(&self, op_hash: &Hash, header: &Literal) -> Result<()>;

    async fn load_op_header(&self, op_hash: &Hash) -> Result<Option<Literal>>;

    async fn load_terminal_ops(&self, target: &Hash) -> Result<BTreeSet<Hash>>;

    /// Folds one stored op into the terminal ops of `target` as a single
    /// step: `prev_ops` leave the set and `op` joins it unless a stored
    /// literal already lists it under `prevOps`. Returns whether the set
    /// changed.
    async fn record_terminal_op(&self, target: &Hash, op: &Hash, prev_ops: &[Hash]) -> Result<bool>;
}

/// The terminal set after recording `op`.
pub(crate) fn fold_terminal(
    mut terminal: BTreeSet<Hash>,
    op: &Hash,
    prev_ops: &[Hash],
    has_successor: bool,
) -> BTreeSet<Hash> {
    for prev in prev_ops {
        terminal.remove(prev);
    }
    if !has_successor {
        terminal.insert(op.clone());
    }
    terminal
}

/// Keeps the window of `seqs` a search asks for.
pub(crate) fn page(seqs: impl DoubleEndedIterator<Item = u64>, params: &SearchParams) -> Vec<u64> {
    let limit = params.limit.unwrap_or(usize::MAX);
    match (params.order, params.start) {
        (SearchOrder::Asc, Some(start)) => seqs.filter(|s| *s > start).take(limit).collect(),
        (SearchOrder::Asc, None) => seqs.take(limit).collect(),
        (SearchOrder::Desc, Some(start)) => seqs.rev().filter(|s| *s < start).take(limit).collect(),
        (SearchOrder::Desc, None) => seqs.rev().take(limit).collect(),
    }
}
