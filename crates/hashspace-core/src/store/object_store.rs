use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::backend::{Backend, SearchParams};
use super::memory::MemoryBackend;
use crate::core::{HashspaceError, Result};
use crate::history::{CausalHistoryState, OpHeader, OpLinks};
use crate::literal::{deliteralize, literalize, Hash, Literal, LiteralContext, LiteralValue};
use crate::model::{HashedObject, Identity, KnownObject, Signer};
use crate::mutable::set::ADD_OP_CLASS;
use crate::mutable::{MutableObject, MutationOp};

const EVENT_CAPACITY: usize = 256;
const FETCH_PAGE: usize = 256;

/// Broadcast to [`Store::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A literal was stored for the first time.
    Stored {
        hash: Hash,
        class_name: Option<String>,
    },
    /// The terminal ops of `target` changed.
    TerminalOpsChanged { target: Hash },
}

/// Object-level access to a [`Backend`].
///
/// Saving literalizes, signs authored literals with the injected signer and
/// keeps per-object terminal ops and op headers up to date. Loading rebuilds
/// and validates objects from their stored closure.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    signer: Arc<dyn Signer>,
    events: broadcast::Sender<StoreEvent>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>, signer: Arc<dyn Signer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            signer,
            events,
        }
    }

    pub fn in_memory(signer: Arc<dyn Signer>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), signer)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Saves `object` and everything it embeds. The object's header receives
    /// the signature its literal was stored with.
    pub async fn save<T: HashedObject>(&self, object: &mut T) -> Result<Hash> {
        let hash = object.try_hash()?;
        let mut context = literalize(object)?;
        self.sign(&mut context)?;
        let signature = context.get(&hash).and_then(|l| l.signature.clone());
        if signature.is_some() {
            object.header_mut().set_signature(signature);
        }
        self.store_context(&context).await?;
        Ok(hash)
    }

    /// Saves the object itself and then every op it has not saved yet.
    /// Ops that could not be saved stay queued.
    pub async fn save_mutable<M: MutableObject>(&self, object: &mut M) -> Result<Hash> {
        let hash = self.save(object).await?;
        let mut ops = object.take_unsaved_ops().into_iter();
        let mut saved = 0usize;
        while let Some(mut op) = ops.next() {
            if let Err(e) = self.save(&mut op).await {
                object.op_log_mut().push_unsaved(op);
                for rest in ops {
                    object.op_log_mut().push_unsaved(rest);
                }
                return Err(e);
            }
            saved += 1;
        }
        info!(object = %hash.short(), class = object.class_name(), ops = saved, "saved mutable object");
        Ok(hash)
    }

    /// Stores literals received from a peer. Returns how many were new.
    ///
    /// Nothing is stored unless every literal checks out: hashes must match,
    /// objects of known classes must decode with validation, and every other
    /// authored literal must carry its author's signature. Embedded
    /// dependencies the batch leaves out are read from the store.
    pub async fn receive_literals(&self, context: &LiteralContext) -> Result<usize> {
        context.check_hashes()?;
        let view = self.with_stored_dependencies(context).await?;
        for literal in context.literals.values() {
            verify_received(literal, &view)?;
        }
        let stored = self.store_context(context).await?;
        debug!(received = context.len(), stored, "received literals");
        Ok(stored)
    }

    pub async fn load_literal(&self, hash: &Hash) -> Result<Option<Literal>> {
        self.backend.load(hash).await
    }

    /// The literal under `hash` plus its embedded closure, with `hash` as root.
    pub async fn load_literal_context(&self, hash: &Hash) -> Result<Option<LiteralContext>> {
        let Some(root) = self.backend.load(hash).await? else {
            return Ok(None);
        };
        let mut context = LiteralContext::new();
        let mut queue: Vec<Hash> = root.embedded().map(|d| d.hash.clone()).collect();
        context.insert(root);
        context.add_root(hash.clone());
        while let Some(current) = queue.pop() {
            if context.contains(&current) {
                continue;
            }
            let literal = self
                .backend
                .load(&current)
                .await?
                .ok_or_else(|| HashspaceError::MissingDependency(current.clone()))?;
            queue.extend(literal.embedded().map(|d| d.hash.clone()));
            context.insert(literal);
        }
        Ok(Some(context))
    }

    /// Loads and validates the object under `hash`.
    pub async fn load<T: HashedObject>(&self, hash: &Hash) -> Result<Option<T>> {
        match self.load_literal_context(hash).await? {
            Some(context) => deliteralize(hash, &context).map(Some),
            None => Ok(None),
        }
    }

    /// Loads an object of any known class.
    pub async fn load_any(&self, hash: &Hash) -> Result<Option<KnownObject>> {
        match self.load_literal_context(hash).await? {
            Some(context) => KnownObject::decode(hash, &context).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored op targeting `target` that decodes as `O`. Ops that fail
    /// to decode are logged and skipped.
    pub async fn fetch_ops<O: MutationOp>(&self, target: &Hash) -> Result<Vec<O>> {
        let mut ops = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .backend
                .search_by_reference(None, "target", target, &SearchParams::limit(FETCH_PAGE).after(cursor))
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page.end;
            for literal in page.items {
                if OpLinks::of(&literal).is_none() {
                    continue;
                }
                match self.load::<O>(&literal.hash).await {
                    Ok(Some(op)) => ops.push(op),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(op = %literal.hash.short(), error = %e, "skipping stored op");
                    }
                }
            }
        }
        Ok(ops)
    }

    /// Feeds every stored op of `object` into it. Returns how many ops were
    /// admitted, including ops that were waiting in the pending buffer.
    pub async fn load_all_changes<M: MutableObject>(&self, object: &mut M) -> Result<usize> {
        let target = object.try_hash()?;
        let before = object.op_log().len();
        for op in self.fetch_ops::<M::Op>(&target).await? {
            object.ingest_op(op);
        }
        let admitted = object.op_log().len() - before;
        info!(
            object = %target.short(),
            admitted,
            pending = object.pending_count(),
            "loaded changes"
        );
        Ok(admitted)
    }

    pub async fn terminal_ops(&self, target: &Hash) -> Result<BTreeSet<Hash>> {
        self.backend.load_terminal_ops(target).await
    }

    pub async fn causal_history_state(&self, target: &Hash) -> Result<CausalHistoryState> {
        let terminal = self.backend.load_terminal_ops(target).await?;
        CausalHistoryState::create_from_terminal_ops(target, &terminal, self).await
    }

    /// Header of a stored op, built (together with any missing ancestor
    /// headers) on first request. `None` while some ancestor is not stored.
    pub async fn op_header(&self, op_hash: &Hash) -> Result<Option<OpHeader>> {
        let mut built: HashMap<Hash, OpHeader> = HashMap::new();
        let mut stack = vec![op_hash.clone()];
        while let Some(current) = stack.last().cloned() {
            if built.contains_key(&current) {
                stack.pop();
                continue;
            }
            if let Some(header) = self.stored_op_header(&current).await? {
                built.insert(current, header);
                stack.pop();
                continue;
            }
            let Some(literal) = self.backend.load(&current).await? else {
                return Ok(None);
            };
            let links = OpLinks::of(&literal).ok_or_else(|| {
                HashspaceError::MalformedLiteral(format!("{} is not an op", current.short()))
            })?;
            let waiting: Vec<Hash> = links
                .prev_ops
                .iter()
                .filter(|prev| !built.contains_key(*prev))
                .cloned()
                .collect();
            if !waiting.is_empty() {
                stack.extend(waiting);
                continue;
            }
            let prev_headers: Vec<&OpHeader> =
                links.prev_ops.iter().filter_map(|prev| built.get(prev)).collect();
            let header = OpHeader::new(&links, &prev_headers)?;
            self.store_op_header(&header).await?;
            built.insert(current, header);
            stack.pop();
        }
        Ok(built.remove(op_hash))
    }

    async fn stored_op_header(&self, op_hash: &Hash) -> Result<Option<OpHeader>> {
        let Some(literal) = self.backend.load_op_header(op_hash).await? else {
            return Ok(None);
        };
        let hash = literal.hash.clone();
        let mut context = LiteralContext::new();
        context.insert(literal);
        deliteralize(&hash, &context).map(Some)
    }

    async fn store_op_header(&self, header: &OpHeader) -> Result<()> {
        let hash = header.try_hash()?;
        let context = literalize(header)?;
        let literal = context
            .get(&hash)
            .ok_or_else(|| HashspaceError::MissingDependency(hash.clone()))?;
        self.backend.store(literal).await?;
        self.backend.store_op_header(header.op_hash(), literal).await
    }

    /// `context` plus every embedded dependency it lacks, loaded from the
    /// backend.
    async fn with_stored_dependencies(&self, context: &LiteralContext) -> Result<LiteralContext> {
        let mut view = context.clone();
        let mut queue: Vec<Hash> = context
            .literals
            .values()
            .flat_map(|literal| literal.embedded().map(|d| d.hash.clone()))
            .collect();
        while let Some(current) = queue.pop() {
            if view.contains(&current) {
                continue;
            }
            let literal = self
                .backend
                .load(&current)
                .await?
                .ok_or_else(|| HashspaceError::MissingDependency(current.clone()))?;
            queue.extend(literal.embedded().map(|d| d.hash.clone()));
            view.insert(literal);
        }
        Ok(view)
    }

    fn sign(&self, context: &mut LiteralContext) -> Result<()> {
        for literal in context.literals.values_mut() {
            if literal.signature.is_some() {
                continue;
            }
            let Some(author) = literal.author().cloned() else {
                continue;
            };
            let signature = self.signer.sign_as(&author, &literal.hash).ok_or_else(|| {
                HashspaceError::Crypto(format!(
                    "no key for author {} of {}",
                    author.short(),
                    literal.hash.short()
                ))
            })?;
            literal.signature = Some(signature);
        }
        Ok(())
    }

    async fn store_context(&self, context: &LiteralContext) -> Result<usize> {
        let mut stored = 0;
        let mut ops = Vec::new();
        for literal in context.literals.values() {
            if !self.backend.store(literal).await? {
                continue;
            }
            stored += 1;
            let _ = self.events.send(StoreEvent::Stored {
                hash: literal.hash.clone(),
                class_name: literal.class_name().map(str::to_string),
            });
            if let Some(links) = OpLinks::of(literal) {
                ops.push(links);
            }
        }
        for links in ops {
            self.record_op(&links).await?;
        }
        Ok(stored)
    }

    /// Updates the terminal ops of the op's target: the op's prev ops stop
    /// being terminal, and the op becomes terminal unless a stored op
    /// already lists it as a prev op.
    async fn record_op(&self, links: &OpLinks) -> Result<()> {
        let prev_ops: Vec<Hash> = links.prev_ops.iter().cloned().collect();
        let changed = self
            .backend
            .record_terminal_op(&links.target, &links.op_hash, &prev_ops)
            .await?;
        if changed {
            let _ = self.events.send(StoreEvent::TerminalOpsChanged {
                target: links.target.clone(),
            });
        }
        if self.op_header(&links.op_hash).await?.is_none() {
            debug!(op = %links.op_hash.short(), "op header waits for ancestors");
        }
        Ok(())
    }
}

/// Set add ops are decoded with text elements by [`KnownObject`]; other
/// element types only get their signature checked.
fn decodes_as_known(literal: &Literal, class_name: &str) -> bool {
    if !KnownObject::is_known_class(class_name) {
        return false;
    }
    if class_name != ADD_OP_CLASS {
        return true;
    }
    match &literal.value {
        LiteralValue::HashedObject { fields, .. } => {
            matches!(fields.get("element"), Some(LiteralValue::String { .. }))
        }
        _ => false,
    }
}

fn verify_received(literal: &Literal, view: &LiteralContext) -> Result<()> {
    let Some(class_name) = literal.class_name() else {
        return Ok(());
    };
    if decodes_as_known(literal, class_name) {
        KnownObject::decode(&literal.hash, view)?;
        return Ok(());
    }
    let Some(author_hash) = literal.author() else {
        return Ok(());
    };
    let author: Identity = deliteralize(author_hash, view)?;
    let signature = literal.signature.as_deref().ok_or_else(|| {
        HashspaceError::ValidationFailed(format!("{} is authored but unsigned", literal.hash))
    })?;
    if !author.verify_signature(&literal.hash, signature) {
        return Err(HashspaceError::ValidationFailed(format!(
            "bad signature on {}",
            literal.hash
        )));
    }
    Ok(())
}
