use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::log::OpLog;
use super::object::MutableObject;
use super::op::{MutationOp, OpMeta};
use crate::core::{HashspaceError, Result};
use crate::literal::{
    hash_of, Decoder, Deliteralize, Encoder, FieldReader, FieldWriter, Hash, Literalize,
    LiteralValue,
};
use crate::model::{expect_class, HashReference, HashedObject, HashedSet, Identity, ObjectHeader};

pub const MUTABLE_SET_CLASS: &str = "hhs/v0/MutableSet";
pub const ADD_OP_CLASS: &str = "hhs/v0/MutableSet/AddOp";
pub const DELETE_OP_CLASS: &str = "hhs/v0/MutableSet/DeleteOp";

/// Bounds for values a mutable set can hold.
pub trait SetElement: Literalize + Deliteralize + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> SetElement for T where T: Literalize + Deliteralize + Clone + fmt::Debug + Send + Sync + 'static {}

#[derive(Debug, Clone)]
pub enum SetOpKind<T> {
    Add {
        element: T,
    },
    /// Removes the listed add ops of one element.
    Delete {
        element_hash: Hash,
        deleted_ops: HashedSet<HashReference>,
    },
}

/// Add or delete op of a [`MutableSet`] (and of a permissioned set).
#[derive(Debug, Clone)]
pub struct SetOp<T> {
    header: ObjectHeader,
    meta: OpMeta,
    kind: SetOpKind<T>,
}

impl<T: SetElement> SetOp<T> {
    pub fn add(meta: OpMeta, element: T) -> Self {
        Self {
            header: ObjectHeader::new(),
            meta,
            kind: SetOpKind::Add { element },
        }
    }

    pub fn delete(meta: OpMeta, element_hash: Hash, deleted_ops: HashedSet<HashReference>) -> Self {
        Self {
            header: ObjectHeader::new(),
            meta,
            kind: SetOpKind::Delete {
                element_hash,
                deleted_ops,
            },
        }
    }

    pub fn kind(&self) -> &SetOpKind<T> {
        &self.kind
    }
}

impl<T: SetElement> HashedObject for SetOp<T> {
    fn class_name(&self) -> &'static str {
        match self.kind {
            SetOpKind::Add { .. } => ADD_OP_CLASS,
            SetOpKind::Delete { .. } => DELETE_OP_CLASS,
        }
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        self.meta.write(fields)?;
        match &self.kind {
            SetOpKind::Add { element } => fields.put("element", element),
            SetOpKind::Delete {
                element_hash,
                deleted_ops,
            } => {
                fields.put("elementHash", element_hash)?;
                fields.put("deletedOps", deleted_ops)
            }
        }
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        let meta = OpMeta::read(fields)?;
        let kind = match class_name {
            ADD_OP_CLASS => SetOpKind::Add {
                element: fields.get("element")?,
            },
            DELETE_OP_CLASS => SetOpKind::Delete {
                element_hash: fields.get("elementHash")?,
                deleted_ops: fields.get("deletedOps")?,
            },
            other => return Err(HashspaceError::UnknownClass(other.to_string())),
        };
        Ok(Self {
            header: ObjectHeader::new(),
            meta,
            kind,
        })
    }

    fn validate(&self, _references: &crate::literal::References<'_>) -> bool {
        match &self.kind {
            SetOpKind::Add { .. } => true,
            SetOpKind::Delete { deleted_ops, .. } => !deleted_ops.is_empty(),
        }
    }
}

impl<T: SetElement> MutationOp for SetOp<T> {
    fn meta(&self) -> &OpMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut OpMeta {
        &mut self.meta
    }

    fn required_ops(&self) -> Vec<Hash> {
        match &self.kind {
            SetOpKind::Add { .. } => Vec::new(),
            SetOpKind::Delete { deleted_ops, .. } => {
                deleted_ops.values().map(|r| r.hash.clone()).collect()
            }
        }
    }
}

impl<T: SetElement> Literalize for SetOp<T> {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        encoder.embed(self, path)
    }
}

impl<T: SetElement> Deliteralize for SetOp<T> {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Dependency { hash } => decoder.object(hash),
            other => Err(HashspaceError::MalformedLiteral(format!(
                "expected embedded op, found {}",
                other.type_name()
            ))),
        }
    }
}

/// Fold of add/delete ops: an element is present while some active add of
/// it is not removed by an active delete.
#[derive(Debug, Clone)]
pub struct SetState<T> {
    elements: BTreeMap<Hash, T>,
    adds: BTreeMap<Hash, BTreeSet<Hash>>,
    deleters: BTreeMap<Hash, BTreeSet<Hash>>,
}

impl<T> Default for SetState<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            adds: BTreeMap::new(),
            deleters: BTreeMap::new(),
        }
    }
}

impl<T: SetElement> SetState<T> {
    /// Folds one status change, returning whether membership changed.
    pub fn apply(&mut self, op_hash: &Hash, op: &SetOp<T>, active: bool) -> bool {
        match &op.kind {
            SetOpKind::Add { element } => {
                let Ok(element_hash) = hash_of(element) else {
                    return false;
                };
                let before = self.has_hash(&element_hash);
                if active {
                    self.elements
                        .entry(element_hash.clone())
                        .or_insert_with(|| element.clone());
                    self.adds
                        .entry(element_hash.clone())
                        .or_default()
                        .insert(op_hash.clone());
                } else if let Some(adds) = self.adds.get_mut(&element_hash) {
                    adds.remove(op_hash);
                }
                before != self.has_hash(&element_hash)
            }
            SetOpKind::Delete {
                element_hash,
                deleted_ops,
            } => {
                let before = self.has_hash(element_hash);
                for deleted in deleted_ops.values() {
                    let deleters = self.deleters.entry(deleted.hash.clone()).or_default();
                    if active {
                        deleters.insert(op_hash.clone());
                    } else {
                        deleters.remove(op_hash);
                    }
                }
                before != self.has_hash(element_hash)
            }
        }
    }

    pub fn has_hash(&self, element_hash: &Hash) -> bool {
        self.adds.get(element_hash).is_some_and(|adds| {
            adds.iter()
                .any(|add| self.deleters.get(add).map_or(true, |d| d.is_empty()))
        })
    }

    pub fn has(&self, element: &T) -> bool {
        hash_of(element).is_ok_and(|hash| self.has_hash(&hash))
    }

    /// Active add ops of an element not yet deleted.
    pub fn live_adds(&self, element_hash: &Hash) -> Vec<Hash> {
        self.adds
            .get(element_hash)
            .map(|adds| {
                adds.iter()
                    .filter(|add| self.deleters.get(*add).map_or(true, |d| d.is_empty()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn values(&self) -> Vec<&T> {
        self.elements
            .iter()
            .filter(|(hash, _)| self.has_hash(hash))
            .map(|(_, element)| element)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.elements.keys().filter(|hash| self.has_hash(hash)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Set mutated through add/delete ops. When `writers` is non-empty only
/// those identities may author ops; otherwise anyone, or no one, may.
#[derive(Debug, Clone)]
pub struct MutableSet<T> {
    header: ObjectHeader,
    writers: HashedSet<Identity>,
    log: OpLog<SetOp<T>>,
    state: SetState<T>,
}

impl<T: SetElement> Default for MutableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SetElement> MutableSet<T> {
    pub fn new() -> Self {
        Self {
            header: ObjectHeader::new(),
            writers: HashedSet::new(),
            log: OpLog::new(),
            state: SetState::default(),
        }
    }

    pub fn with_writers(writers: impl IntoIterator<Item = Identity>) -> Self {
        let mut set = Self::new();
        set.writers = writers.into_iter().collect();
        set
    }

    pub fn writers(&self) -> &HashedSet<Identity> {
        &self.writers
    }

    pub fn add(&mut self, element: T, author: Option<&Identity>) -> Result<Hash> {
        let mut op = SetOp::add(self.new_op_meta(), element);
        if let Some(author) = author {
            op.set_author(author.clone());
        }
        self.apply_new_op(op)
    }

    /// Deletes every live add of `element`. Returns `None` when it is absent.
    pub fn delete(&mut self, element: &T, author: Option<&Identity>) -> Result<Option<Hash>> {
        let element_hash = hash_of(element)?;
        let adds = self.state.live_adds(&element_hash);
        if adds.is_empty() {
            return Ok(None);
        }
        let deleted = adds
            .into_iter()
            .map(|hash| HashReference::new(hash, ADD_OP_CLASS))
            .collect();
        let mut op = SetOp::delete(self.new_op_meta(), element_hash, deleted);
        if let Some(author) = author {
            op.set_author(author.clone());
        }
        self.apply_new_op(op).map(Some)
    }

    pub fn has(&self, element: &T) -> bool {
        self.state.has(element)
    }

    pub fn values(&self) -> Vec<&T> {
        self.state.values()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Shared check for delete ops: every deleted op must be an add of the same
/// element.
pub(crate) fn deletes_match<T: SetElement>(log: &OpLog<SetOp<T>>, op: &SetOp<T>) -> bool {
    let SetOpKind::Delete {
        element_hash,
        deleted_ops,
    } = &op.kind
    else {
        return true;
    };
    deleted_ops.values().all(|deleted| match log.get(&deleted.hash) {
        Some(SetOp {
            kind: SetOpKind::Add { element },
            ..
        }) => hash_of(element).is_ok_and(|hash| &hash == element_hash),
        _ => false,
    })
}

impl<T: SetElement> HashedObject for MutableSet<T> {
    fn class_name(&self) -> &'static str {
        MUTABLE_SET_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("writers", &self.writers)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, MUTABLE_SET_CLASS)?;
        let mut set = Self::new();
        set.writers = fields.get("writers")?;
        Ok(set)
    }
}

impl<T: SetElement> MutableObject for MutableSet<T> {
    type Op = SetOp<T>;

    fn op_log(&self) -> &OpLog<Self::Op> {
        &self.log
    }

    fn op_log_mut(&mut self) -> &mut OpLog<Self::Op> {
        &mut self.log
    }

    fn mutate(&mut self, op: &Self::Op, active: bool, _is_new: bool) -> bool {
        let Ok(hash) = op.try_hash() else {
            return false;
        };
        self.state.apply(&hash, op, active)
    }

    fn should_accept_mutation_op(&self, op: &Self::Op) -> bool {
        if !self.writers.is_empty() {
            let Some(author) = op.author() else {
                return false;
            };
            if !self.writers.has(author) {
                return false;
            }
        }
        deletes_match(&self.log, op)
    }

    fn accepts_anonymous_ops(&self) -> bool {
        self.writers.is_empty()
    }
}

impl<T: SetElement> Literalize for MutableSet<T> {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        encoder.embed(self, path)
    }
}

impl<T: SetElement> Deliteralize for MutableSet<T> {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Dependency { hash } => decoder.object(hash),
            other => Err(HashspaceError::MalformedLiteral(format!(
                "expected embedded set, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{deliteralize, literalize};
    use crate::model::KeyPair;

    fn set_with_id(id: &str) -> MutableSet<String> {
        let mut set = MutableSet::new();
        set.set_id(id);
        set
    }

    #[test]
    fn test_add_delete_has() {
        let mut set = set_with_id("fruit");
        set.add("apple".to_string(), None).unwrap();
        set.add("pear".to_string(), None).unwrap();
        assert!(set.has(&"apple".to_string()));
        assert_eq!(set.len(), 2);

        let deleted = set.delete(&"apple".to_string(), None).unwrap();
        assert!(deleted.is_some());
        assert!(!set.has(&"apple".to_string()));
        assert_eq!(set.delete(&"apple".to_string(), None).unwrap(), None);
        assert_eq!(set.values(), vec![&"pear".to_string()]);
    }

    #[test]
    fn test_concurrent_add_survives_delete() {
        let mut a = set_with_id("tags");
        a.add("x".to_string(), None).unwrap();
        let mut b = a.clone();

        a.delete(&"x".to_string(), None).unwrap();
        // b re-adds concurrently, with a different prev frontier than a's delete saw
        b.add("x".to_string(), None).unwrap();

        for op in b.take_unsaved_ops() {
            a.ingest_op(op);
        }
        assert!(a.has(&"x".to_string()));
    }

    #[test]
    fn test_writers_enforced() {
        let alice = Identity::from_key_pair(&KeyPair::from_seed([1u8; 32]), Some("alice"));
        let mallory = Identity::from_key_pair(&KeyPair::from_seed([2u8; 32]), Some("mallory"));
        let mut set: MutableSet<String> = MutableSet::with_writers([alice.clone()]);
        set.set_id("guarded");

        set.add("ok".to_string(), Some(&alice)).unwrap();
        let err = set.add("bad".to_string(), Some(&mallory)).unwrap_err();
        assert!(matches!(err, HashspaceError::UnauthorizedMutation(_)));
        assert!(set.add("anon".to_string(), None).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ops_round_trip() {
        let mut set = set_with_id("numbers");
        let hash = set.add("one".to_string(), None).unwrap();
        let op = set.op_log().get(&hash).cloned().unwrap();

        let context = literalize(&op).unwrap();
        let back: SetOp<String> = deliteralize(&hash, &context).unwrap();
        assert_eq!(back.hash(), hash);
        assert_eq!(back.target(), &set.hash());
    }

    #[test]
    fn test_out_of_order_delivery() {
        let mut source = set_with_id("log");
        source.add("a".to_string(), None).unwrap();
        source.add("b".to_string(), None).unwrap();
        source.delete(&"a".to_string(), None).unwrap();
        let ops = source.take_unsaved_ops();

        let mut replica = set_with_id("log");
        for op in ops.into_iter().rev() {
            replica.ingest_op(op);
        }
        assert_eq!(replica.pending_count(), 0);
        assert_eq!(replica.terminal_ops(), source.terminal_ops());
        assert_eq!(replica.values(), source.values());
    }
}
