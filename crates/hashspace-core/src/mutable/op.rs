use crate::core::Result;
use crate::literal::{FieldReader, FieldWriter, Hash};
use crate::model::{HashReference, HashedObject, HashedSet};

/// Fields every mutation op carries.
#[derive(Debug, Clone, PartialEq)]
pub struct OpMeta {
    /// Object this op mutates.
    pub target: HashReference,
    /// Immediate predecessors within the same object.
    pub prev_ops: HashedSet<HashReference>,
    /// Ops, possibly of other objects, whose validity this op depends on.
    pub causal_ops: HashedSet<HashReference>,
}

impl OpMeta {
    pub fn new(target: HashReference) -> Self {
        Self {
            target,
            prev_ops: HashedSet::new(),
            causal_ops: HashedSet::new(),
        }
    }

    pub fn with_prev_ops(mut self, prev_ops: impl IntoIterator<Item = HashReference>) -> Self {
        for op in prev_ops {
            self.prev_ops.add(op);
        }
        self
    }

    pub fn prev_hashes(&self) -> impl Iterator<Item = &Hash> {
        self.prev_ops.values().map(|r| &r.hash)
    }

    pub fn causal_hashes(&self) -> impl Iterator<Item = &Hash> {
        self.causal_ops.values().map(|r| &r.hash)
    }

    pub fn write(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("target", &self.target)?;
        fields.put("prevOps", &self.prev_ops)?;
        if !self.causal_ops.is_empty() {
            fields.put("causalOps", &self.causal_ops)?;
        }
        Ok(())
    }

    pub fn read(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            target: fields.get("target")?,
            prev_ops: fields.get("prevOps")?,
            causal_ops: fields.get_opt("causalOps")?.unwrap_or_default(),
        })
    }
}

/// An immutable, signed change to one mutable object.
pub trait MutationOp: HashedObject {
    fn meta(&self) -> &OpMeta;

    /// Raw access. Callers go through [`MutationOp::add_causal_op`] and
    /// friends, which keep the hash cache honest.
    fn meta_mut(&mut self) -> &mut OpMeta;

    /// The op this one revokes, if it is a revocation.
    fn revoked_op(&self) -> Option<&HashReference> {
        None
    }

    /// Ops of the same object that must be known before this one is
    /// admitted, besides its prev ops.
    fn required_ops(&self) -> Vec<Hash> {
        self.revoked_op()
            .map(|r| vec![r.hash.clone()])
            .unwrap_or_default()
    }

    fn target(&self) -> &Hash {
        &self.meta().target.hash
    }

    fn add_causal_op(&mut self, op: HashReference) {
        self.meta_mut().causal_ops.add(op);
        self.header_mut().touch();
    }

    fn clear_causal_ops(&mut self) {
        self.meta_mut().causal_ops.clear();
        self.header_mut().touch();
    }
}

/// Hash of `op` with its causal ops removed.
///
/// A use of a capability names this key, so the use and the op it authorizes
/// can reference each other without a hash cycle.
pub fn usage_key<O: MutationOp>(op: &O) -> Result<Hash> {
    if op.meta().causal_ops.is_empty() {
        return op.try_hash();
    }
    let mut bare = op.clone();
    bare.clear_causal_ops();
    bare.try_hash()
}
