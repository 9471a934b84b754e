use std::collections::BTreeSet;

use crate::core::{HashspaceError, Result};
use crate::literal::{DependencyKind, FieldReader, FieldWriter, Hash, Literal, References};
use crate::model::{expect_class, HashedObject, HashedSet, ObjectHeader};

pub const OP_HEADER_CLASS: &str = "hhs/v0/OpHeader";

/// The causal links of a stored op, read off its literal's dependency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpLinks {
    pub op_hash: Hash,
    pub target: Hash,
    pub prev_ops: BTreeSet<Hash>,
    pub causal_ops: BTreeSet<Hash>,
}

impl OpLinks {
    /// `None` when the literal is not an op (it has no `target` reference).
    pub fn of(literal: &Literal) -> Option<Self> {
        let mut target = None;
        let mut prev_ops = BTreeSet::new();
        let mut causal_ops = BTreeSet::new();
        for dependency in &literal.dependencies {
            if dependency.kind != DependencyKind::Reference {
                continue;
            }
            match dependency.path.as_str() {
                "target" => target = Some(dependency.hash.clone()),
                "prevOps" => {
                    prev_ops.insert(dependency.hash.clone());
                }
                "causalOps" => {
                    causal_ops.insert(dependency.hash.clone());
                }
                _ => {}
            }
        }
        Some(Self {
            op_hash: literal.hash.clone(),
            target: target?,
            prev_ops,
            causal_ops,
        })
    }
}

/// Payload-free projection of an op: enough to order ops causally and to
/// prove which object they belong to.
#[derive(Debug, Clone)]
pub struct OpHeader {
    header: ObjectHeader,
    op_hash: Hash,
    mutable_obj: Hash,
    prev_op_headers: HashedSet<Hash>,
    causal_ops: HashedSet<Hash>,
    height: u32,
}

impl OpHeader {
    /// Builds the header of `links`, whose prev ops' headers are `prev_headers`.
    pub fn new(links: &OpLinks, prev_headers: &[&OpHeader]) -> Result<Self> {
        if prev_headers.len() != links.prev_ops.len() {
            return Err(HashspaceError::MissingDependency(
                links
                    .prev_ops
                    .iter()
                    .find(|hash| !prev_headers.iter().any(|h| &h.op_hash == *hash))
                    .cloned()
                    .unwrap_or_else(|| links.op_hash.clone()),
            ));
        }
        let mut prev_op_headers = HashedSet::new();
        for prev in prev_headers {
            prev_op_headers.try_add(prev.try_hash()?)?;
        }
        let height = 1 + prev_headers.iter().map(|h| h.height).max().unwrap_or(0);
        Ok(Self {
            header: ObjectHeader::new(),
            op_hash: links.op_hash.clone(),
            mutable_obj: links.target.clone(),
            prev_op_headers,
            causal_ops: links.causal_ops.iter().cloned().collect(),
            height,
        })
    }

    pub fn op_hash(&self) -> &Hash {
        &self.op_hash
    }

    pub fn mutable_obj(&self) -> &Hash {
        &self.mutable_obj
    }

    pub fn prev_op_headers(&self) -> impl Iterator<Item = &Hash> {
        self.prev_op_headers.values()
    }

    pub fn causal_ops(&self) -> impl Iterator<Item = &Hash> {
        self.causal_ops.values()
    }

    /// 1 for an op with no predecessors, else one more than the highest one.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl HashedObject for OpHeader {
    fn class_name(&self) -> &'static str {
        OP_HEADER_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("opHash", &self.op_hash)?;
        fields.put("mutableObj", &self.mutable_obj)?;
        fields.put("prevOpHeaders", &self.prev_op_headers)?;
        fields.put("causalOps", &self.causal_ops)?;
        fields.put("height", &self.height)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, OP_HEADER_CLASS)?;
        Ok(Self {
            header: ObjectHeader::new(),
            op_hash: fields.get("opHash")?,
            mutable_obj: fields.get("mutableObj")?,
            prev_op_headers: fields.get("prevOpHeaders")?,
            causal_ops: fields.get("causalOps")?,
            height: fields.get("height")?,
        })
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        self.height >= 1
            && (self.height == 1) == self.prev_op_headers.is_empty()
            && self.op_hash.is_well_formed()
            && self.mutable_obj.is_well_formed()
    }
}

crate::embeddable!(OpHeader);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{deliteralize, literalize, Hashing};

    fn links(name: &str, prev: &[&Hash]) -> OpLinks {
        OpLinks {
            op_hash: Hashing::for_str(name),
            target: Hashing::for_str("object"),
            prev_ops: prev.iter().map(|h| (*h).clone()).collect(),
            causal_ops: BTreeSet::new(),
        }
    }

    #[test]
    fn test_height_follows_longest_chain() {
        let a = OpHeader::new(&links("a", &[]), &[]).unwrap();
        let b = OpHeader::new(&links("b", &[a.op_hash()]), &[&a]).unwrap();
        let c = OpHeader::new(&links("c", &[]), &[]).unwrap();
        let d = OpHeader::new(&links("d", &[b.op_hash(), c.op_hash()]), &[&b, &c]).unwrap();
        assert_eq!(a.height(), 1);
        assert_eq!(b.height(), 2);
        assert_eq!(d.height(), 3);
        assert_eq!(d.prev_op_headers().count(), 2);
    }

    #[test]
    fn test_missing_prev_header_is_reported() {
        let a = OpHeader::new(&links("a", &[]), &[]).unwrap();
        let err = OpHeader::new(&links("b", &[a.op_hash()]), &[]).unwrap_err();
        assert!(matches!(err, HashspaceError::MissingDependency(h) if &h == a.op_hash()));
    }

    #[test]
    fn test_round_trip() {
        let a = OpHeader::new(&links("a", &[]), &[]).unwrap();
        let b = OpHeader::new(&links("b", &[a.op_hash()]), &[&a]).unwrap();
        let context = literalize(&b).unwrap();
        let back: OpHeader = deliteralize(&b.hash(), &context).unwrap();
        assert_eq!(back.hash(), b.hash());
        assert_eq!(back.height(), 2);
    }
}
