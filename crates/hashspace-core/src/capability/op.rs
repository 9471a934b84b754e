use crate::core::{HashspaceError, Result};
use crate::literal::{FieldReader, FieldWriter, Hash, References};
use crate::model::{HashReference, HashedObject, Identity, ObjectHeader};
use crate::mutable::{MutationOp, OpMeta};

pub const GRANT_OP_CLASS: &str = "hhs/v0/CapabilitySet/GrantOp";
pub const REVOKE_AFTER_OP_CLASS: &str = "hhs/v0/CapabilitySet/RevokeAfterOp";
pub const USE_OP_CLASS: &str = "hhs/v0/CapabilitySet/UseOp";

#[derive(Debug, Clone)]
pub enum CapabilityOpKind {
    /// Gives `grantee` the named capability.
    Grant {
        grantee: Identity,
        capability: String,
    },
    /// Invalidates everything built on `revoked` that the revocation did not
    /// already see.
    RevokeAfter { revoked: HashReference },
    /// Consumes `grant` to authorize the op whose usage key is `usage`. The
    /// grant is also one of the use's causal ops.
    Use { grant: HashReference, usage: Hash },
}

/// Op of a [`CapabilitySet`](super::CapabilitySet).
#[derive(Debug, Clone)]
pub struct CapabilityOp {
    header: ObjectHeader,
    meta: OpMeta,
    kind: CapabilityOpKind,
}

impl CapabilityOp {
    pub fn grant(meta: OpMeta, grantee: Identity, capability: &str) -> Self {
        Self {
            header: ObjectHeader::new(),
            meta,
            kind: CapabilityOpKind::Grant {
                grantee,
                capability: capability.to_string(),
            },
        }
    }

    pub fn revoke_after(meta: OpMeta, revoked: HashReference) -> Self {
        Self {
            header: ObjectHeader::new(),
            meta,
            kind: CapabilityOpKind::RevokeAfter { revoked },
        }
    }

    pub fn use_grant(mut meta: OpMeta, grant: HashReference, usage: Hash) -> Self {
        meta.causal_ops.add(grant.clone());
        Self {
            header: ObjectHeader::new(),
            meta,
            kind: CapabilityOpKind::Use { grant, usage },
        }
    }

    pub fn kind(&self) -> &CapabilityOpKind {
        &self.kind
    }

    /// Grantee and capability, for grant ops.
    pub fn granted(&self) -> Option<(&Identity, &str)> {
        match &self.kind {
            CapabilityOpKind::Grant {
                grantee,
                capability,
            } => Some((grantee, capability)),
            _ => None,
        }
    }

    pub fn is_revocation(&self) -> bool {
        matches!(self.kind, CapabilityOpKind::RevokeAfter { .. })
    }
}

impl HashedObject for CapabilityOp {
    fn class_name(&self) -> &'static str {
        match self.kind {
            CapabilityOpKind::Grant { .. } => GRANT_OP_CLASS,
            CapabilityOpKind::RevokeAfter { .. } => REVOKE_AFTER_OP_CLASS,
            CapabilityOpKind::Use { .. } => USE_OP_CLASS,
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
            CapabilityOpKind::Grant {
                grantee,
                capability,
            } => {
                fields.put("grantee", grantee)?;
                fields.put("capability", capability)
            }
            CapabilityOpKind::RevokeAfter { revoked } => fields.put("revoked", revoked),
            CapabilityOpKind::Use { grant, usage } => {
                fields.put("grant", grant)?;
                fields.put("usage", usage)
            }
        }
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        let meta = OpMeta::read(fields)?;
        let kind = match class_name {
            GRANT_OP_CLASS => CapabilityOpKind::Grant {
                grantee: fields.get("grantee")?,
                capability: fields.get("capability")?,
            },
            REVOKE_AFTER_OP_CLASS => CapabilityOpKind::RevokeAfter {
                revoked: fields.get("revoked")?,
            },
            USE_OP_CLASS => CapabilityOpKind::Use {
                grant: fields.get("grant")?,
                usage: fields.get("usage")?,
            },
            other => return Err(HashspaceError::UnknownClass(other.to_string())),
        };
        Ok(Self {
            header: ObjectHeader::new(),
            meta,
            kind,
        })
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        match &self.kind {
            CapabilityOpKind::Grant { capability, .. } => !capability.is_empty(),
            CapabilityOpKind::RevokeAfter { revoked } => {
                revoked.class_name == GRANT_OP_CLASS || revoked.class_name == REVOKE_AFTER_OP_CLASS
            }
            CapabilityOpKind::Use { grant, .. } => {
                grant.class_name == GRANT_OP_CLASS && self.meta.causal_ops.has(grant)
            }
        }
    }
}

impl MutationOp for CapabilityOp {
    fn meta(&self) -> &OpMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut OpMeta {
        &mut self.meta
    }

    fn revoked_op(&self) -> Option<&HashReference> {
        match &self.kind {
            CapabilityOpKind::RevokeAfter { revoked } => Some(revoked),
            _ => None,
        }
    }
}

crate::embeddable!(CapabilityOp);
