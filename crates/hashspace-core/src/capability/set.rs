use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::op::{CapabilityOp, CapabilityOpKind, USE_OP_CLASS};
use crate::core::{HashspaceError, Result};
use crate::literal::{FieldReader, FieldWriter, Hash, References};
use crate::model::{expect_class, HashReference, HashedObject, HashedSet, Identity, ObjectHeader};
use crate::mutable::{usage_key, MutableObject, MutationOp, OpLog};

pub const CAPABILITY_SET_CLASS: &str = "hhs/v0/CapabilitySet";

/// Capability that lets its holder grant and revoke other capabilities.
pub const ADMIN: &str = "admin";

/// Owners plus a causal log of grant, revoke-after and use ops.
///
/// Owners can do anything. Grants of non-admin capabilities (and their
/// revocations) may also be issued by an admin, whose op must carry a use of
/// a valid admin grant bound to it. A grant stops counting as soon as a
/// concurrent revocation of anything it causally depends on is active, and
/// counts again if that revocation is itself revoked.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    header: ObjectHeader,
    owners: HashedSet<Identity>,
    log: OpLog<CapabilityOp>,
    valid_grants: BTreeMap<(Hash, String), BTreeSet<Hash>>,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl CapabilitySet {
    pub fn new(owners: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            header: ObjectHeader::new(),
            owners: owners.into_iter().collect(),
            log: OpLog::new(),
            valid_grants: BTreeMap::new(),
        }
    }

    pub fn owners(&self) -> &HashedSet<Identity> {
        &self.owners
    }

    pub fn is_owner(&self, identity: &Identity) -> bool {
        self.owners.has(identity)
    }

    /// Owner, or holder of a valid grant of `capability`.
    pub fn has_capability(&self, identity: &Identity, capability: &str) -> bool {
        self.is_owner(identity) || self.find_valid_grant(identity, capability).is_some()
    }

    /// The valid grant with the smallest hash, so every replica picks the same one.
    pub fn find_valid_grant(&self, grantee: &Identity, capability: &str) -> Option<&CapabilityOp> {
        self.valid_grants
            .get(&(grantee.hash(), capability.to_string()))
            .and_then(|grants| grants.first())
            .and_then(|hash| self.log.get(hash))
    }

    pub fn find_all_valid_grants(&self, grantee: &Identity, capability: &str) -> Vec<&CapabilityOp> {
        self.valid_grants
            .get(&(grantee.hash(), capability.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|hash| self.log.get(hash))
            .collect()
    }

    pub fn grant(&mut self, issuer: &Identity, grantee: &Identity, capability: &str) -> Result<Hash> {
        let mut op = CapabilityOp::grant(self.new_op_meta(), grantee.clone(), capability);
        op.set_author(issuer.clone());
        if !self.is_owner(issuer) {
            if capability == ADMIN {
                return Err(HashspaceError::UnauthorizedMutation(
                    "only owners grant admin".into(),
                ));
            }
            return self.apply_as_admin(issuer, op);
        }
        self.apply_new_op(op)
    }

    pub fn revoke_after(&mut self, issuer: &Identity, revoked: &Hash) -> Result<Hash> {
        let target = self
            .log
            .get(revoked)
            .ok_or_else(|| HashspaceError::MissingDependency(revoked.clone()))?;
        let owner_only = match target.kind() {
            CapabilityOpKind::Grant { capability, .. } => capability == ADMIN,
            CapabilityOpKind::RevokeAfter { .. } => true,
            CapabilityOpKind::Use { .. } => {
                return Err(HashspaceError::ValidationFailed(
                    "uses cannot be revoked, revoke the grant".into(),
                ))
            }
        };
        let reference = target.to_reference();

        let mut op = CapabilityOp::revoke_after(self.new_op_meta(), reference);
        op.set_author(issuer.clone());
        if !self.is_owner(issuer) {
            if owner_only {
                return Err(HashspaceError::UnauthorizedMutation(
                    "only owners revoke admin grants and revocations".into(),
                ));
            }
            return self.apply_as_admin(issuer, op);
        }
        self.apply_new_op(op)
    }

    /// Applies a use of `user`'s valid `capability` grant bound to `op`.
    /// Returns `None` when no valid grant exists or the use is refused.
    pub fn use_capability_for_op_if_available<O: MutationOp>(
        &mut self,
        user: &Identity,
        capability: &str,
        op: &O,
    ) -> Option<CapabilityOp> {
        let grant = self.find_valid_grant(user, capability)?.to_reference();
        let usage = usage_key(op).ok()?;
        let mut use_op = CapabilityOp::use_grant(self.new_op_meta(), grant, usage);
        use_op.set_author(user.clone());
        match self.apply_new_op(use_op.clone()) {
            Ok(_) => Some(use_op),
            Err(e) => {
                debug!(error = %e, capability, "capability use refused");
                None
            }
        }
    }

    /// Drops a use applied for an op that was then refused.
    pub(crate) fn retract_use(&mut self, use_hash: &Hash) {
        if self.log.retract(use_hash).is_none() {
            warn!(op = %use_hash.short(), "use is built upon, keeping it");
        }
    }

    /// Applies `op` on the strength of `issuer`'s admin grant. The use is
    /// retracted again when `op` is refused.
    fn apply_as_admin(&mut self, issuer: &Identity, mut op: CapabilityOp) -> Result<Hash> {
        let use_op = self
            .use_capability_for_op_if_available(issuer, ADMIN, &op)
            .ok_or_else(|| {
                HashspaceError::UnauthorizedMutation(format!(
                    "{} holds no valid admin grant",
                    issuer.hash().short()
                ))
            })?;
        let use_hash = use_op.try_hash()?;
        op.add_causal_op(HashReference::new(use_hash.clone(), USE_OP_CLASS));
        match self.apply_new_op(op) {
            Ok(hash) => Ok(hash),
            Err(e) => {
                self.retract_use(&use_hash);
                Err(e)
            }
        }
    }

    /// Whether `op` carries a use, by its own author, of a grant of
    /// `capability` bound to `op`.
    pub fn carries_use_of<O: MutationOp>(&self, op: &O, capability: &str) -> bool {
        let Some(author) = op.author() else {
            return false;
        };
        let Ok(key) = usage_key(op) else {
            return false;
        };
        op.meta().causal_hashes().any(|causal| {
            let Some(use_op) = self.log.get(causal) else {
                return false;
            };
            let CapabilityOpKind::Use { grant, usage } = use_op.kind() else {
                return false;
            };
            *usage == key
                && use_op.author() == Some(author)
                && self
                    .log
                    .get(&grant.hash)
                    .and_then(CapabilityOp::granted)
                    .is_some_and(|(grantee, cap)| cap == capability && grantee == author)
        })
    }

    fn authorized(&self, op: &CapabilityOp, author: &Identity) -> bool {
        let owner = self.is_owner(author);
        match op.kind() {
            CapabilityOpKind::Grant { capability, .. } if capability == ADMIN => owner,
            CapabilityOpKind::Grant { .. } => owner || self.carries_use_of(op, ADMIN),
            CapabilityOpKind::RevokeAfter { revoked } => match self.log.get(&revoked.hash).map(|r| r.kind()) {
                Some(CapabilityOpKind::Grant { capability, .. }) if capability != ADMIN => {
                    owner || self.carries_use_of(op, ADMIN)
                }
                Some(CapabilityOpKind::Grant { .. }) | Some(CapabilityOpKind::RevokeAfter { .. }) => owner,
                _ => false,
            },
            CapabilityOpKind::Use { grant, .. } => {
                op.meta().causal_ops.has(grant)
                    && self
                        .log
                        .get(&grant.hash)
                        .and_then(CapabilityOp::granted)
                        .is_some_and(|(grantee, _)| grantee == author)
            }
        }
    }
}

impl HashedObject for CapabilitySet {
    fn class_name(&self) -> &'static str {
        CAPABILITY_SET_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("owners", &self.owners)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, CAPABILITY_SET_CLASS)?;
        let mut set = Self::default();
        set.owners = fields.get("owners")?;
        Ok(set)
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        !self.owners.is_empty()
    }
}

impl MutableObject for CapabilitySet {
    type Op = CapabilityOp;

    fn op_log(&self) -> &OpLog<CapabilityOp> {
        &self.log
    }

    fn op_log_mut(&mut self) -> &mut OpLog<CapabilityOp> {
        &mut self.log
    }

    fn mutate(&mut self, op: &CapabilityOp, active: bool, _is_new: bool) -> bool {
        let Some((grantee, capability)) = op.granted() else {
            return false;
        };
        let Ok(hash) = op.try_hash() else {
            return false;
        };
        let key = (grantee.hash(), capability.to_string());
        if active {
            self.valid_grants.entry(key).or_default().insert(hash)
        } else {
            let Some(grants) = self.valid_grants.get_mut(&key) else {
                return false;
            };
            let removed = grants.remove(&hash);
            if grants.is_empty() {
                self.valid_grants.remove(&key);
            }
            removed
        }
    }

    fn should_accept_mutation_op(&self, op: &CapabilityOp) -> bool {
        match op.author() {
            Some(author) => self.authorized(op, author),
            None => false,
        }
    }
}

crate::embeddable!(CapabilitySet);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyPair;

    fn identity(seed: u8, name: &str) -> Identity {
        Identity::from_key_pair(&KeyPair::from_seed([seed; 32]), Some(name))
    }

    fn capability_set(root: &Identity) -> CapabilitySet {
        let mut set = CapabilitySet::new([root.clone()]);
        set.set_id("caps");
        set
    }

    #[test]
    fn test_owner_grants_directly() {
        let root = identity(1, "root");
        let alice = identity(2, "alice");
        let mut caps = capability_set(&root);

        let grant = caps.grant(&root, &alice, "user").unwrap();
        assert!(caps.has_capability(&alice, "user"));
        assert_eq!(caps.find_valid_grant(&alice, "user").unwrap().hash(), grant);
        assert!(!caps.has_capability(&alice, ADMIN));
        assert!(caps.has_capability(&root, "anything"));
    }

    #[test]
    fn test_admin_grant_goes_through_use() {
        let root = identity(1, "root");
        let admin = identity(2, "admin");
        let user = identity(3, "user");
        let mut caps = capability_set(&root);

        caps.grant(&root, &admin, ADMIN).unwrap();
        let grant = caps.grant(&admin, &user, "user").unwrap();
        let op = caps.op_log().get(&grant).unwrap().clone();
        assert_eq!(op.meta().causal_ops.len(), 1);
        assert!(caps.carries_use_of(&op, ADMIN));
        assert!(caps.has_capability(&user, "user"));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let root = identity(1, "root");
        let user = identity(3, "user");
        let other = identity(4, "other");
        let mut caps = capability_set(&root);

        let err = caps.grant(&user, &other, "user").unwrap_err();
        assert!(matches!(err, HashspaceError::UnauthorizedMutation(_)));
        caps.grant(&root, &user, ADMIN).unwrap();
        assert!(caps.grant(&user, &other, ADMIN).is_err());
    }

    #[test]
    fn test_use_without_grant_fails_closed() {
        let root = identity(1, "root");
        let user = identity(3, "user");
        let mut caps = capability_set(&root);
        let probe = CapabilityOp::grant(caps.new_op_meta(), root.clone(), "x");
        assert!(caps
            .use_capability_for_op_if_available(&user, "write", &probe)
            .is_none());
        assert!(caps.op_log().is_empty());
    }

    #[test]
    fn test_refused_admin_op_leaves_no_use_behind() {
        let root = identity(1, "root");
        let admin = identity(2, "admin");
        let user = identity(3, "user");
        let mut caps = capability_set(&root);
        caps.grant(&root, &admin, ADMIN).unwrap();
        let mut other = CapabilitySet::new([root.clone()]);
        other.set_id("elsewhere");

        let len = caps.op_log().len();
        let terminal = caps.terminal_ops();
        let mut stray = CapabilityOp::grant(other.new_op_meta(), user.clone(), "user");
        stray.set_author(admin.clone());
        let err = caps.apply_as_admin(&admin, stray).unwrap_err();
        assert!(matches!(err, HashspaceError::ValidationFailed(_)));
        assert_eq!(caps.op_log().len(), len);
        assert_eq!(caps.terminal_ops(), terminal);
        assert!(caps
            .take_unsaved_ops()
            .iter()
            .all(|op| !matches!(op.kind(), CapabilityOpKind::Use { .. })));

        let grant = caps.grant(&admin, &user, "user").unwrap();
        assert!(caps.is_op_active(&grant));
        assert_eq!(caps.op_log().len(), len + 2);
    }

    #[test]
    fn test_admin_cannot_revoke_admin_grant() {
        let root = identity(1, "root");
        let admin = identity(2, "admin");
        let mut caps = capability_set(&root);

        let admin_grant = caps.grant(&root, &admin, ADMIN).unwrap();
        assert!(caps.revoke_after(&admin, &admin_grant).is_err());
        caps.revoke_after(&root, &admin_grant).unwrap();
        assert!(!caps.has_capability(&admin, ADMIN));
    }
}
