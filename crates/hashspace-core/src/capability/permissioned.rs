use tracing::info;

use super::op::{CapabilityOp, USE_OP_CLASS};
use super::set::CapabilitySet;
use crate::core::{HashspaceError, Result};
use crate::literal::{hash_of, FieldReader, FieldWriter, Hash, References};
use crate::model::{expect_class, HashReference, HashedObject, Identity, ObjectHeader};
use crate::mutable::set::{deletes_match, ADD_OP_CLASS};
use crate::mutable::{
    Ingested, MutableObject, MutationOp, OpLog, SetElement, SetOp, SetState, StatusChange,
};
use crate::store::Store;

pub const PERMISSIONED_SET_CLASS: &str = "hhs/v0/PermissionedSet";

/// Capability a non-owner needs to add or delete elements.
pub const WRITE: &str = "write";

/// A set whose writers are decided by an embedded [`CapabilitySet`].
///
/// Every add or delete by a non-owner carries a use of a `write` grant.
/// Revoking a writer concurrently undoes that writer's additions, undoing
/// the revocation redoes them.
#[derive(Debug, Clone)]
pub struct PermissionedSet<T> {
    header: ObjectHeader,
    capabilities: CapabilitySet,
    log: OpLog<SetOp<T>>,
    state: SetState<T>,
}

impl<T: SetElement> PermissionedSet<T> {
    pub fn new(id: &str, owners: impl IntoIterator<Item = Identity>) -> Result<Self> {
        let mut set = Self {
            header: ObjectHeader::new(),
            capabilities: CapabilitySet::default(),
            log: OpLog::new(),
            state: SetState::default(),
        };
        set.set_id(id);
        set.capabilities = set.add_derived_field("capabilities", CapabilitySet::new(owners))?;
        Ok(set)
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn can_write(&self, identity: &Identity) -> bool {
        self.capabilities.has_capability(identity, WRITE)
    }

    pub fn grant_write(&mut self, issuer: &Identity, grantee: &Identity) -> Result<Hash> {
        let hash = self.capabilities.grant(issuer, grantee, WRITE)?;
        self.refresh_external();
        Ok(hash)
    }

    pub fn grant(&mut self, issuer: &Identity, grantee: &Identity, capability: &str) -> Result<Hash> {
        let hash = self.capabilities.grant(issuer, grantee, capability)?;
        self.refresh_external();
        Ok(hash)
    }

    pub fn revoke_after(&mut self, issuer: &Identity, revoked: &Hash) -> Result<Hash> {
        let hash = self.capabilities.revoke_after(issuer, revoked)?;
        self.refresh_external();
        Ok(hash)
    }

    /// Ingests a capability op learned from elsewhere and cascades the
    /// result into the set.
    pub fn ingest_capability_op(&mut self, op: CapabilityOp) -> Ingested {
        let mut ingested = self.capabilities.ingest_op(op);
        ingested.changes.extend(self.refresh_external());
        ingested
    }

    pub fn add(&mut self, element: T, author: &Identity) -> Result<Hash> {
        let mut op = SetOp::add(self.new_op_meta(), element);
        op.set_author(author.clone());
        self.apply_authorized(author, op)
    }

    pub fn delete(&mut self, element: &T, author: &Identity) -> Result<Option<Hash>> {
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
        op.set_author(author.clone());
        self.apply_authorized(author, op).map(Some)
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

    /// Pushes the current validity of every capability op the set's ops
    /// depend on into the set's log.
    pub fn refresh_external(&mut self) -> Vec<StatusChange> {
        let capability_log = self.capabilities.op_log();
        let statuses: Vec<(Hash, bool)> = self
            .log
            .foreign_causal_ops()
            .into_iter()
            .filter(|hash| capability_log.contains(hash))
            .map(|hash| {
                let valid = capability_log.is_valid(&hash);
                (hash, valid)
            })
            .collect();
        if statuses.is_empty() {
            return Vec::new();
        }
        self.update_external(statuses)
    }

    /// Saves the set, its capability set and every unsaved op of both.
    pub async fn save(&mut self, store: &Store) -> Result<Hash> {
        store.save_mutable(&mut self.capabilities).await?;
        let hash = store.save_mutable(self).await?;
        info!(set = %hash.short(), "permissioned set saved");
        Ok(hash)
    }

    /// Loads every stored op of the capability set and then of the set.
    pub async fn load_all_changes(&mut self, store: &Store) -> Result<usize> {
        let mut admitted = store.load_all_changes(&mut self.capabilities).await?;
        self.refresh_external();
        admitted += store.load_all_changes(self).await?;
        self.refresh_external();
        Ok(admitted)
    }

    /// Applies `op` by `author`. A use taken for it is retracted again when
    /// the op is refused.
    fn apply_authorized(&mut self, author: &Identity, mut op: SetOp<T>) -> Result<Hash> {
        let use_hash = self.authorize(author, &mut op)?;
        match self.apply_new_op(op) {
            Ok(hash) => Ok(hash),
            Err(e) => {
                if let Some(use_hash) = use_hash {
                    self.capabilities.retract_use(&use_hash);
                    self.log.forget_external(&use_hash);
                }
                Err(e)
            }
        }
    }

    /// Binds a use of `author`'s write grant to `op`. Owners need none.
    fn authorize(&mut self, author: &Identity, op: &mut SetOp<T>) -> Result<Option<Hash>> {
        if self.capabilities.is_owner(author) {
            return Ok(None);
        }
        let use_op = self
            .capabilities
            .use_capability_for_op_if_available(author, WRITE, &*op)
            .ok_or_else(|| {
                HashspaceError::UnauthorizedMutation(format!(
                    "{} holds no valid write grant",
                    author.hash().short()
                ))
            })?;
        let use_hash = use_op.try_hash()?;
        op.add_causal_op(HashReference::new(use_hash.clone(), USE_OP_CLASS));
        let valid = self.capabilities.op_log().is_valid(&use_hash);
        self.update_external(vec![(use_hash.clone(), valid)]);
        Ok(Some(use_hash))
    }
}

impl<T: SetElement> HashedObject for PermissionedSet<T> {
    fn class_name(&self) -> &'static str {
        PERMISSIONED_SET_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("capabilities", &self.capabilities)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, PERMISSIONED_SET_CLASS)?;
        Ok(Self {
            header: ObjectHeader::new(),
            capabilities: fields.get("capabilities")?,
            log: OpLog::new(),
            state: SetState::default(),
        })
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        self.check_derived_field("capabilities", &self.capabilities)
    }
}

impl<T: SetElement> MutableObject for PermissionedSet<T> {
    type Op = SetOp<T>;

    fn op_log(&self) -> &OpLog<SetOp<T>> {
        &self.log
    }

    fn op_log_mut(&mut self) -> &mut OpLog<SetOp<T>> {
        &mut self.log
    }

    fn mutate(&mut self, op: &SetOp<T>, active: bool, _is_new: bool) -> bool {
        let Ok(hash) = op.try_hash() else {
            return false;
        };
        self.state.apply(&hash, op, active)
    }

    fn should_accept_mutation_op(&self, op: &SetOp<T>) -> bool {
        let Some(author) = op.author() else {
            return false;
        };
        (self.capabilities.is_owner(author) || self.capabilities.carries_use_of(op, WRITE))
            && deletes_match(&self.log, op)
    }
}

crate::embeddable!(generic T: SetElement => PermissionedSet<T>);
