use tracing::{debug, warn};

use super::log::{OpLog, StatusChange};
use super::op::{MutationOp, OpMeta};
use crate::core::{HashspaceError, Result};
use crate::literal::Hash;
use crate::model::{HashReference, HashedObject};

/// What happened to an op handed to [`MutableObject::ingest_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Admitted,
    /// Parked until a missing dependency arrives.
    Pending,
    AlreadyKnown,
    /// Dropped: wrong target, unauthorized, or otherwise invalid.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub outcome: IngestOutcome,
    pub changes: Vec<StatusChange>,
}

/// An object whose value is the fold of its active ops.
///
/// The object's own literal (and so its hash) covers only its constant
/// fields; ops live in the [`OpLog`] and are stored separately.
pub trait MutableObject: HashedObject {
    type Op: MutationOp;

    fn op_log(&self) -> &OpLog<Self::Op>;

    fn op_log_mut(&mut self) -> &mut OpLog<Self::Op>;

    /// Folds a status change of `op` into the value. Called on admission and
    /// once per later flip. Returns whether the value changed.
    fn mutate(&mut self, op: &Self::Op, active: bool, is_new: bool) -> bool;

    fn should_accept_mutation_op(&self, _op: &Self::Op) -> bool {
        true
    }

    fn accepts_anonymous_ops(&self) -> bool {
        false
    }

    /// Meta for a new op: targets this object, follows the current terminal ops.
    fn new_op_meta(&self) -> OpMeta {
        let log = self.op_log();
        let prev = log.terminal_ops().iter().filter_map(|hash| {
            log.get(hash)
                .map(|op| HashReference::new(hash.clone(), op.class_name()))
        });
        OpMeta::new(self.to_reference()).with_prev_ops(prev)
    }

    /// Checks an op against this object without admitting it.
    fn check_op(&self, op: &Self::Op) -> Result<Hash> {
        let hash = op.try_hash()?;
        let own = self.try_hash()?;
        if op.target() != &own {
            return Err(HashspaceError::ValidationFailed(format!(
                "op {} targets {}, not {}",
                hash.short(),
                op.target().short(),
                own.short()
            )));
        }
        if op.author().is_none() && !self.accepts_anonymous_ops() {
            return Err(HashspaceError::ValidationFailed(format!(
                "op {} has no author",
                hash.short()
            )));
        }
        if let Some(missing) = self.op_log().first_missing(op) {
            return Err(HashspaceError::MissingDependency(missing));
        }
        if !self.should_accept_mutation_op(op) {
            return Err(HashspaceError::UnauthorizedMutation(format!(
                "{} {}",
                op.class_name(),
                hash
            )));
        }
        Ok(hash)
    }

    /// Applies a locally created op and queues it for saving.
    fn apply_new_op(&mut self, op: Self::Op) -> Result<Hash> {
        let hash = self.check_op(&op)?;
        if self.op_log().contains(&hash) {
            return Ok(hash);
        }
        let changes = self.op_log_mut().admit(op.clone())?;
        apply_changes(self, &changes, true);
        self.op_log_mut().push_unsaved(op);

        let mut replayed = Vec::new();
        replay_pending(self, hash.clone(), &mut replayed);
        Ok(hash)
    }

    /// Takes an op learned from the store or a peer. Never fails: problems
    /// park or drop the op.
    fn ingest_op(&mut self, op: Self::Op) -> Ingested {
        let mut changes = Vec::new();
        let hash = match op.try_hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(class = op.class_name(), error = %e, "dropping op without a literal form");
                return Ingested {
                    outcome: IngestOutcome::Rejected,
                    changes,
                };
            }
        };
        let outcome = try_ingest(self, hash.clone(), op, &mut changes);
        if outcome == IngestOutcome::Admitted {
            replay_pending(self, hash, &mut changes);
        }
        Ingested { outcome, changes }
    }

    /// Reports the validity of ops of other objects this object's ops
    /// depend on, replaying ops that were waiting for them.
    fn update_external(&mut self, statuses: Vec<(Hash, bool)>) -> Vec<StatusChange> {
        let known: Vec<Hash> = statuses.iter().map(|(hash, _)| hash.clone()).collect();
        let mut changes = self.op_log_mut().set_external_statuses(statuses);
        apply_changes(self, &changes, false);
        for hash in known {
            replay_pending(self, hash, &mut changes);
        }
        changes
    }

    fn terminal_ops(&self) -> Vec<Hash> {
        self.op_log().terminal_ops().iter().cloned().collect()
    }

    fn take_unsaved_ops(&mut self) -> Vec<Self::Op> {
        self.op_log_mut().take_unsaved()
    }

    fn is_op_active(&self, hash: &Hash) -> bool {
        self.op_log().is_active(hash)
    }

    fn pending_count(&self) -> usize {
        self.op_log().pending().len()
    }

    fn missing_dependencies(&self) -> Vec<Hash> {
        self.op_log().pending().missing_dependencies().cloned().collect()
    }
}

fn apply_changes<M: MutableObject>(object: &mut M, changes: &[StatusChange], is_new: bool) {
    for change in changes {
        let Some(op) = object.op_log().get(&change.op).cloned() else {
            continue;
        };
        object.mutate(&op, change.active, is_new && change.admitted);
    }
}

fn try_ingest<M: MutableObject>(
    object: &mut M,
    hash: Hash,
    op: M::Op,
    changes: &mut Vec<StatusChange>,
) -> IngestOutcome {
    if object.op_log().contains(&hash) {
        return IngestOutcome::AlreadyKnown;
    }
    if object.op_log().pending().is_parked(&hash) {
        return IngestOutcome::Pending;
    }
    match object.check_op(&op) {
        Ok(_) => {}
        Err(HashspaceError::MissingDependency(missing)) => {
            debug!(op = %hash.short(), missing = %missing.short(), "op waits for dependency");
            if let Err(e) = object.op_log_mut().park(missing, op) {
                warn!(op = %hash.short(), error = %e, "could not park op");
                return IngestOutcome::Rejected;
            }
            return IngestOutcome::Pending;
        }
        Err(e) => {
            warn!(op = %hash.short(), class = op.class_name(), error = %e, "dropping op");
            return IngestOutcome::Rejected;
        }
    }
    match object.op_log_mut().admit(op) {
        Ok(admitted) => {
            apply_changes(object, &admitted, false);
            changes.extend(admitted);
            IngestOutcome::Admitted
        }
        Err(e) => {
            warn!(op = %hash.short(), error = %e, "dropping op");
            IngestOutcome::Rejected
        }
    }
}

fn replay_pending<M: MutableObject>(object: &mut M, hash: Hash, changes: &mut Vec<StatusChange>) {
    let mut ready = vec![hash];
    while let Some(hash) = ready.pop() {
        for op in object.op_log_mut().release(&hash) {
            let Ok(op_hash) = op.try_hash() else {
                continue;
            };
            if try_ingest(object, op_hash.clone(), op, changes) == IngestOutcome::Admitted {
                ready.push(op_hash);
            }
        }
    }
}
