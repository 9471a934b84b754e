//! Admitted ops of one mutable object and their validity.
//!
//! An admitted op `X` is *valid* when every causal op `c` of `X` is valid and
//! no active revocation of `c` exists whose causal past does not contain `X`
//! (revocations `X` itself performs are ignored). `X` is *active* when it is
//! valid and no active revocation of `X` exists.
//!
//! Status is kept incrementally: when an op flips, only the ops reachable
//! through the causal-dependents and revocation indexes are re-evaluated, and
//! the worklist runs until nothing changes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use super::op::MutationOp;
use super::pending::PendingOps;
use crate::core::{HashspaceError, Result};
use crate::literal::Hash;

/// Re-evaluations of one op allowed inside a single settle before it is
/// left as is.
const MAX_FLIPS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStatus {
    pub valid: bool,
    pub active: bool,
}

/// An op whose active status differs from before the last admit or
/// external update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub op: Hash,
    pub active: bool,
    /// The op was admitted by this call rather than flipped by a cascade.
    pub admitted: bool,
}

#[derive(Debug, Clone)]
pub struct OpLog<O> {
    ops: BTreeMap<Hash, O>,
    terminal: BTreeSet<Hash>,
    successors: HashMap<Hash, BTreeSet<Hash>>,
    status: HashMap<Hash, OpStatus>,
    causal_dependents: HashMap<Hash, BTreeSet<Hash>>,
    revokers: HashMap<Hash, BTreeSet<Hash>>,
    external: HashMap<Hash, bool>,
    pending: PendingOps<O>,
    pending_limit: usize,
    unsaved: Vec<O>,
}

impl<O> Default for OpLog<O> {
    fn default() -> Self {
        Self {
            ops: BTreeMap::new(),
            terminal: BTreeSet::new(),
            successors: HashMap::new(),
            status: HashMap::new(),
            causal_dependents: HashMap::new(),
            revokers: HashMap::new(),
            external: HashMap::new(),
            pending: PendingOps::new(),
            pending_limit: usize::MAX,
            unsaved: Vec::new(),
        }
    }
}

impl<O: MutationOp> OpLog<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.ops.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&O> {
        self.ops.get(hash)
    }

    pub fn ops(&self) -> impl Iterator<Item = (&Hash, &O)> {
        self.ops.iter()
    }

    /// Admitted ops no other admitted op names as a prev op.
    pub fn terminal_ops(&self) -> &BTreeSet<Hash> {
        &self.terminal
    }

    pub fn status(&self, hash: &Hash) -> Option<OpStatus> {
        self.status.get(hash).copied()
    }

    pub fn is_active(&self, hash: &Hash) -> bool {
        self.status.get(hash).is_some_and(|s| s.active)
    }

    /// Validity of an op of this log, or the last reported status of an op
    /// of another object.
    pub fn is_valid(&self, hash: &Hash) -> bool {
        match self.status.get(hash) {
            Some(status) => status.valid,
            None => self.external.get(hash).copied().unwrap_or(false),
        }
    }

    pub fn external_status(&self, hash: &Hash) -> Option<bool> {
        self.external.get(hash).copied()
    }

    /// Causal ops named by admitted or parked ops that live outside this log.
    pub fn foreign_causal_ops(&self) -> BTreeSet<Hash> {
        self.ops
            .values()
            .flat_map(|op| op.meta().causal_hashes())
            .filter(|hash| !self.ops.contains_key(*hash))
            .cloned()
            .chain(
                self.pending
                    .missing_dependencies()
                    .filter(|hash| !self.ops.contains_key(*hash))
                    .cloned(),
            )
            .collect()
    }

    /// First dependency of `op` not yet known here.
    pub fn first_missing(&self, op: &O) -> Option<Hash> {
        let meta = op.meta();
        let required = op.required_ops();
        let missing = meta
            .prev_hashes()
            .chain(required.iter())
            .find(|hash| !self.ops.contains_key(*hash))
            .or_else(|| {
                meta.causal_hashes().find(|hash| {
                    !self.ops.contains_key(*hash) && !self.external.contains_key(*hash)
                })
            })
            .cloned();
        missing
    }

    /// Adds an op whose dependencies are all known and settles statuses.
    pub fn admit(&mut self, op: O) -> Result<Vec<StatusChange>> {
        let hash = op.try_hash()?;
        if self.ops.contains_key(&hash) {
            return Ok(Vec::new());
        }
        if let Some(missing) = self.first_missing(&op) {
            return Err(HashspaceError::MissingDependency(missing));
        }

        for prev in op.meta().prev_hashes() {
            self.terminal.remove(prev);
            self.successors
                .entry(prev.clone())
                .or_default()
                .insert(hash.clone());
        }
        if !self.successors.contains_key(&hash) {
            self.terminal.insert(hash.clone());
        }
        for causal in op.meta().causal_hashes() {
            self.causal_dependents
                .entry(causal.clone())
                .or_default()
                .insert(hash.clone());
        }
        if let Some(revoked) = op.revoked_op() {
            self.revokers
                .entry(revoked.hash.clone())
                .or_default()
                .insert(hash.clone());
        }
        self.ops.insert(hash.clone(), op);
        self.status.insert(hash.clone(), OpStatus::default());

        let initial = self.settle([hash.clone()]);
        let mut changes = vec![StatusChange {
            op: hash.clone(),
            active: self.is_active(&hash),
            admitted: true,
        }];
        changes.extend(self.collect_changes(initial, Some(&hash)));
        Ok(changes)
    }

    /// Removes an op that nothing else builds on, as if it had never been
    /// admitted. Returns `None` and changes nothing when an admitted op
    /// follows it, depends on it or revokes it, or when it revokes
    /// something itself.
    pub fn retract(&mut self, hash: &Hash) -> Option<O> {
        let op = self.ops.get(hash)?;
        let in_use = |index: &HashMap<Hash, BTreeSet<Hash>>| {
            index.get(hash).is_some_and(|entries| !entries.is_empty())
        };
        if op.revoked_op().is_some()
            || in_use(&self.successors)
            || in_use(&self.causal_dependents)
            || in_use(&self.revokers)
        {
            return None;
        }
        let op = self.ops.remove(hash)?;
        self.status.remove(hash);
        self.terminal.remove(hash);
        for prev in op.meta().prev_hashes() {
            if unlink(&mut self.successors, prev, hash) && self.ops.contains_key(prev) {
                self.terminal.insert(prev.clone());
            }
        }
        for causal in op.meta().causal_hashes() {
            unlink(&mut self.causal_dependents, causal, hash);
        }
        self.unsaved
            .retain(|queued| queued.try_hash().map_or(true, |queued| &queued != hash));
        debug!(op = %hash.short(), "retracted op");
        Some(op)
    }

    /// Drops the recorded status of a foreign op no admitted op depends on.
    pub fn forget_external(&mut self, hash: &Hash) {
        if !self.causal_dependents.contains_key(hash) {
            self.external.remove(hash);
        }
    }

    /// Records the validity of ops of other objects and settles the ops
    /// that depend on them.
    pub fn set_external_statuses(
        &mut self,
        statuses: impl IntoIterator<Item = (Hash, bool)>,
    ) -> Vec<StatusChange> {
        let mut seeds = Vec::new();
        for (hash, valid) in statuses {
            if self.ops.contains_key(&hash) {
                continue;
            }
            if self.external.insert(hash.clone(), valid) != Some(valid) {
                if let Some(dependents) = self.causal_dependents.get(&hash) {
                    seeds.extend(dependents.iter().cloned());
                }
            }
        }
        let initial = self.settle(seeds);
        self.collect_changes(initial, None)
    }

    /// Caps how many ops may wait for dependencies at once.
    pub fn set_pending_limit(&mut self, limit: usize) {
        self.pending_limit = limit;
    }

    pub fn park(&mut self, missing: Hash, op: O) -> Result<bool> {
        let hash = op.try_hash()?;
        if self.pending.len() >= self.pending_limit && !self.pending.is_parked(&hash) {
            return Err(HashspaceError::Storage(format!(
                "pending buffer full ({} ops)",
                self.pending_limit
            )));
        }
        Ok(self.pending.park(missing, hash, op))
    }

    pub fn release(&mut self, hash: &Hash) -> Vec<O> {
        self.pending.release(hash)
    }

    pub fn pending(&self) -> &PendingOps<O> {
        &self.pending
    }

    pub fn push_unsaved(&mut self, op: O) {
        self.unsaved.push(op);
    }

    pub fn take_unsaved(&mut self) -> Vec<O> {
        std::mem::take(&mut self.unsaved)
    }

    pub fn unsaved_len(&self) -> usize {
        self.unsaved.len()
    }

    fn settle(&mut self, seeds: impl IntoIterator<Item = Hash>) -> BTreeMap<Hash, bool> {
        let mut initial = BTreeMap::new();
        let mut flips: HashMap<Hash, usize> = HashMap::new();
        let mut queue: VecDeque<Hash> = seeds.into_iter().collect();

        while let Some(hash) = queue.pop_front() {
            let Some(old) = self.status.get(&hash).copied() else {
                continue;
            };
            let new = self.evaluate(&hash);
            if new == old {
                continue;
            }
            let count = flips.entry(hash.clone()).or_insert(0);
            *count += 1;
            if *count > MAX_FLIPS {
                warn!(op = %hash.short(), "op status does not settle, keeping last value");
                continue;
            }
            initial.entry(hash.clone()).or_insert(old.active);
            self.status.insert(hash.clone(), new);
            debug!(op = %hash.short(), valid = new.valid, active = new.active, "op status changed");
            self.enqueue_affected(&hash, &mut queue);
        }
        initial
    }

    fn enqueue_affected(&self, hash: &Hash, queue: &mut VecDeque<Hash>) {
        if let Some(dependents) = self.causal_dependents.get(hash) {
            queue.extend(dependents.iter().cloned());
        }
        if let Some(revoked) = self.ops.get(hash).and_then(|op| op.revoked_op()) {
            queue.push_back(revoked.hash.clone());
            if let Some(dependents) = self.causal_dependents.get(&revoked.hash) {
                queue.extend(dependents.iter().cloned());
            }
        }
    }

    fn evaluate(&self, hash: &Hash) -> OpStatus {
        let Some(op) = self.ops.get(hash) else {
            return OpStatus::default();
        };
        let own_revocation = op.revoked_op().map(|r| &r.hash);
        let valid = op
            .meta()
            .causal_hashes()
            .all(|causal| self.causal_holds(hash, causal, own_revocation));
        let revoked = self
            .revokers
            .get(hash)
            .is_some_and(|revokers| revokers.iter().any(|r| self.is_active(r)));
        OpStatus {
            valid,
            active: valid && !revoked,
        }
    }

    fn causal_holds(&self, op: &Hash, causal: &Hash, own_revocation: Option<&Hash>) -> bool {
        if !self.is_valid(causal) {
            return false;
        }
        let Some(revokers) = self.revokers.get(causal) else {
            return true;
        };
        !revokers.iter().any(|revoker| {
            Some(revoker) != own_revocation && self.is_active(revoker) && !self.in_past(op, revoker)
        })
    }

    /// Whether `ancestor` is reachable from `of` through prev, causal or
    /// required ops.
    fn in_past(&self, ancestor: &Hash, of: &Hash) -> bool {
        let mut stack = vec![of.clone()];
        let mut seen = HashSet::new();
        while let Some(hash) = stack.pop() {
            let Some(op) = self.ops.get(&hash) else {
                continue;
            };
            let required = op.required_ops();
            for parent in op
                .meta()
                .prev_hashes()
                .chain(op.meta().causal_hashes())
                .chain(required.iter())
            {
                if parent == ancestor {
                    return true;
                }
                if seen.insert(parent.clone()) {
                    stack.push(parent.clone());
                }
            }
        }
        false
    }

    fn collect_changes(
        &self,
        initial: BTreeMap<Hash, bool>,
        skip: Option<&Hash>,
    ) -> Vec<StatusChange> {
        initial
            .into_iter()
            .filter(|(hash, _)| Some(hash) != skip)
            .filter_map(|(hash, was_active)| {
                let active = self.is_active(&hash);
                (active != was_active).then_some(StatusChange {
                    op: hash,
                    active,
                    admitted: false,
                })
            })
            .collect()
    }
}

/// Removes `entry` from the set under `key`. Returns whether the set
/// became empty and was dropped.
fn unlink(index: &mut HashMap<Hash, BTreeSet<Hash>>, key: &Hash, entry: &Hash) -> bool {
    let Some(entries) = index.get_mut(key) else {
        return false;
    };
    entries.remove(entry);
    if !entries.is_empty() {
        return false;
    }
    index.remove(key);
    true
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::literal::{FieldReader, FieldWriter, Hashing};
    use crate::model::{expect_class, HashReference, HashedObject, ObjectHeader};
    use crate::mutable::OpMeta;

    const TEST_OP: &str = "test/Op";

    /// Minimal op: a label, optionally revoking another op.
    #[derive(Debug, Clone)]
    pub(crate) struct TestOp {
        header: ObjectHeader,
        meta: OpMeta,
        label: String,
        revokes: Option<HashReference>,
    }

    impl TestOp {
        pub(crate) fn new(label: &str) -> Self {
            let target = HashReference::new(Hashing::for_str("target"), "test/Object");
            Self {
                header: ObjectHeader::new(),
                meta: OpMeta::new(target),
                label: label.to_string(),
                revokes: None,
            }
        }

        pub(crate) fn after(mut self, prev: &[&TestOp]) -> Self {
            for op in prev {
                self.meta.prev_ops.add(op.to_reference());
            }
            self
        }

        pub(crate) fn caused_by(mut self, causal: &[&TestOp]) -> Self {
            for op in causal {
                self.meta.causal_ops.add(op.to_reference());
            }
            self
        }

        pub(crate) fn revoking(mut self, op: &TestOp) -> Self {
            self.revokes = Some(op.to_reference());
            self
        }
    }

    impl HashedObject for TestOp {
        fn class_name(&self) -> &'static str {
            TEST_OP
        }

        fn header(&self) -> &ObjectHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut ObjectHeader {
            &mut self.header
        }

        fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
            self.meta.write(fields)?;
            fields.put("label", &self.label)?;
            fields.put_opt("revokes", self.revokes.as_ref())
        }

        fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
            expect_class(class_name, TEST_OP)?;
            Ok(Self {
                header: ObjectHeader::new(),
                meta: OpMeta::read(fields)?,
                label: fields.get("label")?,
                revokes: fields.get_opt("revokes")?,
            })
        }
    }

    impl MutationOp for TestOp {
        fn meta(&self) -> &OpMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut OpMeta {
            &mut self.meta
        }

        fn revoked_op(&self) -> Option<&HashReference> {
            self.revokes.as_ref()
        }
    }

    #[test]
    fn test_terminal_is_frontier() {
        let mut log = OpLog::new();
        let a = TestOp::new("a");
        let b = TestOp::new("b").after(&[&a]);
        let c = TestOp::new("c").after(&[&a]);
        let d = TestOp::new("d").after(&[&b, &c]);

        log.admit(a.clone()).unwrap();
        assert_eq!(log.terminal_ops().len(), 1);
        log.admit(b.clone()).unwrap();
        log.admit(c.clone()).unwrap();
        let heads: BTreeSet<_> = [b.hash(), c.hash()].into();
        assert_eq!(log.terminal_ops(), &heads);
        log.admit(d.clone()).unwrap();
        let heads: BTreeSet<Hash> = [d.hash()].into();
        assert_eq!(log.terminal_ops(), &heads);
    }

    #[test]
    fn test_admit_requires_known_prev() {
        let mut log = OpLog::new();
        let a = TestOp::new("a");
        let b = TestOp::new("b").after(&[&a]);
        let err = log.admit(b).unwrap_err();
        assert!(matches!(err, HashspaceError::MissingDependency(h) if h == a.hash()));
    }

    #[test]
    fn test_revoke_after_cascades_and_undoes() {
        let mut log = OpLog::new();
        let grant = TestOp::new("grant");
        let using = TestOp::new("use").after(&[&grant]).caused_by(&[&grant]);
        let built = TestOp::new("built").after(&[&using]).caused_by(&[&using]);
        // concurrent with `using`: does not see it
        let revoke = TestOp::new("revoke").after(&[&grant]).revoking(&grant);
        let undo = TestOp::new("undo").after(&[&revoke]).revoking(&revoke);

        for op in [&grant, &using, &built] {
            log.admit((*op).clone()).unwrap();
        }
        assert!(log.is_active(&built.hash()));

        let changes = log.admit(revoke.clone()).unwrap();
        assert!(!log.is_active(&grant.hash()));
        assert!(!log.is_active(&using.hash()));
        assert!(!log.is_active(&built.hash()));
        assert!(changes.iter().any(|c| c.op == built.hash() && !c.active));

        log.admit(undo.clone()).unwrap();
        assert!(!log.is_active(&revoke.hash()));
        assert!(log.is_active(&grant.hash()));
        assert!(log.is_active(&using.hash()));
        assert!(log.is_active(&built.hash()));
    }

    #[test]
    fn test_revoke_after_keeps_earlier_uses() {
        let mut log = OpLog::new();
        let grant = TestOp::new("grant");
        let using = TestOp::new("use").after(&[&grant]).caused_by(&[&grant]);
        let revoke = TestOp::new("revoke").after(&[&using]).revoking(&grant);

        for op in [&grant, &using, &revoke] {
            log.admit((*op).clone()).unwrap();
        }
        assert!(!log.is_active(&grant.hash()));
        assert!(log.is_valid(&using.hash()));
    }

    #[test]
    fn test_external_status_drives_validity() {
        let mut log = OpLog::new();
        let foreign = TestOp::new("foreign");
        let local = TestOp::new("local").caused_by(&[&foreign]);

        assert_eq!(log.first_missing(&local), Some(foreign.hash()));
        log.set_external_statuses([(foreign.hash(), true)]);
        log.admit(local.clone()).unwrap();
        assert!(log.is_active(&local.hash()));

        let changes = log.set_external_statuses([(foreign.hash(), false)]);
        assert_eq!(
            changes,
            vec![StatusChange {
                op: local.hash(),
                active: false,
                admitted: false
            }]
        );
        assert!(log.foreign_causal_ops().contains(&foreign.hash()));
    }

    #[test]
    fn test_admission_order_does_not_matter() {
        let grant = TestOp::new("grant");
        let using = TestOp::new("use").after(&[&grant]).caused_by(&[&grant]);
        let revoke = TestOp::new("revoke").after(&[&grant]).revoking(&grant);
        let undo = TestOp::new("undo").after(&[&revoke]).revoking(&revoke);

        let mut forward = OpLog::new();
        for op in [&grant, &using, &revoke, &undo] {
            forward.admit((*op).clone()).unwrap();
        }
        let mut other = OpLog::new();
        for op in [&grant, &revoke, &undo, &using] {
            other.admit((*op).clone()).unwrap();
        }
        for op in [&grant, &using, &revoke, &undo] {
            assert_eq!(forward.status(&op.hash()), other.status(&op.hash()));
        }
    }

    #[test]
    fn test_pending_buffer_is_bounded() {
        let mut log = OpLog::new();
        log.set_pending_limit(1);
        let a = TestOp::new("a");
        let b = TestOp::new("b").after(&[&a]);
        let c = TestOp::new("c").after(&[&a]);

        assert!(log.park(a.hash(), b.clone()).unwrap());
        assert!(log.park(a.hash(), b.clone()).is_ok());
        let err = log.park(a.hash(), c).unwrap_err();
        assert!(matches!(err, HashspaceError::Storage(_)));
        assert_eq!(log.release(&a.hash()).len(), 1);
    }

    #[test]
    fn test_first_missing_checks_prev_before_causal() {
        let mut log = OpLog::new();
        let a = TestOp::new("a");
        let foreign = TestOp::new("foreign");
        let b = TestOp::new("b").after(&[&a]).caused_by(&[&foreign]);

        assert_eq!(log.first_missing(&b), Some(a.hash()));
        log.admit(a.clone()).unwrap();
        assert_eq!(log.first_missing(&b), Some(foreign.hash()));
        log.set_external_statuses([(foreign.hash(), true)]);
        assert_eq!(log.first_missing(&b), None);
    }

    #[test]
    fn test_retract_restores_previous_frontier() {
        let mut log = OpLog::new();
        let a = TestOp::new("a");
        let b = TestOp::new("b").after(&[&a]).caused_by(&[&a]);
        log.admit(a.clone()).unwrap();
        log.push_unsaved(a.clone());
        log.admit(b.clone()).unwrap();
        log.push_unsaved(b.clone());

        // `a` has a successor, so it stays
        assert!(log.retract(&a.hash()).is_none());
        let retracted = log.retract(&b.hash()).unwrap();
        assert_eq!(retracted.hash(), b.hash());
        assert!(!log.contains(&b.hash()));
        assert_eq!(log.status(&b.hash()), None);
        let heads: BTreeSet<Hash> = [a.hash()].into();
        assert_eq!(log.terminal_ops(), &heads);
        let unsaved: Vec<Hash> = log.take_unsaved().iter().map(|op| op.hash()).collect();
        assert_eq!(unsaved, vec![a.hash()]);

        log.admit(b.clone()).unwrap();
        assert!(log.is_active(&b.hash()));
    }

    #[test]
    fn test_retract_refuses_revocations() {
        let mut log = OpLog::new();
        let grant = TestOp::new("grant");
        let revoke = TestOp::new("revoke").after(&[&grant]).revoking(&grant);
        log.admit(grant.clone()).unwrap();
        log.admit(revoke.clone()).unwrap();
        assert!(log.retract(&revoke.hash()).is_none());
        assert!(log.retract(&grant.hash()).is_none());
        assert_eq!(log.len(), 2);
    }
}
