use std::collections::BTreeSet;

use tracing::debug;

use super::header::OpHeader;
use crate::core::{HashspaceError, Result};
use crate::literal::{FieldReader, FieldWriter, Hash, References};
use crate::model::{expect_class, HashedObject, HashedSet, ObjectHeader};
use crate::store::Store;

pub const CAUSAL_HISTORY_STATE_CLASS: &str = "hhs/v0/CausalHistoryState";

/// Exportable summary of one object's terminal frontier: the terminal op
/// hashes plus their headers. Two replicas compare states instead of logs.
#[derive(Debug, Clone)]
pub struct CausalHistoryState {
    header: ObjectHeader,
    mutable_obj: Hash,
    terminal_ops: HashedSet<Hash>,
    terminal_op_header_hashes: HashedSet<Hash>,
    terminal_op_headers: HashedSet<OpHeader>,
}

impl CausalHistoryState {
    /// State of an object with no ops yet.
    pub fn empty(mutable_obj: Hash) -> Self {
        Self {
            header: ObjectHeader::new(),
            mutable_obj,
            terminal_ops: HashedSet::new(),
            terminal_op_header_hashes: HashedSet::new(),
            terminal_op_headers: HashedSet::new(),
        }
    }

    /// Builds the state from headers the caller already holds.
    pub fn from_headers(mutable_obj: Hash, headers: impl IntoIterator<Item = OpHeader>) -> Result<Self> {
        let mut state = Self::empty(mutable_obj);
        for header in headers {
            if header.mutable_obj() != &state.mutable_obj {
                return Err(HashspaceError::ValidationFailed(format!(
                    "op {} belongs to {}, not {}",
                    header.op_hash().short(),
                    header.mutable_obj().short(),
                    state.mutable_obj.short()
                )));
            }
            state.terminal_ops.try_add(header.op_hash().clone())?;
            state.terminal_op_header_hashes.try_add(header.try_hash()?)?;
            state.terminal_op_headers.try_add(header)?;
        }
        Ok(state)
    }

    /// Loads (building lazily where needed) the header of every terminal op.
    pub async fn create_from_terminal_ops(
        mutable_obj: &Hash,
        terminal_ops: &BTreeSet<Hash>,
        store: &Store,
    ) -> Result<Self> {
        let mut headers = Vec::with_capacity(terminal_ops.len());
        for op in terminal_ops {
            let header = store
                .op_header(op)
                .await?
                .ok_or_else(|| HashspaceError::MissingDependency(op.clone()))?;
            headers.push(header);
        }
        let state = Self::from_headers(mutable_obj.clone(), headers)?;
        debug!(
            object = %mutable_obj.short(),
            terminal = state.terminal_ops.len(),
            "built causal history state"
        );
        Ok(state)
    }

    pub fn mutable_obj(&self) -> &Hash {
        &self.mutable_obj
    }

    pub fn terminal_ops(&self) -> impl Iterator<Item = &Hash> {
        self.terminal_ops.values()
    }

    pub fn terminal_op_headers(&self) -> impl Iterator<Item = &OpHeader> {
        self.terminal_op_headers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.terminal_ops.is_empty()
    }

    /// Remote terminal ops this state does not list as terminal. Callers
    /// filter further by what their store already holds.
    pub fn terminal_ops_missing_from(&self, remote: &CausalHistoryState) -> Vec<Hash> {
        remote
            .terminal_ops()
            .filter(|hash| !self.terminal_ops.has(hash))
            .cloned()
            .collect()
    }

    /// Remote terminal ops for which `is_known` is false.
    pub fn evaluate_remote_state(
        &self,
        remote: &CausalHistoryState,
        is_known: impl Fn(&Hash) -> bool,
    ) -> Vec<Hash> {
        self.terminal_ops_missing_from(remote)
            .into_iter()
            .filter(|hash| !is_known(hash))
            .collect()
    }
}

impl HashedObject for CausalHistoryState {
    fn class_name(&self) -> &'static str {
        CAUSAL_HISTORY_STATE_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("mutableObj", &self.mutable_obj)?;
        fields.put("terminalOps", &self.terminal_ops)?;
        fields.put("terminalOpHeaderHashes", &self.terminal_op_header_hashes)?;
        fields.put("terminalOpHeaders", &self.terminal_op_headers)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, CAUSAL_HISTORY_STATE_CLASS)?;
        Ok(Self {
            header: ObjectHeader::new(),
            mutable_obj: fields.get("mutableObj")?,
            terminal_ops: fields.get("terminalOps")?,
            terminal_op_header_hashes: fields.get("terminalOpHeaderHashes")?,
            terminal_op_headers: fields.get("terminalOpHeaders")?,
        })
    }

    /// Every header hashes into the declared header set, covers a declared
    /// terminal op, and belongs to `mutable_obj`.
    fn validate(&self, _references: &References<'_>) -> bool {
        let counts_match = self.terminal_op_headers.len() == self.terminal_op_header_hashes.len()
            && self.terminal_op_headers.len() == self.terminal_ops.len();
        counts_match
            && self.terminal_op_headers.values().all(|header| {
                header
                    .try_hash()
                    .is_ok_and(|hash| self.terminal_op_header_hashes.has(&hash))
                    && self.terminal_ops.has(header.op_hash())
                    && header.mutable_obj() == &self.mutable_obj
            })
    }
}

crate::embeddable!(CausalHistoryState);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::header::OpLinks;
    use crate::literal::{deliteralize, literalize, Hashing};

    fn header(name: &str, target: &Hash) -> OpHeader {
        let links = OpLinks {
            op_hash: Hashing::for_str(name),
            target: target.clone(),
            prev_ops: BTreeSet::new(),
            causal_ops: BTreeSet::new(),
        };
        OpHeader::new(&links, &[]).unwrap()
    }

    #[test]
    fn test_state_round_trips_and_validates() {
        let target = Hashing::for_str("object");
        let state =
            CausalHistoryState::from_headers(target.clone(), [header("a", &target), header("b", &target)])
                .unwrap();
        let context = literalize(&state).unwrap();
        let back: CausalHistoryState = deliteralize(&state.hash(), &context).unwrap();
        assert_eq!(back.hash(), state.hash());
        assert_eq!(back.terminal_ops().count(), 2);
    }

    #[test]
    fn test_foreign_header_is_refused() {
        let target = Hashing::for_str("object");
        let other = Hashing::for_str("other");
        assert!(CausalHistoryState::from_headers(target, [header("a", &other)]).is_err());
    }

    #[test]
    fn test_forged_state_fails_validation() {
        let target = Hashing::for_str("object");
        let other = Hashing::for_str("other");
        let mut forged = CausalHistoryState::empty(target);
        let foreign = header("a", &other);
        forged.terminal_ops.add(foreign.op_hash().clone());
        forged.terminal_op_header_hashes.add(foreign.hash());
        forged.terminal_op_headers.add(foreign);
        let context = literalize(&forged).unwrap();
        let err = deliteralize::<CausalHistoryState>(&forged.hash(), &context).unwrap_err();
        assert!(matches!(err, HashspaceError::ValidationFailed(_)));
    }

    #[test]
    fn test_evaluate_remote_state() {
        let target = Hashing::for_str("object");
        let local = CausalHistoryState::from_headers(target.clone(), [header("a", &target)]).unwrap();
        let remote = CausalHistoryState::from_headers(
            target.clone(),
            [header("a", &target), header("b", &target), header("c", &target)],
        )
        .unwrap();
        let known_c = Hashing::for_str("c");
        let missing = local.evaluate_remote_state(&remote, |hash| hash == &known_c);
        assert_eq!(missing, vec![Hashing::for_str("b")]);
    }
}
