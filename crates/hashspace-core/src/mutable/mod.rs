//! Mutable objects: op log, pending buffer and the fold interface.

pub mod log;
pub mod object;
pub mod op;
pub mod pending;
pub mod set;

use std::sync::Arc;

pub use log::{OpLog, OpStatus, StatusChange};
pub use object::{IngestOutcome, Ingested, MutableObject};
pub use op::{usage_key, MutationOp, OpMeta};
pub use pending::PendingOps;
pub use set::{MutableSet, SetElement, SetOp, SetOpKind, SetState};

/// A mutable object shared between tasks. The mutex serializes ingestion and
/// local writes so a cascade always runs to completion before anyone reads.
pub type SharedMutable<M> = Arc<tokio::sync::Mutex<M>>;

pub fn shared<M: MutableObject>(object: M) -> SharedMutable<M> {
    Arc::new(tokio::sync::Mutex::new(object))
}
