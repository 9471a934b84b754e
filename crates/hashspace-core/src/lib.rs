//! hashspace-core: content-addressed, signed, causally ordered objects.
//!
//! - **literal**: canonical literal codec and hashing.
//! - **model**: hashed objects, identities, hashed sets and maps.
//! - **mutable**: op logs with terminal-op tracking, pending ops and the
//!   validity cascade.
//! - **capability**: causal capability sets with cascading undo/redo.
//! - **history**: op headers, causal history states, packing and sync agents.
//! - **store**: storage backends and the object store.

pub mod capability;
pub mod core;
pub mod history;
pub mod literal;
pub mod model;
pub mod mutable;
pub mod store;

// Top-level re-exports for common usage
pub use crate::capability::{CapabilityOp, CapabilitySet, PermissionedSet};
pub use crate::core::{HashspaceError, Result};
pub use crate::history::{
    CausalHistoryAgent, CausalHistoryPacker, CausalHistoryState, ObjectPacker, OpHeader,
    StateSyncAgent,
};
pub use crate::literal::{deliteralize, literalize, Hash, Hashing, LiteralContext};
pub use crate::model::{
    HashReference, HashedMap, HashedObject, HashedSet, Identity, KeyPair, Keyring, KnownObject,
    Signer,
};
pub use crate::mutable::{MutableObject, MutableSet, MutationOp};
pub use crate::store::{Backend, MemoryBackend, Store, StoreEvent};

#[cfg(feature = "sqlite")]
pub use crate::store::SqliteBackend;

#[cfg(feature = "native")]
pub use crate::core::config::Config;
