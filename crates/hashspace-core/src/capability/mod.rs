//! Causal capabilities: grants, revocations and uses with cascading undo.

pub mod op;
pub mod permissioned;
pub mod set;

pub use op::{CapabilityOp, CapabilityOpKind, GRANT_OP_CLASS, REVOKE_AFTER_OP_CLASS, USE_OP_CLASS};
pub use permissioned::{PermissionedSet, PERMISSIONED_SET_CLASS, WRITE};
pub use set::{CapabilitySet, ADMIN, CAPABILITY_SET_CLASS};
