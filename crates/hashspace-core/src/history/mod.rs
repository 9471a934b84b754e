//! Causal history: op headers, terminal-op states, closure packing and the
//! sync agent built on them.

pub mod agent;
pub mod header;
pub mod packer;
pub mod state;

pub use agent::{CausalHistoryAgent, StateSyncAgent};
pub use header::{OpHeader, OpLinks, OP_HEADER_CLASS};
pub use packer::{CausalHistoryPacker, ObjectPacker};
pub use state::{CausalHistoryState, CAUSAL_HISTORY_STATE_CLASS};
