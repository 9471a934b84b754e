//! Errors and configuration shared by every hashspace module.

#[cfg(feature = "native")]
pub mod config;
pub mod error;

pub use error::{HashspaceError, Result};
