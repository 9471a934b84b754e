//! Persistence: the [`Backend`] trait, its memory and SQLite
//! implementations, and the object-level [`Store`].

pub mod backend;
pub mod memory;
mod object_store;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "native")]
use std::sync::Arc;

pub use backend::{Backend, SearchOrder, SearchParams, SearchResults};
pub use memory::MemoryBackend;
pub use object_store::{Store, StoreEvent};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

#[cfg(feature = "native")]
use crate::core::config::{BackendKind, Config};
#[cfg(feature = "native")]
use crate::core::Result;
#[cfg(feature = "native")]
use crate::model::Signer;

/// Opens the backend `config` names.
#[cfg(feature = "native")]
pub async fn open_backend(config: &Config) -> Result<Arc<dyn Backend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(config.database_path()).await?)),
        #[cfg(not(feature = "sqlite"))]
        BackendKind::Sqlite => Err(crate::core::HashspaceError::Config(
            "built without the sqlite feature".into(),
        )),
    }
}

#[cfg(feature = "native")]
impl Store {
    pub async fn open(config: &Config, signer: Arc<dyn Signer>) -> Result<Self> {
        let backend = open_backend(config).await?;
        tracing::info!(backend = backend.name(), "store opened");
        Ok(Self::new(backend, signer))
    }
}
