//! Hashed objects: the object trait, headers, identities and keys, and the
//! hashed collections.

pub mod header;
pub mod identity;
pub mod keys;
pub mod map;
pub mod object;
pub mod reference;
pub mod registry;
pub mod set;

pub use header::ObjectHeader;
pub use identity::Identity;
pub use keys::{KeyPair, Keyring, Signer};
pub use map::HashedMap;
pub use object::{expect_class, HashedObject};
pub use reference::HashReference;
pub use registry::KnownObject;
pub use set::HashedSet;
