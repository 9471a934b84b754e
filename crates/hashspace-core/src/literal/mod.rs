//! Canonical literal codec.
//!
//! Turns object graphs into hash-addressed [`Literal`]s with dependency lists
//! and back. See [`codec`] for the object-level entry points.

pub mod bigint;
pub mod canonical;
pub mod codec;
pub mod context;
pub mod hash;
#[allow(clippy::module_inception)]
pub mod literal;
pub mod value;

pub use codec::{
    deliteralize, deliteralize_unchecked, hash_of, literalize, Decoder, Deliteralize, Encoder,
    FieldReader, FieldWriter, Literalize, References,
};
pub use context::LiteralContext;
pub use hash::{Hash, Hashing};
pub use literal::{Dependency, DependencyKind, Literal};
pub use value::LiteralValue;
