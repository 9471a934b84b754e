use std::fmt;

use super::header::ObjectHeader;
use super::identity::Identity;
use super::reference::HashReference;
use crate::core::{HashspaceError, Result};
use crate::literal::codec::hash_object;
use crate::literal::{FieldReader, FieldWriter, Hash, Hashing, References};

/// A content-addressed entity.
///
/// Implementors declare a class name and how their fields map to and from a
/// literal; identity, authorship, hashing and derived ids come for free.
/// Every `&mut self` method that changes literalized content must call
/// `self.header_mut().touch()`.
pub trait HashedObject: Clone + fmt::Debug + Send + Sync + 'static {
    fn class_name(&self) -> &'static str;

    fn header(&self) -> &ObjectHeader;

    fn header_mut(&mut self) -> &mut ObjectHeader;

    /// Writes the object's own fields. Names must not start with `_`.
    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()>;

    /// Rebuilds the object's fields from a literal of class `class_name`.
    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self>;

    /// Called after the header is restored during deliteralize.
    fn init(&mut self) {}

    /// Pure check run on every validating deliteralize.
    fn validate(&self, _references: &References<'_>) -> bool {
        true
    }

    fn try_hash(&self) -> Result<Hash> {
        if let Some(hash) = self.header().cached_hash() {
            return Ok(hash.clone());
        }
        let hash = hash_object(self)?;
        self.header().prime_hash(hash.clone());
        Ok(hash)
    }

    /// The literal hash.
    ///
    /// # Panics
    ///
    /// Panics when the object holds content with no literal form (a
    /// non-finite number). That is a construction bug, not bad input; use
    /// [`HashedObject::try_hash`] to get the error instead.
    fn hash(&self) -> Hash {
        match self.try_hash() {
            Ok(hash) => hash,
            Err(e) => panic!("{} is not literalizable: {e}", self.class_name()),
        }
    }

    fn equals(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }

    fn id(&self) -> Option<&str> {
        self.header().id()
    }

    fn set_id(&mut self, id: impl Into<String>) {
        self.header_mut().set_id(Some(id.into()));
    }

    fn set_random_id(&mut self) {
        self.header_mut()
            .set_id(Some(uuid::Uuid::new_v4().simple().to_string()));
    }

    fn author(&self) -> Option<&Identity> {
        self.header().author()
    }

    fn set_author(&mut self, author: Identity) {
        self.header_mut().set_author(Some(author));
    }

    /// Id a sub-object stored under `field` gets: a pure function of this
    /// object's id and the field name.
    fn derived_id(&self, field: &str) -> Result<String> {
        let id = self
            .id()
            .ok_or_else(|| HashspaceError::MissingId(field.to_string()))?;
        Ok(Hashing::for_str(&format!("#{id}.{field}")).to_string())
    }

    /// Gives `sub` the derived id for `field` and returns it.
    fn add_derived_field<T: HashedObject>(&self, field: &str, mut sub: T) -> Result<T> {
        let id = self.derived_id(field)?;
        sub.set_id(id);
        Ok(sub)
    }

    fn check_derived_field<T: HashedObject>(&self, field: &str, sub: &T) -> bool {
        match self.derived_id(field) {
            Ok(id) => sub.id() == Some(id.as_str()),
            Err(_) => false,
        }
    }

    fn to_reference(&self) -> HashReference {
        HashReference::new(self.hash(), self.class_name())
    }
}

/// Checks the class name handed to [`HashedObject::read_fields`].
pub fn expect_class(found: &str, expected: &str) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(HashspaceError::MalformedLiteral(format!(
            "expected class {expected}, found {found}"
        )))
    }
}
