use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::canonical;
use super::value::LiteralValue;
use crate::core::{HashspaceError, Result};

/// Length of a hex encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Content-derived identifier: lowercase hex SHA-256.
///
/// Ordering is lexicographic on the hex text, which is the ordering used to
/// canonicalize hashed sets.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Wraps hex text without checking it. Use [`Hash::parse`] for untrusted input.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Hash(hex.into())
    }

    /// Parses untrusted text, requiring a full-length lowercase hex digest.
    pub fn parse(text: &str) -> Result<Self> {
        let hash = Hash(text.to_string());
        if hash.is_well_formed() {
            Ok(hash)
        } else {
            Err(HashspaceError::MalformedLiteral(format!(
                "not a hash: {text:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.len() == HASH_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash functions used for content addressing.
pub struct Hashing;

impl Hashing {
    pub fn for_bytes(bytes: &[u8]) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Hash(format!("{:x}", hasher.finalize()))
    }

    pub fn for_str(text: &str) -> Hash {
        Self::for_bytes(text.as_bytes())
    }

    /// Hash of the canonical encoding of a literal value.
    pub fn for_value(value: &LiteralValue) -> Result<Hash> {
        let encoded = canonical::encode(value)?;
        Ok(Self::for_str(&encoded))
    }

    /// Hash identifying an element inside a hashed set.
    ///
    /// Embedded objects are identified by their own hash, everything else by
    /// the hash of its literal value.
    pub fn for_element(value: &LiteralValue) -> Result<Hash> {
        match value {
            LiteralValue::Dependency { hash } => Ok(hash.clone()),
            other => Self::for_value(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_str_is_sha256() {
        let hash = Hashing::for_str("abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(hash.is_well_formed());
    }

    #[test]
    fn test_parse_rejects_uppercase_and_short() {
        assert!(Hash::parse("ABC").is_err());
        assert!(Hash::parse(&"A".repeat(64)).is_err());
        assert!(Hash::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_number_and_string_differ() {
        let n = Hashing::for_value(&LiteralValue::Number { value: 1.0 }).unwrap();
        let s = Hashing::for_value(&LiteralValue::String { value: "1".into() }).unwrap();
        assert_ne!(n, s);
    }

    #[test]
    fn test_element_hash_of_dependency_is_target() {
        let target = Hashing::for_str("x");
        let value = LiteralValue::Dependency {
            hash: target.clone(),
        };
        assert_eq!(Hashing::for_element(&value).unwrap(), target);
    }
}
