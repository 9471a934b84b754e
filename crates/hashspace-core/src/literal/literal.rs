use serde::{Deserialize, Serialize};

use super::hash::{Hash, Hashing};
use super::value::LiteralValue;
use crate::core::{HashspaceError, Result};

/// Whether a dependency is embedded by value or only pointed at by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Literal,
    Reference,
}

/// One object a literal embeds or references.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub hash: Hash,
    pub path: String,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
}

/// The canonical serialized form of one hashed object.
///
/// `signature` is carried next to the value and is not part of the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub hash: Hash,
    pub value: LiteralValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl Literal {
    pub fn class_name(&self) -> Option<&str> {
        self.value.class_name()
    }

    pub fn author(&self) -> Option<&Hash> {
        match &self.value {
            LiteralValue::HashedObject { author, .. } => author.as_ref(),
            _ => None,
        }
    }

    /// Recomputes the hash of the value and compares it with the declared one.
    pub fn check_hash(&self) -> Result<()> {
        let computed = Hashing::for_value(&self.value)?;
        if computed != self.hash {
            return Err(HashspaceError::MalformedLiteral(format!(
                "hash mismatch: declared {} computed {}",
                self.hash, computed
            )));
        }
        Ok(())
    }

    pub fn embedded(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Literal)
    }
}
