use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::hash::Hash;
use super::literal::Literal;
use crate::core::Result;

/// A self-contained snapshot of an object graph.
///
/// This is the JSON export/import format (`.ctx` files) and the unit handed
/// between the codec, the store and sync. Exporting, importing and exporting
/// again yields identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralContext {
    pub root_hashes: Vec<Hash>,
    pub literals: BTreeMap<Hash, Literal>,
}

impl LiteralContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a literal, keeping the first copy when the hash is already present.
    pub fn insert(&mut self, literal: Literal) -> bool {
        if self.literals.contains_key(&literal.hash) {
            return false;
        }
        self.literals.insert(literal.hash.clone(), literal);
        true
    }

    pub fn get(&self, hash: &Hash) -> Option<&Literal> {
        self.literals.get(hash)
    }

    pub fn get_mut(&mut self, hash: &Hash) -> Option<&mut Literal> {
        self.literals.get_mut(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.literals.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn add_root(&mut self, hash: Hash) {
        if !self.root_hashes.contains(&hash) {
            self.root_hashes.push(hash);
        }
    }

    pub fn merge(&mut self, other: LiteralContext) {
        for hash in other.root_hashes {
            self.add_root(hash);
        }
        for (_, literal) in other.literals {
            self.insert(literal);
        }
    }

    /// Checks every literal's declared hash against its content.
    pub fn check_hashes(&self) -> Result<()> {
        for literal in self.literals.values() {
            literal.check_hash()?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
