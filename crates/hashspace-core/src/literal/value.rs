use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::hash::Hash;

/// Canonical form of one value inside a literal.
///
/// Embedded hashed objects appear as [`LiteralValue::Dependency`]; their own
/// literal lives in the surrounding [`LiteralContext`](super::LiteralContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiteralValue {
    Boolean {
        value: bool,
    },
    Number {
        value: f64,
    },
    String {
        value: String,
    },
    #[serde(rename = "bigint")]
    BigInt {
        value: String,
    },
    Array {
        elements: Vec<LiteralValue>,
    },
    HashedSet {
        hashes: Vec<Hash>,
        elements: Vec<LiteralValue>,
    },
    HashReference {
        hash: Hash,
        #[serde(rename = "className")]
        class_name: String,
    },
    Dependency {
        hash: Hash,
    },
    HashedObject {
        #[serde(rename = "className")]
        class_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<Hash>,
        fields: BTreeMap<String, LiteralValue>,
    },
}

impl LiteralValue {
    pub fn string(value: impl Into<String>) -> Self {
        LiteralValue::String {
            value: value.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralValue::Boolean { .. } => "boolean",
            LiteralValue::Number { .. } => "number",
            LiteralValue::String { .. } => "string",
            LiteralValue::BigInt { .. } => "bigint",
            LiteralValue::Array { .. } => "array",
            LiteralValue::HashedSet { .. } => "hashed_set",
            LiteralValue::HashReference { .. } => "hash_reference",
            LiteralValue::Dependency { .. } => "dependency",
            LiteralValue::HashedObject { .. } => "hashed_object",
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            LiteralValue::HashedObject { class_name, .. }
            | LiteralValue::HashReference { class_name, .. } => Some(class_name),
            _ => None,
        }
    }

    /// Field of a hashed object value.
    pub fn field(&self, name: &str) -> Option<&LiteralValue> {
        match self {
            LiteralValue::HashedObject { fields, .. } => fields.get(name),
            _ => None,
        }
    }
}
