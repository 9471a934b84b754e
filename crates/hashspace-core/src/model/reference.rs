use serde::{Deserialize, Serialize};

use crate::core::{HashspaceError, Result};
use crate::literal::{Decoder, Deliteralize, Encoder, Hash, Literalize, LiteralValue};

/// Weak by-hash pointer to another object with its expected class.
///
/// Literalizing a reference records a `reference` dependency and never
/// expands the target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashReference {
    pub hash: Hash,
    #[serde(rename = "className")]
    pub class_name: String,
}

impl HashReference {
    pub fn new(hash: Hash, class_name: impl Into<String>) -> Self {
        Self {
            hash,
            class_name: class_name.into(),
        }
    }
}

impl Literalize for HashReference {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        Ok(encoder.reference(&self.hash, &self.class_name, path))
    }
}

impl Deliteralize for HashReference {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::HashReference { hash, class_name } => {
                if decoder.is_validating() && !hash.is_well_formed() {
                    return Err(HashspaceError::MalformedLiteral(format!(
                        "reference to malformed hash {hash}"
                    )));
                }
                Ok(Self::new(hash.clone(), class_name.clone()))
            }
            other => Err(HashspaceError::MalformedLiteral(format!(
                "expected hash_reference, found {}",
                other.type_name()
            ))),
        }
    }
}
