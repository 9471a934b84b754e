use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::header::ObjectHeader;
use super::keys::KeyPair;
use super::object::{expect_class, HashedObject};
use crate::core::{HashspaceError, Result};
use crate::literal::{FieldReader, FieldWriter, Hash, References};

pub const IDENTITY_CLASS: &str = "hhs/v0/Identity";

/// A public key, optionally with a human readable label.
///
/// Identities are themselves hashed objects; objects name their author by
/// embedding one.
#[derive(Debug, Clone)]
pub struct Identity {
    header: ObjectHeader,
    public_key: String,
    info: Option<String>,
}

impl Identity {
    pub fn from_public_key(key: &VerifyingKey, info: Option<&str>) -> Self {
        Self {
            header: ObjectHeader::new(),
            public_key: hex::encode(key.as_bytes()),
            info: info.map(str::to_string),
        }
    }

    pub fn from_key_pair(keys: &KeyPair, info: Option<&str>) -> Self {
        Self::from_public_key(&keys.verifying_key(), info)
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes = hex::decode(&self.public_key)
            .map_err(|e| HashspaceError::Crypto(format!("public key: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HashspaceError::Crypto("public key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| HashspaceError::Crypto(e.to_string()))
    }

    /// Checks a hex signature over `hash`. Any decoding problem counts as a
    /// failed verification.
    pub fn verify_signature(&self, hash: &Hash, signature: &str) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        key.verify(hash.as_str().as_bytes(), &Signature::from_bytes(&bytes))
            .is_ok()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Identity {}

impl HashedObject for Identity {
    fn class_name(&self) -> &'static str {
        IDENTITY_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("publicKey", &self.public_key)?;
        fields.put_opt("info", self.info.as_ref())
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, IDENTITY_CLASS)?;
        Ok(Self {
            header: ObjectHeader::new(),
            public_key: fields.get("publicKey")?,
            info: fields.get_opt("info")?,
        })
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        self.author().is_none() && self.verifying_key().is_ok()
    }
}

crate::embeddable!(Identity);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{deliteralize, literalize};

    #[test]
    fn test_sign_and_verify() {
        let keys = KeyPair::from_seed([7u8; 32]);
        let identity = Identity::from_key_pair(&keys, Some("alice"));
        let hash = identity.hash();
        let signature = keys.sign(&hash);

        assert!(identity.verify_signature(&hash, &signature));
        assert!(!identity.verify_signature(&crate::literal::Hashing::for_str("other"), &signature));
        assert!(!identity.verify_signature(&hash, "zz"));
    }

    #[test]
    fn test_round_trip() {
        let keys = KeyPair::from_seed([1u8; 32]);
        let identity = Identity::from_key_pair(&keys, None);
        let context = literalize(&identity).unwrap();
        let back: Identity = deliteralize(&identity.hash(), &context).unwrap();
        assert_eq!(back, identity);
        assert_eq!(back.info(), None);
    }

    #[test]
    fn test_same_key_same_identity() {
        let a = Identity::from_key_pair(&KeyPair::from_seed([3u8; 32]), Some("x"));
        let b = Identity::from_key_pair(&KeyPair::from_seed([3u8; 32]), Some("x"));
        assert!(a.equals(&b));
    }
}
