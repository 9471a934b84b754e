use std::collections::HashMap;
use std::fmt;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use parking_lot::RwLock;

use super::identity::Identity;
use super::object::HashedObject;
use crate::literal::Hash;

/// An ed25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_seed(rand::random::<[u8; 32]>())
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Hex signature over the hash text.
    pub fn sign(&self, hash: &Hash) -> String {
        hex::encode(self.signing.sign(hash.as_str().as_bytes()).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Produces signatures on behalf of authors.
pub trait Signer: Send + Sync {
    /// Signs `hash` as `author`, or `None` when no key is held for it.
    fn sign_as(&self, author: &Hash, hash: &Hash) -> Option<String>;
}

/// Key pairs indexed by the hash of their identity.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: RwLock<HashMap<Hash, KeyPair>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key pair and returns the identity it signs for.
    pub fn add(&self, keys: KeyPair, info: Option<&str>) -> Identity {
        let identity = Identity::from_key_pair(&keys, info);
        self.keys.write().insert(identity.hash(), keys);
        identity
    }

    pub fn generate(&self, info: Option<&str>) -> Identity {
        self.add(KeyPair::generate(), info)
    }

    pub fn contains(&self, identity: &Hash) -> bool {
        self.keys.read().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl Signer for Keyring {
    fn sign_as(&self, author: &Hash, hash: &Hash) -> Option<String> {
        self.keys.read().get(author).map(|keys| keys.sign(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Hashing;

    #[test]
    fn test_keyring_signs_for_known_identity() {
        let keyring = Keyring::new();
        let alice = keyring.add(KeyPair::from_seed([9u8; 32]), Some("alice"));
        let hash = Hashing::for_str("payload");

        let signature = keyring.sign_as(&alice.hash(), &hash).unwrap();
        assert!(alice.verify_signature(&hash, &signature));
        assert!(keyring.sign_as(&Hashing::for_str("nobody"), &hash).is_none());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keys = KeyPair::from_seed([2u8; 32]);
        let text = format!("{keys:?}");
        assert!(text.contains("public"));
        assert!(!text.contains(&hex::encode([2u8; 32])));
    }
}
