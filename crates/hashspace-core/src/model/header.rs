use once_cell::sync::OnceCell;

use super::identity::Identity;
use crate::literal::Hash;

/// State every hashed object carries besides its own fields.
///
/// The hash cache is filled lazily and cleared by [`ObjectHeader::touch`],
/// which every `&mut` setter of an object must call.
#[derive(Debug, Clone, Default)]
pub struct ObjectHeader {
    id: Option<String>,
    author: Option<Box<Identity>>,
    signature: Option<String>,
    hash: OnceCell<Hash>,
}

impl ObjectHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
        self.touch();
    }

    pub fn author(&self) -> Option<&Identity> {
        self.author.as_deref()
    }

    pub fn set_author(&mut self, author: Option<Identity>) {
        self.author = author.map(Box::new);
        self.touch();
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Attaches a signature over the current hash. Does not affect the hash.
    pub fn set_signature(&mut self, signature: Option<String>) {
        self.signature = signature;
    }

    /// Content changed: drop the cached hash and the now stale signature.
    pub fn touch(&mut self) {
        self.hash.take();
        self.signature = None;
    }

    pub fn cached_hash(&self) -> Option<&Hash> {
        self.hash.get()
    }

    pub(crate) fn prime_hash(&self, hash: Hash) {
        let _ = self.hash.set(hash);
    }

    pub(crate) fn restore(
        &mut self,
        id: Option<String>,
        author: Option<Identity>,
        signature: Option<String>,
    ) {
        self.id = id;
        self.author = author.map(Box::new);
        self.signature = signature;
        self.hash.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Hashing;

    #[test]
    fn test_touch_clears_cache_and_signature() {
        let mut header = ObjectHeader::new();
        header.prime_hash(Hashing::for_str("x"));
        header.set_signature(Some("sig".into()));
        assert!(header.cached_hash().is_some());

        header.touch();
        assert!(header.cached_hash().is_none());
        assert!(header.signature().is_none());
    }

    #[test]
    fn test_signature_keeps_cache() {
        let mut header = ObjectHeader::new();
        header.prime_hash(Hashing::for_str("x"));
        header.set_signature(Some("sig".into()));
        assert_eq!(header.cached_hash(), Some(&Hashing::for_str("x")));
    }
}
