use std::collections::BTreeMap;

use super::set::HashedSet;
use crate::core::{HashspaceError, Result};
use crate::literal::{hash_of, Decoder, Deliteralize, Encoder, Hash, Literalize, LiteralValue};

/// Map keyed by the hash of the key. Literalizes as a hashed set of
/// `[key, value]` pairs.
#[derive(Debug, Clone)]
pub struct HashedMap<K, V> {
    entries: BTreeMap<Hash, (K, V)>,
}

impl<K, V> Default for HashedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, V> HashedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.values().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }
}

impl<K: Literalize, V: Literalize> HashedMap<K, V> {
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = hash_of(&key)?;
        hash_of(&value)?;
        Ok(self.entries.insert(hash, (key, value)).map(|(_, old)| old))
    }

    /// # Panics
    ///
    /// Panics if the key or value has no literal form.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.try_insert(key, value) {
            Ok(old) => old,
            Err(e) => panic!("entry of hashed map is not literalizable: {e}"),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = hash_of(key).ok()?;
        self.entries.get(&hash).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = hash_of(key).ok()?;
        self.entries.remove(&hash).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Literalize + Clone, V: Literalize + Clone> HashedMap<K, V> {
    fn as_pairs(&self) -> Result<HashedSet<(K, V)>> {
        let mut pairs = HashedSet::new();
        for (key, value) in self.entries.values() {
            pairs.try_add((key.clone(), value.clone()))?;
        }
        Ok(pairs)
    }

    pub fn literal_hash(&self) -> Result<Hash> {
        hash_of(self)
    }
}

impl<K: Literalize + Clone, V: Literalize + Clone> Literalize for HashedMap<K, V> {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        self.as_pairs()?.literalize(encoder, path)
    }
}

impl<K: Literalize + Deliteralize, V: Deliteralize> Deliteralize for HashedMap<K, V> {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        let pairs = HashedSet::<(K, V)>::deliteralize(value, decoder)?;
        let mut map = HashedMap::new();
        for (_, (key, value)) in pairs.into_entries() {
            let hash = hash_of(&key)?;
            if map.entries.insert(hash.clone(), (key, value)).is_some() {
                return Err(HashspaceError::MalformedLiteral(format!(
                    "duplicate key {hash} in hashed map"
                )));
            }
        }
        Ok(map)
    }
}
