use std::collections::BTreeMap;

use crate::core::{HashspaceError, Result};
use crate::literal::{
    hash_of, Decoder, Deliteralize, Encoder, Hash, Hashing, Literalize, LiteralValue,
};

/// Set keyed by element hash.
///
/// Its literal lists elements in ascending hash order, so two sets with the
/// same members have the same literal no matter how they were built.
#[derive(Debug, Clone)]
pub struct HashedSet<T> {
    elements: BTreeMap<Hash, T>,
}

impl<T> Default for HashedSet<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
        }
    }
}

impl<T> HashedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn has_hash(&self, hash: &Hash) -> bool {
        self.elements.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&T> {
        self.elements.get(hash)
    }

    pub fn remove_by_hash(&mut self, hash: &Hash) -> Option<T> {
        self.elements.remove(hash)
    }

    pub fn hashes(&self) -> impl Iterator<Item = &Hash> {
        self.elements.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.elements.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &T)> {
        self.elements.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (Hash, T)> {
        self.elements.into_iter()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}

impl<T: Literalize> HashedSet<T> {
    /// Adds an element, returning `false` if it was already present.
    pub fn try_add(&mut self, element: T) -> Result<bool> {
        let hash = hash_of(&element)?;
        if self.elements.contains_key(&hash) {
            return Ok(false);
        }
        self.elements.insert(hash, element);
        Ok(true)
    }

    /// # Panics
    ///
    /// Panics if the element has no literal form. Use [`HashedSet::try_add`]
    /// for values that may hold non-finite numbers.
    pub fn add(&mut self, element: T) -> bool {
        match self.try_add(element) {
            Ok(added) => added,
            Err(e) => panic!("element of hashed set is not literalizable: {e}"),
        }
    }

    pub fn has(&self, element: &T) -> bool {
        hash_of(element).is_ok_and(|hash| self.elements.contains_key(&hash))
    }

    pub fn remove(&mut self, element: &T) -> Option<T> {
        let hash = hash_of(element).ok()?;
        self.elements.remove(&hash)
    }

    /// Hash of the set's own literal.
    pub fn literal_hash(&self) -> Result<Hash> {
        hash_of(self)
    }
}

impl<T: Literalize> FromIterator<T> for HashedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = HashedSet::new();
        for element in iter {
            set.add(element);
        }
        set
    }
}

impl<T> PartialEq for HashedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elements.keys().eq(other.elements.keys())
    }
}

impl<T> Eq for HashedSet<T> {}

impl<T: Literalize> Literalize for HashedSet<T> {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        let mut hashes = Vec::with_capacity(self.elements.len());
        let mut elements = Vec::with_capacity(self.elements.len());
        for (hash, element) in &self.elements {
            hashes.push(hash.clone());
            elements.push(element.literalize(encoder, path)?);
        }
        Ok(LiteralValue::HashedSet { hashes, elements })
    }
}

impl<T: Deliteralize> Deliteralize for HashedSet<T> {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        let LiteralValue::HashedSet { hashes, elements } = value else {
            return Err(HashspaceError::MalformedLiteral(format!(
                "expected hashed_set, found {}",
                value.type_name()
            )));
        };
        if hashes.len() != elements.len() {
            return Err(HashspaceError::MalformedLiteral(
                "hashed set hashes and elements differ in length".into(),
            ));
        }
        let mut set = HashedSet::new();
        for (hash, element) in hashes.iter().zip(elements) {
            if decoder.is_validating() && Hashing::for_element(element)? != *hash {
                return Err(HashspaceError::MalformedLiteral(format!(
                    "hashed set element does not hash to {hash}"
                )));
            }
            let element = T::deliteralize(element, decoder)?;
            if set.elements.insert(hash.clone(), element).is_some() {
                return Err(HashspaceError::MalformedLiteral(format!(
                    "duplicate element {hash} in hashed set"
                )));
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent_hash() {
        let words = ["pear", "apple", "fig", "kiwi"];
        let forward: HashedSet<String> = words.iter().map(|w| w.to_string()).collect();
        let backward: HashedSet<String> = words.iter().rev().map(|w| w.to_string()).collect();
        assert_eq!(forward.literal_hash().unwrap(), backward.literal_hash().unwrap());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut set = HashedSet::new();
        assert!(set.add("a".to_string()));
        assert!(!set.add("a".to_string()));
        assert_eq!(set.len(), 1);
        assert!(set.has(&"a".to_string()));
        assert!(set.remove(&"a".to_string()).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_non_literalizable_element_is_an_error() {
        let mut set = HashedSet::new();
        assert!(set.try_add(f64::INFINITY).is_err());
    }

    #[test]
    #[should_panic(expected = "not literalizable")]
    fn test_add_panics_on_non_literalizable_element() {
        let mut set = HashedSet::new();
        set.add(f64::NAN);
    }
}
