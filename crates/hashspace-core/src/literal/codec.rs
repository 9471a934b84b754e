//! Object-level literalize / deliteralize.
//!
//! [`literalize`] renders a [`HashedObject`] and every object it embeds into a
//! [`LiteralContext`]; [`deliteralize`] rebuilds the object from a context,
//! checking hashes, dependency lists, signatures and `validate` on the way.

use std::collections::{BTreeMap, BTreeSet};

use super::context::LiteralContext;
use super::hash::{Hash, Hashing};
use super::literal::{Dependency, DependencyKind, Literal};
use super::{bigint, value::LiteralValue};
use crate::core::{HashspaceError, Result};
use crate::model::{HashedObject, Identity};

/// Values that have a canonical literal form.
pub trait Literalize {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue>;
}

/// Values that can be rebuilt from their literal form.
pub trait Deliteralize: Sized {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self>;
}

/// Collects the dependencies of the literal being built and, unless only a
/// hash is wanted, the literals of everything embedded.
pub struct Encoder<'c> {
    context: Option<&'c mut LiteralContext>,
    dependencies: BTreeSet<Dependency>,
}

impl<'c> Encoder<'c> {
    fn new(context: Option<&'c mut LiteralContext>) -> Self {
        Self {
            context,
            dependencies: BTreeSet::new(),
        }
    }

    /// Embeds an object by value and returns its hash.
    pub fn embed_hash<T: HashedObject>(&mut self, object: &T, path: &str) -> Result<Hash> {
        let hash = match self.context.as_deref_mut() {
            Some(context) => literalize_into(object, context)?,
            None => object.try_hash()?,
        };
        self.dependencies.insert(Dependency {
            hash: hash.clone(),
            path: path.to_string(),
            class_name: object.class_name().to_string(),
            kind: DependencyKind::Literal,
        });
        Ok(hash)
    }

    pub fn embed<T: HashedObject>(&mut self, object: &T, path: &str) -> Result<LiteralValue> {
        let hash = self.embed_hash(object, path)?;
        Ok(LiteralValue::Dependency { hash })
    }

    /// Records a by-hash reference. The target is not expanded.
    pub fn reference(&mut self, hash: &Hash, class_name: &str, path: &str) -> LiteralValue {
        self.dependencies.insert(Dependency {
            hash: hash.clone(),
            path: path.to_string(),
            class_name: class_name.to_string(),
            kind: DependencyKind::Reference,
        });
        LiteralValue::HashReference {
            hash: hash.clone(),
            class_name: class_name.to_string(),
        }
    }
}

/// Builder for the field map of a hashed object literal.
pub struct FieldWriter<'a, 'c> {
    encoder: &'a mut Encoder<'c>,
    fields: BTreeMap<String, LiteralValue>,
}

impl FieldWriter<'_, '_> {
    pub fn put<T: Literalize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        let literal = value.literalize(self.encoder, name)?;
        self.fields.insert(name.to_string(), literal);
        Ok(())
    }

    pub fn put_opt<T: Literalize>(&mut self, name: &str, value: Option<&T>) -> Result<()> {
        match value {
            Some(value) => self.put(name, value),
            None => Ok(()),
        }
    }
}

/// Resolved dependencies handed to [`HashedObject::validate`].
#[derive(Clone, Copy)]
pub struct References<'c> {
    context: &'c LiteralContext,
}

impl<'c> References<'c> {
    pub fn new(context: &'c LiteralContext) -> Self {
        Self { context }
    }

    pub fn get(&self, hash: &Hash) -> Option<&'c Literal> {
        self.context.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.context.contains(hash)
    }

    pub fn class_of(&self, hash: &Hash) -> Option<&'c str> {
        self.context.get(hash).and_then(Literal::class_name)
    }
}

/// Rebuilds objects from one literal context.
pub struct Decoder<'c> {
    context: &'c LiteralContext,
    validate: bool,
    in_progress: Vec<Hash>,
}

impl<'c> Decoder<'c> {
    pub fn new(context: &'c LiteralContext, validate: bool) -> Self {
        Self {
            context,
            validate,
            in_progress: Vec::new(),
        }
    }

    pub fn context(&self) -> &'c LiteralContext {
        self.context
    }

    pub fn is_validating(&self) -> bool {
        self.validate
    }

    /// Decodes the embedded object stored under `hash`.
    pub fn object<T: HashedObject>(&mut self, hash: &Hash) -> Result<T> {
        if self.in_progress.contains(hash) {
            return Err(HashspaceError::CyclicDependency(hash.clone()));
        }
        let context = self.context;
        let literal = context
            .get(hash)
            .ok_or_else(|| HashspaceError::MissingDependency(hash.clone()))?;
        if self.validate {
            literal.check_hash()?;
        }
        self.in_progress.push(hash.clone());
        let result = self.decode_literal::<T>(literal);
        self.in_progress.pop();
        result
    }

    fn decode_literal<T: HashedObject>(&mut self, literal: &'c Literal) -> Result<T> {
        let LiteralValue::HashedObject {
            class_name,
            id,
            author,
            fields,
        } = &literal.value
        else {
            return Err(HashspaceError::MalformedLiteral(format!(
                "expected hashed_object at {}, found {}",
                literal.hash,
                literal.value.type_name()
            )));
        };

        let mut reader = FieldReader {
            decoder: self,
            fields,
            consumed: BTreeSet::new(),
        };
        let mut object = T::read_fields(class_name, &mut reader)?;
        reader.finish()?;

        let author = match author {
            Some(author_hash) => Some(self.object::<Identity>(author_hash)?),
            None => None,
        };
        object
            .header_mut()
            .restore(id.clone(), author, literal.signature.clone());
        object.init();

        if self.validate {
            self.check_object(&object, literal)?;
            object.header().prime_hash(literal.hash.clone());
        }
        Ok(object)
    }

    fn check_object<T: HashedObject>(&self, object: &T, literal: &Literal) -> Result<()> {
        let mut scratch = LiteralContext::new();
        let hash = literalize_into(object, &mut scratch)?;
        if hash != literal.hash {
            return Err(HashspaceError::MalformedLiteral(format!(
                "{} does not re-literalize to its own hash",
                literal.hash
            )));
        }
        let rebuilt = scratch
            .get(&hash)
            .ok_or_else(|| HashspaceError::MissingDependency(hash.clone()))?;
        if rebuilt.dependencies != literal.dependencies {
            return Err(HashspaceError::MalformedLiteral(format!(
                "dependency list of {} does not match its content",
                literal.hash
            )));
        }

        if let Some(author) = object.header().author() {
            let signature = literal.signature.as_deref().ok_or_else(|| {
                HashspaceError::ValidationFailed(format!("{} is authored but unsigned", hash))
            })?;
            if !author.verify_signature(&hash, signature) {
                return Err(HashspaceError::ValidationFailed(format!(
                    "bad signature on {}",
                    hash
                )));
            }
        }

        if !object.validate(&References::new(self.context)) {
            return Err(HashspaceError::ValidationFailed(format!(
                "{} {} failed validation",
                object.class_name(),
                hash
            )));
        }
        Ok(())
    }
}

/// Reader over the field map of a hashed object literal.
pub struct FieldReader<'a, 'c> {
    decoder: &'a mut Decoder<'c>,
    fields: &'c BTreeMap<String, LiteralValue>,
    consumed: BTreeSet<&'c str>,
}

impl<'c> FieldReader<'_, 'c> {
    pub fn get<T: Deliteralize>(&mut self, name: &str) -> Result<T> {
        self.get_opt(name)?.ok_or_else(|| {
            HashspaceError::MalformedLiteral(format!("missing field {name:?}"))
        })
    }

    pub fn get_opt<T: Deliteralize>(&mut self, name: &str) -> Result<Option<T>> {
        let fields = self.fields;
        match fields.get_key_value(name) {
            Some((key, value)) => {
                self.consumed.insert(key.as_str());
                T::deliteralize(value, self.decoder).map(Some)
            }
            None => Ok(None),
        }
    }

    fn finish(self) -> Result<()> {
        if let Some(extra) = self.fields.keys().find(|k| !self.consumed.contains(k.as_str())) {
            return Err(HashspaceError::MalformedLiteral(format!(
                "unexpected field {extra:?}"
            )));
        }
        Ok(())
    }
}

fn encode_object<T: HashedObject>(object: &T, encoder: &mut Encoder<'_>) -> Result<LiteralValue> {
    let mut writer = FieldWriter {
        encoder: &mut *encoder,
        fields: BTreeMap::new(),
    };
    object.write_fields(&mut writer)?;
    let fields = writer.fields;

    let author = match object.header().author() {
        Some(author) => Some(encoder.embed_hash(author, "author")?),
        None => None,
    };

    Ok(LiteralValue::HashedObject {
        class_name: object.class_name().to_string(),
        id: object.header().id().map(str::to_string),
        author,
        fields,
    })
}

fn literalize_into<T: HashedObject>(object: &T, context: &mut LiteralContext) -> Result<Hash> {
    let (value, dependencies) = {
        let mut encoder = Encoder::new(Some(&mut *context));
        let value = encode_object(object, &mut encoder)?;
        (value, encoder.dependencies)
    };
    let hash = Hashing::for_value(&value)?;
    context.insert(Literal {
        hash: hash.clone(),
        value,
        signature: object.header().signature().map(str::to_string),
        dependencies: dependencies.into_iter().collect(),
    });
    Ok(hash)
}

/// Hash of an object's literal, without building the literals of its
/// embedded objects (their cached hashes are used instead).
pub(crate) fn hash_object<T: HashedObject>(object: &T) -> Result<Hash> {
    let mut encoder = Encoder::new(None);
    let value = encode_object(object, &mut encoder)?;
    Hashing::for_value(&value)
}

/// Literalizes an object and everything it embeds. The object is the only root.
pub fn literalize<T: HashedObject>(object: &T) -> Result<LiteralContext> {
    let mut context = LiteralContext::new();
    let hash = literalize_into(object, &mut context)?;
    context.add_root(hash);
    Ok(context)
}

/// Element hash of any literalizable value, as used by hashed sets.
pub fn hash_of<T: Literalize + ?Sized>(value: &T) -> Result<Hash> {
    let mut encoder = Encoder::new(None);
    let literal = value.literalize(&mut encoder, "")?;
    Hashing::for_element(&literal)
}

/// Rebuilds and fully validates the object stored under `hash`.
pub fn deliteralize<T: HashedObject>(hash: &Hash, context: &LiteralContext) -> Result<T> {
    Decoder::new(context, true).object(hash)
}

/// Rebuilds an object from trusted literals (local clones), skipping checks.
pub fn deliteralize_unchecked<T: HashedObject>(hash: &Hash, context: &LiteralContext) -> Result<T> {
    Decoder::new(context, false).object(hash)
}

fn unexpected(expected: &str, found: &LiteralValue) -> HashspaceError {
    HashspaceError::MalformedLiteral(format!(
        "expected {expected}, found {}",
        found.type_name()
    ))
}

impl Literalize for bool {
    fn literalize(&self, _: &mut Encoder<'_>, _: &str) -> Result<LiteralValue> {
        Ok(LiteralValue::Boolean { value: *self })
    }
}

impl Deliteralize for bool {
    fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Boolean { value } => Ok(*value),
            other => Err(unexpected("boolean", other)),
        }
    }
}

impl Literalize for f64 {
    fn literalize(&self, _: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        if !self.is_finite() {
            return Err(HashspaceError::MalformedLiteral(format!(
                "non-finite number in {path:?}"
            )));
        }
        Ok(LiteralValue::Number { value: *self })
    }
}

impl Deliteralize for f64 {
    fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Number { value } if value.is_finite() => Ok(*value),
            other => Err(unexpected("finite number", other)),
        }
    }
}

macro_rules! small_int_literal {
    ($($ty:ty),*) => {$(
        impl Literalize for $ty {
            fn literalize(&self, _: &mut Encoder<'_>, _: &str) -> Result<LiteralValue> {
                Ok(LiteralValue::Number { value: f64::from(*self) })
            }
        }

        impl Deliteralize for $ty {
            fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
                match value {
                    LiteralValue::Number { value }
                        if value.fract() == 0.0
                            && *value >= f64::from(<$ty>::MIN)
                            && *value <= f64::from(<$ty>::MAX) =>
                    {
                        Ok(*value as $ty)
                    }
                    other => Err(unexpected(stringify!($ty), other)),
                }
            }
        }
    )*};
}

small_int_literal!(u8, u16, u32, i32);

macro_rules! big_int_literal {
    ($($ty:ty),*) => {$(
        impl Literalize for $ty {
            fn literalize(&self, _: &mut Encoder<'_>, _: &str) -> Result<LiteralValue> {
                Ok(LiteralValue::BigInt { value: bigint::encode(i128::from(*self)) })
            }
        }

        impl Deliteralize for $ty {
            fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
                match value {
                    LiteralValue::BigInt { value } => {
                        let n = bigint::decode(value)?;
                        <$ty>::try_from(n).map_err(|_| {
                            HashspaceError::ValidationFailed(format!(
                                "{value} out of range for {}",
                                stringify!($ty)
                            ))
                        })
                    }
                    other => Err(unexpected("bigint", other)),
                }
            }
        }
    )*};
}

big_int_literal!(i64, u64, i128);

impl Literalize for str {
    fn literalize(&self, _: &mut Encoder<'_>, _: &str) -> Result<LiteralValue> {
        Ok(LiteralValue::string(self))
    }
}

impl Literalize for String {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        self.as_str().literalize(encoder, path)
    }
}

impl Deliteralize for String {
    fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::String { value } => Ok(value.clone()),
            other => Err(unexpected("string", other)),
        }
    }
}

impl Literalize for Hash {
    fn literalize(&self, _: &mut Encoder<'_>, _: &str) -> Result<LiteralValue> {
        Ok(LiteralValue::string(self.as_str()))
    }
}

impl Deliteralize for Hash {
    fn deliteralize(value: &LiteralValue, _: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::String { value } => Hash::parse(value),
            other => Err(unexpected("hash string", other)),
        }
    }
}

impl<T: Literalize> Literalize for Vec<T> {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        let elements = self
            .iter()
            .map(|element| element.literalize(encoder, path))
            .collect::<Result<Vec<_>>>()?;
        Ok(LiteralValue::Array { elements })
    }
}

impl<T: Deliteralize> Deliteralize for Vec<T> {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Array { elements } => elements
                .iter()
                .map(|element| T::deliteralize(element, decoder))
                .collect(),
            other => Err(unexpected("array", other)),
        }
    }
}

impl<A: Literalize, B: Literalize> Literalize for (A, B) {
    fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
        Ok(LiteralValue::Array {
            elements: vec![
                self.0.literalize(encoder, path)?,
                self.1.literalize(encoder, path)?,
            ],
        })
    }
}

impl<A: Deliteralize, B: Deliteralize> Deliteralize for (A, B) {
    fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
        match value {
            LiteralValue::Array { elements } if elements.len() == 2 => Ok((
                A::deliteralize(&elements[0], decoder)?,
                B::deliteralize(&elements[1], decoder)?,
            )),
            other => Err(unexpected("pair", other)),
        }
    }
}

/// Implements [`Literalize`] / [`Deliteralize`] for hashed object types, so
/// they can be embedded by value in fields and containers.
#[macro_export]
macro_rules! embeddable {
    (generic $g:ident: $bound:path => $ty:ty) => {
        impl<$g: $bound> $crate::literal::Literalize for $ty {
            fn literalize(
                &self,
                encoder: &mut $crate::literal::Encoder<'_>,
                path: &str,
            ) -> $crate::core::Result<$crate::literal::LiteralValue> {
                encoder.embed(self, path)
            }
        }

        impl<$g: $bound> $crate::literal::Deliteralize for $ty {
            fn deliteralize(
                value: &$crate::literal::LiteralValue,
                decoder: &mut $crate::literal::Decoder<'_>,
            ) -> $crate::core::Result<Self> {
                match value {
                    $crate::literal::LiteralValue::Dependency { hash } => decoder.object(hash),
                    other => Err($crate::core::HashspaceError::MalformedLiteral(format!(
                        "expected embedded object, found {}",
                        other.type_name()
                    ))),
                }
            }
        }
    };
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::literal::Literalize for $ty {
            fn literalize(
                &self,
                encoder: &mut $crate::literal::Encoder<'_>,
                path: &str,
            ) -> $crate::core::Result<$crate::literal::LiteralValue> {
                encoder.embed(self, path)
            }
        }

        impl $crate::literal::Deliteralize for $ty {
            fn deliteralize(
                value: &$crate::literal::LiteralValue,
                decoder: &mut $crate::literal::Decoder<'_>,
            ) -> $crate::core::Result<Self> {
                match value {
                    $crate::literal::LiteralValue::Dependency { hash } => decoder.object(hash),
                    other => Err($crate::core::HashspaceError::MalformedLiteral(format!(
                        "expected embedded object, found {}",
                        other.type_name()
                    ))),
                }
            }
        }
    )*};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{expect_class, HashedMap, ObjectHeader};

    const NODE_CLASS: &str = "test/Node";

    /// A chain of nodes, each carrying a few counters.
    #[derive(Debug, Clone)]
    struct Node {
        header: ObjectHeader,
        label: String,
        counts: HashedMap<String, u32>,
        next: Option<Box<Node>>,
    }

    impl Node {
        fn new(label: &str, next: Option<Node>) -> Self {
            Self {
                header: ObjectHeader::new(),
                label: label.to_string(),
                counts: HashedMap::new(),
                next: next.map(Box::new),
            }
        }
    }

    impl Literalize for Box<Node> {
        fn literalize(&self, encoder: &mut Encoder<'_>, path: &str) -> Result<LiteralValue> {
            encoder.embed(self.as_ref(), path)
        }
    }

    impl Deliteralize for Box<Node> {
        fn deliteralize(value: &LiteralValue, decoder: &mut Decoder<'_>) -> Result<Self> {
            match value {
                LiteralValue::Dependency { hash } => decoder.object(hash).map(Box::new),
                other => Err(HashspaceError::MalformedLiteral(other.type_name().to_string())),
            }
        }
    }

    impl HashedObject for Node {
        fn class_name(&self) -> &'static str {
            NODE_CLASS
        }

        fn header(&self) -> &ObjectHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut ObjectHeader {
            &mut self.header
        }

        fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
            fields.put("label", &self.label)?;
            fields.put("counts", &self.counts)?;
            fields.put_opt("next", self.next.as_ref())
        }

        fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
            expect_class(class_name, NODE_CLASS)?;
            Ok(Self {
                header: ObjectHeader::new(),
                label: fields.get("label")?,
                counts: fields.get("counts")?,
                next: fields.get_opt("next")?,
            })
        }
    }

    #[test]
    fn test_hashed_map_round_trip() {
        let mut tail = Node::new("tail", None);
        tail.counts.insert("seen".to_string(), 3);
        let mut head = Node::new("head", Some(tail.clone()));
        head.counts.insert("b".to_string(), 2);
        head.counts.insert("a".to_string(), 1);

        let context = literalize(&head).unwrap();
        assert_eq!(context.len(), 2);
        let decoded: Node = deliteralize(&head.hash(), &context).unwrap();
        assert_eq!(decoded.hash(), head.hash());
        assert_eq!(decoded.counts.len(), 2);
        assert_eq!(decoded.counts.get(&"a".to_string()), Some(&1));
        assert_eq!(decoded.counts.get(&"b".to_string()), Some(&2));
        let next = decoded.next.unwrap();
        assert_eq!(next.label, "tail");
        assert_eq!(next.counts.get(&"seen".to_string()), Some(&3));

        // insertion order does not reach the hash
        let mut reordered = Node::new("head", Some(tail));
        reordered.counts.insert("a".to_string(), 1);
        reordered.counts.insert("b".to_string(), 2);
        assert_eq!(reordered.hash(), head.hash());
    }

    #[test]
    fn test_absent_dependency_is_reported() {
        let tail = Node::new("tail", None);
        let head = Node::new("head", Some(tail.clone()));
        let mut context = literalize(&head).unwrap();
        context.literals.remove(&tail.hash());

        let err = deliteralize::<Node>(&head.hash(), &context).unwrap_err();
        assert!(matches!(&err, HashspaceError::MissingDependency(h) if *h == tail.hash()));
        assert!(err.is_retryable());
        let err = deliteralize::<Node>(&Hashing::for_str("nowhere"), &context).unwrap_err();
        assert!(matches!(err, HashspaceError::MissingDependency(_)));
    }

    #[test]
    fn test_dependency_cycle_is_detected() {
        let template = literalize(&Node::new("loop", None)).unwrap();
        let template = template.literals.values().next().unwrap().clone();
        let a = Hashing::for_str("a");
        let b = Hashing::for_str("b");
        let linked = |hash: &Hash, next: &Hash| {
            let mut literal = template.clone();
            literal.hash = hash.clone();
            if let LiteralValue::HashedObject { fields, .. } = &mut literal.value {
                fields.insert("next".into(), LiteralValue::Dependency { hash: next.clone() });
            }
            literal
        };
        let mut context = LiteralContext::new();
        context.insert(linked(&a, &b));
        context.insert(linked(&b, &a));

        // hashes cannot close a loop, so only an unchecked decode gets this far
        let err = deliteralize_unchecked::<Node>(&a, &context).unwrap_err();
        assert!(matches!(&err, HashspaceError::CyclicDependency(h) if *h == a));
        assert!(err.is_rejection());
        let err = deliteralize::<Node>(&a, &context).unwrap_err();
        assert!(matches!(err, HashspaceError::MalformedLiteral(_)));
    }

    #[test]
    fn test_vec_keeps_order() {
        let a = hash_of(&vec!["x".to_string(), "y".to_string()]).unwrap();
        let b = hash_of(&vec!["y".to_string(), "x".to_string()]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_int_types_round_trip() {
        let context = LiteralContext::new();
        let mut decoder = Decoder::new(&context, true);
        let mut encoder = Encoder::new(None);

        let value = (-5_i64).literalize(&mut encoder, "n").unwrap();
        assert_eq!(value, LiteralValue::BigInt { value: "-5".into() });
        assert_eq!(i64::deliteralize(&value, &mut decoder).unwrap(), -5);

        let value = 7_u32.literalize(&mut encoder, "n").unwrap();
        assert_eq!(u32::deliteralize(&value, &mut decoder).unwrap(), 7);
        assert!(u8::deliteralize(&LiteralValue::Number { value: 300.0 }, &mut decoder).is_err());
        assert!(u32::deliteralize(&LiteralValue::Number { value: 1.5 }, &mut decoder).is_err());
    }

    #[test]
    fn test_hash_field_must_be_well_formed() {
        let context = LiteralContext::new();
        let mut decoder = Decoder::new(&context, true);
        let bad = LiteralValue::string("not-a-hash");
        assert!(Hash::deliteralize(&bad, &mut decoder).is_err());
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(hash_of(&f64::NAN).is_err());
    }
}
