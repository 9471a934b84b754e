//! Canonical text encoding of literal values, the input to content hashing.
//!
//! Every primitive carries a type tag so values of different types never
//! encode alike. Object fields are emitted in key order and set elements in
//! hash order, so the encoding does not depend on construction order.

use std::fmt::Write;

use super::bigint;
use super::value::LiteralValue;
use crate::core::{HashspaceError, Result};

pub fn encode(value: &LiteralValue) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &LiteralValue) -> Result<()> {
    match value {
        LiteralValue::Boolean { value } => {
            out.push_str(if *value { "b:true" } else { "b:false" });
        }
        LiteralValue::Number { value } => {
            if !value.is_finite() {
                return Err(HashspaceError::MalformedLiteral(format!(
                    "non-finite number {value}"
                )));
            }
            // -0 and 0 are the same number
            let value = if *value == 0.0 { 0.0 } else { *value };
            let _ = write!(out, "n:{value}");
        }
        LiteralValue::String { value } => {
            out.push_str("s:");
            out.push_str(&serde_json::to_string(value)?);
        }
        LiteralValue::BigInt { value } => {
            if !bigint::check_encoding(value) {
                return Err(HashspaceError::MalformedLiteral(format!(
                    "non-canonical bigint {value:?}"
                )));
            }
            out.push_str("i:");
            out.push_str(value);
        }
        LiteralValue::Array { elements } => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, element)?;
            }
            out.push(']');
        }
        LiteralValue::HashedSet { hashes, elements } => {
            if hashes.len() != elements.len() {
                return Err(HashspaceError::MalformedLiteral(
                    "hashed set hashes and elements differ in length".into(),
                ));
            }
            if hashes.windows(2).any(|w| w[0] >= w[1]) {
                return Err(HashspaceError::MalformedLiteral(
                    "hashed set is not sorted by element hash".into(),
                ));
            }
            out.push('<');
            for (i, hash) in hashes.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(hash.as_str());
            }
            out.push('>');
        }
        LiteralValue::HashReference { hash, class_name } => {
            let _ = write!(out, "r:{}@{}", serde_json::to_string(class_name)?, hash);
        }
        LiteralValue::Dependency { hash } => {
            let _ = write!(out, "d:{hash}");
        }
        LiteralValue::HashedObject {
            class_name,
            id,
            author,
            fields,
        } => {
            out.push_str("o:");
            out.push_str(&serde_json::to_string(class_name)?);
            out.push('{');
            let mut first = true;
            if let Some(id) = id {
                out.push_str("#id:");
                out.push_str(&serde_json::to_string(id)?);
                first = false;
            }
            if let Some(author) = author {
                if !first {
                    out.push(',');
                }
                let _ = write!(out, "@author:{author}");
                first = false;
            }
            for (name, field) in fields {
                if !first {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                write_value(out, field)?;
                first = false;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Hashing;
    use std::collections::BTreeMap;

    #[test]
    fn test_primitives_are_tagged() {
        assert_eq!(encode(&LiteralValue::Boolean { value: true }).unwrap(), "b:true");
        assert_eq!(encode(&LiteralValue::Number { value: 1.0 }).unwrap(), "n:1");
        assert_eq!(encode(&LiteralValue::string("1")).unwrap(), "s:\"1\"");
        assert_eq!(
            encode(&LiteralValue::BigInt { value: "+1".into() }).unwrap(),
            "i:+1"
        );
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let a = encode(&LiteralValue::Number { value: -0.0 }).unwrap();
        let b = encode(&LiteralValue::Number { value: 0.0 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(encode(&LiteralValue::Number { value: f64::NAN }).is_err());
        assert!(encode(&LiteralValue::Number {
            value: f64::INFINITY
        })
        .is_err());
    }

    #[test]
    fn test_unsorted_set_rejected() {
        let a = Hashing::for_str("a");
        let b = Hashing::for_str("b");
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let value = LiteralValue::HashedSet {
            hashes: vec![hi, lo],
            elements: vec![LiteralValue::string("x"), LiteralValue::string("y")],
        };
        assert!(encode(&value).is_err());
    }

    #[test]
    fn test_object_field_order_is_key_order() {
        let mut fields = BTreeMap::new();
        fields.insert("b".to_string(), LiteralValue::Boolean { value: false });
        fields.insert("a".to_string(), LiteralValue::Number { value: 2.5 });
        let value = LiteralValue::HashedObject {
            class_name: "test/Thing".into(),
            id: Some("x".into()),
            author: None,
            fields,
        };
        assert_eq!(
            encode(&value).unwrap(),
            "o:\"test/Thing\"{#id:\"x\",\"a\":n:2.5,\"b\":b:false}"
        );
    }
}
