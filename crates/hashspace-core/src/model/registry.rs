use crate::capability::{
    CapabilityOp, CapabilitySet, PermissionedSet, CAPABILITY_SET_CLASS, GRANT_OP_CLASS,
    PERMISSIONED_SET_CLASS, REVOKE_AFTER_OP_CLASS, USE_OP_CLASS,
};
use crate::core::{HashspaceError, Result};
use crate::history::{CausalHistoryState, OpHeader, CAUSAL_HISTORY_STATE_CLASS, OP_HEADER_CLASS};
use crate::literal::{deliteralize, Hash, LiteralContext};
use crate::model::identity::IDENTITY_CLASS;
use crate::model::{HashedObject, Identity};
use crate::mutable::set::{ADD_OP_CLASS, DELETE_OP_CLASS, MUTABLE_SET_CLASS};
use crate::mutable::{MutableSet, SetOp};

/// Every class this crate can rebuild from a literal without knowing the
/// type up front. Sets are read with text elements.
#[derive(Debug, Clone)]
pub enum KnownObject {
    Identity(Identity),
    CapabilitySet(CapabilitySet),
    CapabilityOp(CapabilityOp),
    MutableSet(MutableSet<String>),
    SetOp(SetOp<String>),
    PermissionedSet(PermissionedSet<String>),
    OpHeader(OpHeader),
    CausalHistoryState(CausalHistoryState),
}

pub const KNOWN_CLASSES: &[&str] = &[
    IDENTITY_CLASS,
    CAPABILITY_SET_CLASS,
    GRANT_OP_CLASS,
    REVOKE_AFTER_OP_CLASS,
    USE_OP_CLASS,
    MUTABLE_SET_CLASS,
    ADD_OP_CLASS,
    DELETE_OP_CLASS,
    PERMISSIONED_SET_CLASS,
    OP_HEADER_CLASS,
    CAUSAL_HISTORY_STATE_CLASS,
];

impl KnownObject {
    pub fn is_known_class(class_name: &str) -> bool {
        KNOWN_CLASSES.contains(&class_name)
    }

    /// Rebuilds and validates the object under `hash`, dispatching on the
    /// class name of its literal.
    pub fn decode(hash: &Hash, context: &LiteralContext) -> Result<Self> {
        let literal = context
            .get(hash)
            .ok_or_else(|| HashspaceError::MissingDependency(hash.clone()))?;
        let class_name = literal.class_name().ok_or_else(|| {
            HashspaceError::MalformedLiteral(format!("{} is not a hashed object", hash.short()))
        })?;
        Ok(match class_name {
            IDENTITY_CLASS => KnownObject::Identity(deliteralize(hash, context)?),
            CAPABILITY_SET_CLASS => KnownObject::CapabilitySet(deliteralize(hash, context)?),
            GRANT_OP_CLASS | REVOKE_AFTER_OP_CLASS | USE_OP_CLASS => {
                KnownObject::CapabilityOp(deliteralize(hash, context)?)
            }
            MUTABLE_SET_CLASS => KnownObject::MutableSet(deliteralize(hash, context)?),
            ADD_OP_CLASS | DELETE_OP_CLASS => KnownObject::SetOp(deliteralize(hash, context)?),
            PERMISSIONED_SET_CLASS => KnownObject::PermissionedSet(deliteralize(hash, context)?),
            OP_HEADER_CLASS => KnownObject::OpHeader(deliteralize(hash, context)?),
            CAUSAL_HISTORY_STATE_CLASS => {
                KnownObject::CausalHistoryState(deliteralize(hash, context)?)
            }
            other => return Err(HashspaceError::UnknownClass(other.to_string())),
        })
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            KnownObject::Identity(o) => o.class_name(),
            KnownObject::CapabilitySet(o) => o.class_name(),
            KnownObject::CapabilityOp(o) => o.class_name(),
            KnownObject::MutableSet(o) => o.class_name(),
            KnownObject::SetOp(o) => o.class_name(),
            KnownObject::PermissionedSet(o) => o.class_name(),
            KnownObject::OpHeader(o) => o.class_name(),
            KnownObject::CausalHistoryState(o) => o.class_name(),
        }
    }

    pub fn try_hash(&self) -> Result<Hash> {
        match self {
            KnownObject::Identity(o) => o.try_hash(),
            KnownObject::CapabilitySet(o) => o.try_hash(),
            KnownObject::CapabilityOp(o) => o.try_hash(),
            KnownObject::MutableSet(o) => o.try_hash(),
            KnownObject::SetOp(o) => o.try_hash(),
            KnownObject::PermissionedSet(o) => o.try_hash(),
            KnownObject::OpHeader(o) => o.try_hash(),
            KnownObject::CausalHistoryState(o) => o.try_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{literalize, LiteralValue};
    use crate::model::KeyPair;

    #[test]
    fn test_decodes_by_class() {
        let identity = Identity::from_key_pair(&KeyPair::from_seed([9; 32]), Some("nine"));
        let context = literalize(&identity).unwrap();
        let decoded = KnownObject::decode(&identity.hash(), &context).unwrap();
        assert!(matches!(decoded, KnownObject::Identity(ref i) if *i == identity));
        assert_eq!(decoded.class_name(), IDENTITY_CLASS);
    }

    #[test]
    fn test_unknown_class_is_refused() {
        let identity = Identity::from_key_pair(&KeyPair::from_seed([9; 32]), None);
        let mut context = literalize(&identity).unwrap();
        let hash = identity.hash();
        if let Some(literal) = context.get_mut(&hash) {
            if let LiteralValue::HashedObject { class_name, .. } = &mut literal.value {
                *class_name = "app/Unheard".to_string();
            }
        }
        let err = KnownObject::decode(&hash, &context).unwrap_err();
        assert!(matches!(err, HashspaceError::UnknownClass(c) if c == "app/Unheard"));
        assert!(!KnownObject::is_known_class("app/Unheard"));
    }
}
