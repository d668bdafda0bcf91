//! The immutable five-component fact record and the four key orderings the
//! indexes sort it by.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::Instant;
use crate::ids::{Attribute, EntityId, TxId};
use crate::value::Value;

/// One fact assertion or retraction. Immutable once produced; a datom is
/// never mutated in place, only superseded by a later datom on the same
/// `(entity, attribute, value)` triple or retracted outright.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Datom {
    pub entity: EntityId,
    pub attribute: Attribute,
    pub value: Value,
    pub tx: TxId,
    /// `true` for an assertion, `false` for a retraction.
    pub added: bool,
}

impl Datom {
    pub fn assert(
        entity: EntityId,
        attribute: Attribute,
        value: impl Into<Value>,
        tx: TxId,
    ) -> Self {
        Self {
            entity,
            attribute,
            value: value.into(),
            tx,
            added: true,
        }
    }

    pub fn retract(
        entity: EntityId,
        attribute: Attribute,
        value: impl Into<Value>,
        tx: TxId,
    ) -> Self {
        Self {
            entity,
            attribute,
            value: value.into(),
            tx,
            added: false,
        }
    }

    /// The `:db/txInstant` datom every transaction writes about its own
    /// transaction entity. The tx-entity id lives in a dedicated high
    /// partition (see [`crate::ids::TX_PARTITION`]) so it never collides with
    /// an allocated user or schema entity id.
    pub fn tx_instant(tx: TxId, attribute: Attribute, instant: Instant) -> Self {
        Self::assert(
            EntityId(crate::ids::TX_PARTITION + tx.0 as i64),
            attribute,
            instant,
            tx,
        )
    }
}

impl std::fmt::Display for Datom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.added { "+" } else { "-" };
        write!(
            f,
            "[{} {} {} {} {sign}]",
            self.entity, self.attribute, self.value, self.tx
        )
    }
}

/// Journal wire format (spec.md §6): `[entity, "attribute", {t,v}, tx, added]`.
impl Serialize for Datom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(5)?;
        tuple.serialize_element(&self.entity.0)?;
        tuple.serialize_element(self.attribute.as_ref())?;
        tuple.serialize_element(&self.value)?;
        tuple.serialize_element(&self.tx.0)?;
        tuple.serialize_element(&self.added)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Datom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire(i64, String, Value, u64, bool);

        let Wire(entity, attribute, value, tx, added) = Wire::deserialize(deserializer)?;
        if attribute.is_empty() {
            return Err(D::Error::custom("datom attribute must not be empty"));
        }
        Ok(Datom {
            entity: EntityId(entity),
            attribute: Arc::from(attribute.as_str()),
            value,
            tx: TxId(tx),
            added,
        })
    }
}

/// Which built-in ordering a datom is being compared under. Each variant
/// below wraps a shared `Arc<Datom>` so the same datom can live in several
/// index containers (plus the history mirror and current-facts map) without
/// duplicating its payload.
macro_rules! index_key {
    ($name:ident, |$d:ident| $key:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name(pub Arc<Datom>);

        impl $name {
            pub fn new(datom: Arc<Datom>) -> Self {
                Self(datom)
            }

            fn sort_key($d: &Datom) -> impl Ord {
                $key
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                Self::sort_key(&self.0).cmp(&Self::sort_key(&other.0))
            }
        }
    };
}

// EAVT: entity, attribute, value, tx — "all facts about E".
index_key!(EavtKey, |d| (
    d.entity,
    d.attribute.clone(),
    d.value.clone(),
    d.tx,
    d.added
));

// AEVT: attribute, entity, value, tx — "all entities with attr A".
index_key!(AevtKey, |d| (
    d.attribute.clone(),
    d.entity,
    d.value.clone(),
    d.tx,
    d.added
));

// AVET: attribute, value, entity, tx — "entities where A=V".
index_key!(AvetKey, |d| (
    d.attribute.clone(),
    d.value.clone(),
    d.entity,
    d.tx,
    d.added
));

// VAET: value, attribute, entity, tx — reverse references (ref values only).
index_key!(VaetKey, |d| (
    d.value.clone(),
    d.attribute.clone(),
    d.entity,
    d.tx,
    d.added
));
