//! The tagged value union stored in the fifth... third field of every datom.
//!
//! `Value` gives every index a single total order to sort by: values first
//! compare by type tag (the order fixed in spec §3), then within their own
//! kind. Floats use [`OrderedFloat`] so that NaN sorts consistently (equal to
//! itself, greater than every finite float) instead of breaking the total
//! order the indexes rely on — a deliberate deviation from IEEE-754
//! documented in spec.md §9.

use std::cmp::Ordering;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ordered_float::OrderedFloat;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::Instant;
use crate::ids::EntityId;

/// ```
/// use factstore::value::Value;
///
/// let mut values = vec![
///     Value::from(true),
///     Value::from(1i64),
///     Value::keyword("k"),
///     Value::str("s"),
/// ];
/// values.sort();
/// assert_eq!(values, vec![
///     Value::from(1i64),
///     Value::str("s"),
///     Value::from(true),
///     Value::keyword("k"),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(Arc<str>),
    Bool(bool),
    Instant(Instant),
    Ref(EntityId),
    Keyword(Arc<str>),
    Bytes(Arc<[u8]>),
}

/// Rank of each variant's type tag in the fixed total order from spec §3:
/// `int < float < string < bool < instant < ref < keyword < bytes`.
fn tag_rank(value: &Value) -> u8 {
    match value {
        Value::Int(_) => 0,
        Value::Float(_) => 1,
        Value::Str(_) => 2,
        Value::Bool(_) => 3,
        Value::Instant(_) => 4,
        Value::Ref(_) => 5,
        Value::Keyword(_) => 6,
        Value::Bytes(_) => 7,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Instant(a), Value::Instant(b)) => a.cmp(b),
            (Value::Ref(a), Value::Ref(b)) => a.cmp(b),
            (Value::Keyword(a), Value::Keyword(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.as_ref().cmp(b.as_ref()),
            _ => tag_rank(self).cmp(&tag_rank(other)),
        }
    }
}

impl Value {
    pub fn str(value: impl Into<Arc<str>>) -> Self {
        Value::Str(value.into())
    }

    pub fn keyword(value: impl Into<Arc<str>>) -> Self {
        Value::Keyword(value.into())
    }

    pub fn bytes(value: impl Into<Arc<[u8]>>) -> Self {
        Value::Bytes(value.into())
    }

    /// True if this value is an entity reference — the only case where a
    /// datom is also mirrored into the VAET index (spec §4.1).
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    pub fn as_ref_entity(&self) -> Option<EntityId> {
        match self {
            Value::Ref(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(OrderedFloat(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::Ref(value)
    }
}

impl From<Instant> for Value {
    fn from(value: Instant) -> Self {
        Value::Instant(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", v.0),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Instant(v) => write!(f, "#inst {v}"),
            Value::Ref(v) => write!(f, "#ref {v}"),
            Value::Keyword(v) => write!(f, ":{v}"),
            Value::Bytes(v) => write!(f, "#bytes[{} B]", v.len()),
        }
    }
}

/// Type-tagged wire form from spec.md §6: `{"t": kind, "v": payload}`.
/// Bytes are Base64 (standard alphabet); refs encode as their raw integer id.
#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum ValueWire {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Instant(i64),
    Ref(i64),
    Keyword(String),
    Bytes(String),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Value::Int(v) => ValueWire::Int(*v),
            Value::Float(v) => ValueWire::Float(v.0),
            Value::Str(v) => ValueWire::String(v.to_string()),
            Value::Bool(v) => ValueWire::Bool(*v),
            Value::Instant(v) => ValueWire::Instant(v.0),
            Value::Ref(v) => ValueWire::Ref(v.0),
            Value::Keyword(v) => ValueWire::Keyword(v.to_string()),
            Value::Bytes(v) => ValueWire::Bytes(BASE64.encode(v.as_ref())),
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ValueWire::deserialize(deserializer)?;
        Ok(match wire {
            ValueWire::Int(v) => Value::Int(v),
            ValueWire::Float(v) => Value::from(v),
            ValueWire::String(v) => Value::str(v),
            ValueWire::Bool(v) => Value::Bool(v),
            ValueWire::Instant(v) => Value::Instant(Instant(v)),
            ValueWire::Ref(v) => Value::Ref(EntityId(v)),
            ValueWire::Keyword(v) => Value::keyword(v),
            ValueWire::Bytes(v) => {
                let bytes = BASE64.decode(v.as_bytes()).map_err(D::Error::custom)?;
                Value::bytes(bytes)
            }
        })
    }
}
