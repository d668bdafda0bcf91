//! The crate-wide error taxonomy (spec.md §7). Every fallible operation
//! returns one of these as a value; nothing in this crate panics on bad
//! input, and a failed transaction never mutates its input [`crate::db::Db`].

use thiserror::Error;

use crate::ids::{Attribute, EntityId};
use crate::schema::attribute::ValueType;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fact not found: ({0}, {1}, {2})")]
    FactNotFound(EntityId, Attribute, Value),

    #[error("schema violation: {0}")]
    SchemaViolation(#[from] SchemaError),

    #[error("lookup ref ({0}, {1}) did not resolve to any entity")]
    LookupNotFound(Attribute, Value),

    #[error("lookup ref ({0}, {1}) resolved to more than one entity")]
    LookupAmbiguous(Attribute, Value),

    #[error("attribute {0} is not a unique attribute, cannot be used as a lookup ref")]
    LookupAttrNotUnique(Attribute),

    #[error("tx function `{0}` is not registered")]
    TxFunctionNotFound(String),

    #[error("tx function recursion exceeded the configured max depth")]
    TxFunctionDepthExceeded,

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Custom(String),
}

/// Schema-validation sub-errors (spec.md §7), wrapped by [`Error::SchemaViolation`].
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("attribute {attr} expects a value of type {expected:?}, got {actual:?}")]
    TypeMismatch {
        attr: Attribute,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("cardinality-one violation: entity {0} attribute {1} asserted more than once in the same transaction")]
    CardinalityViolation(EntityId, Attribute),

    #[error("uniqueness violation: attribute {attr} value {value} already asserted on entity {existing}, cannot also assert it on {new}")]
    UniquenessViolation {
        attr: Attribute,
        value: Value,
        existing: EntityId,
        new: EntityId,
    },

    #[error("attribute {0} is not defined in a strict schema")]
    UndefinedAttribute(Attribute),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Journal/snapshot I/O failures (spec.md §4.7, §7). Kept distinct from
/// [`Error`] because these surface from the persistence layer specifically,
/// not from the pure in-memory transactor.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}
