//! The built-in `:db/*` attribute vocabulary (spec.md §6) used to persist
//! schema itself as ordinary datoms, plus the genesis bootstrap that
//! installs those eight attributes about themselves.

use std::sync::Arc;

use crate::datom::Datom;
use crate::ids::{Attribute, EntityId, TxId};
use crate::schema::attribute::{AttributeSchema, Cardinality, ValueType};
use crate::value::Value;

pub const DB_IDENT: &str = ":db/ident";
pub const DB_VALUE_TYPE: &str = ":db/valueType";
pub const DB_CARDINALITY: &str = ":db/cardinality";
pub const DB_UNIQUE: &str = ":db/unique";
pub const DB_INDEX: &str = ":db/index";
pub const DB_IS_COMPONENT: &str = ":db/isComponent";
pub const DB_DOC: &str = ":db/doc";
pub const DB_TX_INSTANT: &str = ":db/txInstant";

/// Entity ids reserved for the built-in attributes themselves, so they can
/// describe each other (`:db/ident` has a `:db/valueType` datom, etc.) the
/// same way `:db/ident` describes user attributes. Kept below
/// [`crate::db::FIRST_USER_ENTITY_ID`] so they never collide with allocated
/// entities.
const DB_IDENT_ID: EntityId = EntityId(1);
const DB_VALUE_TYPE_ID: EntityId = EntityId(2);
const DB_CARDINALITY_ID: EntityId = EntityId(3);
const DB_UNIQUE_ID: EntityId = EntityId(4);
const DB_INDEX_ID: EntityId = EntityId(5);
const DB_IS_COMPONENT_ID: EntityId = EntityId(6);
const DB_DOC_ID: EntityId = EntityId(7);
const DB_TX_INSTANT_ID: EntityId = EntityId(8);

fn attr(ident: &str) -> Attribute {
    Arc::from(ident)
}

/// The datoms describing the built-in attributes, written at the genesis
/// transaction. A fresh [`crate::db::Db`] does not install these
/// automatically (many embeddings never touch schema at all); callers that
/// want a self-describing schema load transact them first.
pub fn default_datoms() -> Vec<Datom> {
    let tx = TxId::GENESIS;
    let builtins: &[(EntityId, &str, ValueType, Cardinality)] = &[
        (DB_IDENT_ID, DB_IDENT, ValueType::Keyword, Cardinality::One),
        (
            DB_VALUE_TYPE_ID,
            DB_VALUE_TYPE,
            ValueType::Keyword,
            Cardinality::One,
        ),
        (
            DB_CARDINALITY_ID,
            DB_CARDINALITY,
            ValueType::Keyword,
            Cardinality::One,
        ),
        (DB_UNIQUE_ID, DB_UNIQUE, ValueType::Keyword, Cardinality::One),
        (DB_INDEX_ID, DB_INDEX, ValueType::Bool, Cardinality::One),
        (
            DB_IS_COMPONENT_ID,
            DB_IS_COMPONENT,
            ValueType::Bool,
            Cardinality::One,
        ),
        (DB_DOC_ID, DB_DOC, ValueType::Str, Cardinality::One),
        (
            DB_TX_INSTANT_ID,
            DB_TX_INSTANT,
            ValueType::Instant,
            Cardinality::One,
        ),
    ];

    let mut datoms = Vec::with_capacity(builtins.len() * 3);
    for (eid, ident, value_type, cardinality) in builtins {
        datoms.push(Datom::assert(
            *eid,
            attr(DB_IDENT),
            Value::keyword(*ident),
            tx,
        ));
        datoms.push(Datom::assert(
            *eid,
            attr(DB_VALUE_TYPE),
            Value::keyword(value_type.keyword()),
            tx,
        ));
        datoms.push(Datom::assert(
            *eid,
            attr(DB_CARDINALITY),
            Value::keyword(cardinality.keyword()),
            tx,
        ));
    }
    datoms
}

/// The [`AttributeSchema`] view of the eight built-ins, for embedders that
/// want them validated like any other attribute once installed.
pub fn default_attribute_schemas() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new(DB_IDENT, ValueType::Keyword).unique_identity(),
        AttributeSchema::new(DB_VALUE_TYPE, ValueType::Keyword),
        AttributeSchema::new(DB_CARDINALITY, ValueType::Keyword),
        AttributeSchema::new(DB_UNIQUE, ValueType::Keyword),
        AttributeSchema::new(DB_INDEX, ValueType::Bool),
        AttributeSchema::new(DB_IS_COMPONENT, ValueType::Bool),
        AttributeSchema::new(DB_DOC, ValueType::Str),
        AttributeSchema::new(DB_TX_INSTANT, ValueType::Instant),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_datoms_describe_all_eight_builtins() {
        let datoms = default_datoms();
        assert_eq!(24, datoms.len());
        assert!(datoms
            .iter()
            .any(|d| d.value == Value::keyword(DB_TX_INSTANT)));
    }
}
