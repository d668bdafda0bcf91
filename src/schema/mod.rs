//! Schema configuration attached to a [`crate::db::Db`] (spec.md §4.5):
//! per-attribute value type, cardinality, uniqueness, indexing and component
//! declarations, plus the datom encoding used to persist schema as ordinary
//! facts and read it back.

pub mod attribute;
pub mod default;

use std::collections::HashMap;

use crate::datom::Datom;
use crate::ids::{attribute, Attribute, EntityId, TxId};
use crate::schema::attribute::AttributeSchema;
use crate::schema::default::{
    DB_CARDINALITY, DB_DOC, DB_IDENT, DB_INDEX, DB_IS_COMPONENT, DB_UNIQUE, DB_VALUE_TYPE,
};
use crate::schema::attribute::{Cardinality, ValueType};
use crate::value::Value;

/// A validated, named collection of [`AttributeSchema`]s, keyed by attribute
/// ident. Attached to a [`crate::db::Db`] via `Db::with_schema`, detached via
/// `Db::without_schema`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: HashMap<Attribute, AttributeSchema>,
    /// When `true`, an `add` on an attribute absent from this schema is a
    /// `SchemaError::UndefinedAttribute`. When `false`, such attributes are
    /// permitted unconstrained (spec.md §4.3 step 3).
    pub strict: bool,
}

impl Schema {
    pub fn new(strict: bool) -> Self {
        Self {
            attributes: HashMap::new(),
            strict,
        }
    }

    pub fn with_attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.ident.clone(), schema);
        self
    }

    pub fn get(&self, attribute: &Attribute) -> Option<&AttributeSchema> {
        self.attributes.get(attribute)
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.attributes.contains_key(attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.values()
    }

    /// Datoms that install `attr_schema` under entity `eid` at `tx`
    /// (spec.md §4.5): `:db/ident`, `:db/valueType`, `:db/cardinality`,
    /// plus whichever of `:db/unique`, `:db/index`, `:db/isComponent`,
    /// `:db/doc` the schema declares.
    pub fn install_ops(eid: EntityId, attr_schema: &AttributeSchema, tx: TxId) -> Vec<Datom> {
        let mut datoms = vec![
            Datom::assert(
                eid,
                attribute(DB_IDENT),
                Value::keyword(attr_schema.ident.as_ref()),
                tx,
            ),
            Datom::assert(
                eid,
                attribute(DB_VALUE_TYPE),
                Value::keyword(attr_schema.value_type.keyword()),
                tx,
            ),
            Datom::assert(
                eid,
                attribute(DB_CARDINALITY),
                Value::keyword(attr_schema.cardinality.keyword()),
                tx,
            ),
        ];
        if let Some(kw) = attr_schema.unique.keyword() {
            datoms.push(Datom::assert(eid, attribute(DB_UNIQUE), Value::keyword(kw), tx));
        }
        if attr_schema.indexed {
            datoms.push(Datom::assert(eid, attribute(DB_INDEX), Value::Bool(true), tx));
        }
        if attr_schema.component {
            datoms.push(Datom::assert(
                eid,
                attribute(DB_IS_COMPONENT),
                Value::Bool(true),
                tx,
            ));
        }
        if let Some(doc) = &attr_schema.doc {
            datoms.push(Datom::assert(eid, attribute(DB_DOC), Value::str(doc.clone()), tx));
        }
        datoms
    }

    /// Rebuilds a [`Schema`] by scanning `datoms` for every entity carrying
    /// a `:db/ident`, reassembling its [`AttributeSchema`] from the sibling
    /// datoms on that same entity (spec.md §4.5 `loadFromIndexes`). Datoms
    /// on entities lacking a recognized `:db/valueType`/`:db/cardinality`
    /// pair are skipped rather than erroring — `loadFromIndexes` only ever
    /// reads back what `installOps` itself wrote.
    pub fn load_from_indexes(datoms: &[Datom], strict: bool) -> Schema {
        let mut by_entity: HashMap<EntityId, HashMap<&str, &Value>> = HashMap::new();
        for datom in datoms {
            by_entity
                .entry(datom.entity)
                .or_default()
                .insert(datom.attribute.as_ref(), &datom.value);
        }

        let mut schema = Schema::new(strict);
        for fields in by_entity.values() {
            let Some(Value::Keyword(ident)) = fields.get(DB_IDENT) else {
                continue;
            };
            let Some(Value::Keyword(vt_kw)) = fields.get(DB_VALUE_TYPE) else {
                continue;
            };
            let Some(value_type) = ValueType::from_keyword(vt_kw) else {
                continue;
            };
            let cardinality = match fields.get(DB_CARDINALITY) {
                Some(Value::Keyword(kw)) => {
                    Cardinality::from_keyword(kw).unwrap_or(Cardinality::One)
                }
                _ => Cardinality::One,
            };

            let mut attr_schema = AttributeSchema::new(ident.as_ref(), value_type);
            if cardinality == Cardinality::Many {
                attr_schema = attr_schema.many();
            }
            match fields.get(DB_UNIQUE) {
                Some(Value::Keyword(kw)) if kw.as_ref() == ":db.unique/identity" => {
                    attr_schema = attr_schema.unique_identity();
                }
                Some(Value::Keyword(kw)) if kw.as_ref() == ":db.unique/value" => {
                    attr_schema = attr_schema.unique_value();
                }
                _ => {}
            }
            if matches!(fields.get(DB_INDEX), Some(Value::Bool(true))) {
                attr_schema = attr_schema.indexed();
            }
            if matches!(fields.get(DB_IS_COMPONENT), Some(Value::Bool(true))) {
                attr_schema = attr_schema.component();
            }
            if let Some(Value::Str(doc)) = fields.get(DB_DOC) {
                attr_schema = attr_schema.with_doc(doc.to_string());
            }
            schema = schema.with_attribute(attr_schema);
        }
        schema
    }
}
