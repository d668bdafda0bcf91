//! Operations accepted by the transactor (spec.md §4.3, §6) — the
//! declarative surface consumed from the (out-of-scope) fluent
//! transaction-building DSL — plus the tx-function registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datom::Datom;
use crate::db::Db;
use crate::error::Result;
use crate::ids::{Attribute, EntityId};
use crate::value::Value;

/// `ref ::= id(e) | lookup(a, v)` (spec.md §6) — how `RetractEntity` names
/// its target: an explicit entity id, or a (unique-attribute, value) pair
/// resolved against the current db.
#[derive(Debug, Clone)]
pub enum EntityRef {
    Id(EntityId),
    Lookup(Attribute, Value),
}

impl EntityRef {
    pub fn id(e: impl Into<EntityId>) -> Self {
        EntityRef::Id(e.into())
    }

    pub fn lookup(a: impl Into<Attribute>, v: impl Into<Value>) -> Self {
        EntityRef::Lookup(a.into(), v.into())
    }
}

/// `add(e,a,v) | retract(e,a,v) | retractEntity(ref) | call(name, args)`
/// (spec.md §6). `Call` and `RetractEntity` are both fully expanded into
/// `Add`/`Retract` before a transaction reaches schema validation — see
/// [`crate::transactor`].
#[derive(Debug, Clone)]
pub enum Operation {
    Add(EntityId, Attribute, Value),
    Retract(EntityId, Attribute, Value),
    RetractEntity(EntityRef),
    Call(String, Vec<Value>),
}

impl Operation {
    pub fn add(e: impl Into<EntityId>, a: impl Into<Attribute>, v: impl Into<Value>) -> Self {
        Operation::Add(e.into(), a.into(), v.into())
    }

    pub fn retract(e: impl Into<EntityId>, a: impl Into<Attribute>, v: impl Into<Value>) -> Self {
        Operation::Retract(e.into(), a.into(), v.into())
    }

    pub fn retract_entity(r: EntityRef) -> Self {
        Operation::RetractEntity(r)
    }

    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Operation::Call(name.into(), args)
    }
}

/// A fluent builder over a list of [`Operation`]s (spec.md §9's "Supplemented
/// Features" — mirrors the teacher's `Transaction::new().with(op)` builder
/// in `src/tx/mod.rs`), used to compose an operation list before handing it
/// to [`crate::connection::Connection::transact`].
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }
}

/// The read-only view of the pre-transaction Db handed to a registered
/// tx-function (spec.md §4.3 step 1): `getOne`, `get`, `entity`,
/// `findByAttrValue`, `findOneByAttrValue`.
pub struct TxContext<'a> {
    pub db: &'a Db,
}

impl<'a> TxContext<'a> {
    pub fn get_one(&self, e: EntityId, a: &Attribute) -> Option<Value> {
        self.db.get_one(e, a)
    }

    pub fn get(&self, e: EntityId, a: &Attribute) -> Vec<Value> {
        self.db.get(e, a)
    }

    pub fn entity(&self, e: EntityId) -> Vec<Arc<Datom>> {
        self.db.entity(e)
    }

    pub fn find_by_attr_value(&self, a: &Attribute, v: &Value) -> Vec<EntityId> {
        self.db.entities_with_attr_value(a, v)
    }

    pub fn find_one_by_attr_value(&self, a: &Attribute, v: &Value) -> Option<EntityId> {
        self.db.entity_with_attr_value(a, v)
    }
}

/// A pure, registered function of `(context, args)` producing further
/// operations (spec.md §4.3 step 1, §6 "Tx-function registry"). Registered
/// at construction time; the engine never loads code dynamically.
pub type TxFunction =
    Arc<dyn Fn(&TxContext, &[Value]) -> Result<Vec<Operation>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TxFunctions {
    registry: HashMap<String, TxFunction>,
}

impl TxFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, f: TxFunction) -> Self {
        self.registry.insert(name.into(), f);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TxFunction> {
        self.registry.get(name)
    }
}
