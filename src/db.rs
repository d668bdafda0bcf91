//! The immutable snapshot of engine state at a transaction (spec.md §4.2).
//!
//! A `Db` is a value: transacting against it never mutates it, only produces
//! a fresh `Db` that shares structure with its predecessor through the
//! persistent containers in [`crate::index`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::datom::Datom;
use crate::ids::{Attribute, EntityId, TxId};
use crate::index::Indexes;
use crate::schema::Schema;
use crate::value::Value;

/// First entity id handed out to user/schema data by `alloc_entity_id`. Ids
/// below this are reserved for the built-in `:db/*` attributes
/// (`schema::default::default_datoms`) so a freshly bootstrapped schema
/// never collides with allocated entities.
pub const FIRST_USER_ENTITY_ID: i64 = 100;

#[derive(Debug, Clone, Default)]
pub struct Db {
    pub basis_t: TxId,
    pub(crate) current: Indexes,
    pub(crate) history: Indexes,
    /// Mirrors the current-index projection, keyed by `(entity, attribute,
    /// value)`, for O(1) "is this triple currently visible" checks — the
    /// retraction precondition and the uniqueness re-assertion no-op check
    /// both hinge on this (spec.md §3, §4.3).
    pub(crate) current_facts: im::HashSet<(EntityId, Attribute, Value)>,
    pub(crate) next_entity_id: i64,
    pub schema: Option<Arc<Schema>>,
}

impl Db {
    pub fn new() -> Self {
        Db {
            basis_t: TxId::GENESIS,
            current: Indexes::new(),
            history: Indexes::new(),
            current_facts: im::HashSet::new(),
            next_entity_id: FIRST_USER_ENTITY_ID,
            schema: None,
        }
    }

    /// A fresh Db with the eight built-in `:db/*` attributes pre-installed
    /// as genesis datoms (spec.md §4.5), so `:db/ident` etc. can be queried
    /// like any user attribute — e.g. by [`Schema::load_from_indexes`].
    pub fn with_builtin_schema() -> Self {
        let mut db = Self::new();
        for datom in crate::schema::default::default_datoms() {
            let datom = Arc::new(datom);
            db.current.insert(Arc::clone(&datom));
            db.history.insert(Arc::clone(&datom));
            db.current_facts
                .insert((datom.entity, datom.attribute.clone(), datom.value.clone()));
        }
        db
    }

    /// Reconstructs a Db's visibility from a flat datom stream: groups by
    /// `(entity, attribute, value)` and keeps only groups whose highest-tx
    /// member is an assertion (spec.md §4.4 `asOf`, §4.7 recovery). Used by
    /// both time travel and journal replay, which is why it lives here
    /// rather than in `connection` or `persistence`.
    pub fn rebuild_from_datoms(
        datoms: Vec<Arc<Datom>>,
        basis_t: TxId,
        schema: Option<Arc<Schema>>,
    ) -> Db {
        let mut groups: HashMap<(EntityId, Attribute, Value), Vec<Arc<Datom>>> = HashMap::new();
        let mut history = Indexes::new();
        let mut max_entity = 0i64;
        for d in &datoms {
            history.insert(Arc::clone(d));
            if d.entity.0 < crate::ids::TX_PARTITION {
                max_entity = max_entity.max(d.entity.0);
            }
            if let Value::Ref(r) = &d.value {
                if r.0 < crate::ids::TX_PARTITION {
                    max_entity = max_entity.max(r.0);
                }
            }
            groups
                .entry((d.entity, d.attribute.clone(), d.value.clone()))
                .or_default()
                .push(Arc::clone(d));
        }

        let mut current = Indexes::new();
        let mut current_facts = im::HashSet::new();
        for ((e, a, v), mut group) in groups {
            group.sort_by_key(|d| d.tx);
            if let Some(latest) = group.last() {
                if latest.added {
                    current.insert(Arc::clone(latest));
                    current_facts.insert((e, a, v));
                }
            }
        }

        Db {
            basis_t,
            current,
            history,
            current_facts,
            next_entity_id: (max_entity + 1).max(FIRST_USER_ENTITY_ID),
            schema,
        }
    }

    // -- Queries (spec.md §4.2), each resolved via the best-suited index --

    /// All current-visible datoms for entity `e`.
    pub fn entity(&self, e: EntityId) -> Vec<Arc<Datom>> {
        self.current.datoms_for_entity(e)
    }

    /// Current values of `e.a`, sorted by tx descending.
    pub fn get(&self, e: EntityId, a: &Attribute) -> Vec<Value> {
        let mut datoms = self.current.datoms_for_entity_attr(e, a);
        datoms.sort_by(|x, y| y.tx.cmp(&x.tx));
        datoms.into_iter().map(|d| d.value.clone()).collect()
    }

    /// The value with the highest tx, if still asserted.
    pub fn get_one(&self, e: EntityId, a: &Attribute) -> Option<Value> {
        self.get(e, a).into_iter().next()
    }

    pub fn datoms_with_attr(&self, a: &Attribute) -> Vec<Arc<Datom>> {
        self.current.datoms_for_attr(a)
    }

    pub fn entities_with_attr(&self, a: &Attribute) -> Vec<EntityId> {
        self.current.entities_with_attr(a)
    }

    pub fn entities_with_attr_value(&self, a: &Attribute, v: &Value) -> Vec<EntityId> {
        self.current.entities_with_attr_value(a, v)
    }

    pub fn entity_with_attr_value(&self, a: &Attribute, v: &Value) -> Option<EntityId> {
        self.entities_with_attr_value(a, v).into_iter().next()
    }

    pub fn referencing_entities(&self, t: EntityId) -> Vec<EntityId> {
        self.current.entities_referencing(t)
    }

    pub fn referencing_via_attr(&self, t: EntityId, a: &Attribute) -> Vec<EntityId> {
        self.current.entities_referencing_via_attr(t, a)
    }

    pub fn datoms_referencing(&self, t: EntityId) -> Vec<Arc<Datom>> {
        self.current.datoms_referencing(t)
    }

    pub fn contains_fact(&self, e: EntityId, a: &Attribute, v: &Value) -> bool {
        self.current_facts.contains(&(e, a.clone(), v.clone()))
    }

    /// Every currently-visible datom, in EAVT order — used by the
    /// persistence layer to materialize a snapshot's `currentFacts` array.
    pub fn current_datoms(&self) -> Vec<Arc<Datom>> {
        self.current.all()
    }

    pub fn next_entity_id(&self) -> i64 {
        self.next_entity_id
    }

    /// Returns the next id and a Db with the counter advanced. Allocation
    /// does not write datoms.
    pub fn alloc_entity_id(&self) -> (EntityId, Db) {
        let mut db = self.clone();
        let id = EntityId(db.next_entity_id);
        db.next_entity_id += 1;
        (id, db)
    }

    pub fn alloc_entity_ids(&self, n: usize) -> (Vec<EntityId>, Db) {
        let mut db = self.clone();
        let base = db.next_entity_id;
        let ids = (0..n as i64).map(|i| EntityId(base + i)).collect();
        db.next_entity_id += n as i64;
        (ids, db)
    }

    pub fn with_schema(&self, schema: Schema) -> Db {
        let mut db = self.clone();
        db.schema = Some(Arc::new(schema));
        db
    }

    pub fn without_schema(&self) -> Db {
        let mut db = self.clone();
        db.schema = None;
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::attribute;

    #[test]
    fn alloc_entity_id_advances_without_mutating_self() {
        let db = Db::new();
        let (id, db2) = db.alloc_entity_id();
        assert_eq!(FIRST_USER_ENTITY_ID, id.0);
        assert_eq!(FIRST_USER_ENTITY_ID, db.next_entity_id());
        assert_eq!(FIRST_USER_ENTITY_ID + 1, db2.next_entity_id());
    }

    #[test]
    fn get_one_returns_highest_tx_value() {
        let mut db = Db::new();
        let a = attribute(":p/age");
        let d1 = Arc::new(Datom::assert(EntityId(1), a.clone(), 30i64, TxId(1)));
        db.current.insert(Arc::clone(&d1));
        db.current_facts
            .insert((EntityId(1), a.clone(), Value::Int(30)));
        assert_eq!(Some(Value::Int(30)), db.get_one(EntityId(1), &a));
    }

    #[test]
    fn rebuild_from_datoms_drops_retracted_triples() {
        let a = attribute(":p/name");
        let datoms = vec![
            Arc::new(Datom::assert(EntityId(1), a.clone(), "Alice", TxId(1))),
            Arc::new(Datom::retract(EntityId(1), a.clone(), "Alice", TxId(2))),
        ];
        let db = Db::rebuild_from_datoms(datoms, TxId(2), None);
        assert!(db.entity(EntityId(1)).is_empty());
        assert!(!db.contains_fact(EntityId(1), &a, &Value::str("Alice")));
    }

    #[test]
    fn rebuild_from_datoms_keeps_latest_assertion_visible() {
        let a = attribute(":p/age");
        let datoms = vec![
            Arc::new(Datom::assert(EntityId(1), a.clone(), 30i64, TxId(1))),
            Arc::new(Datom::retract(EntityId(1), a.clone(), 30i64, TxId(2))),
            Arc::new(Datom::assert(EntityId(1), a.clone(), 31i64, TxId(2))),
        ];
        let db = Db::rebuild_from_datoms(datoms, TxId(2), None);
        assert_eq!(Some(Value::Int(31)), db.get_one(EntityId(1), &a));
    }
}
