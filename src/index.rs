//! The four ordered indexes and the bundle that keeps them mutated together.
//!
//! Each index is an `im::OrdSet` — a persistent (structurally shared) sorted
//! tree — keyed by one of the four datom orderings from `datom.rs`. Sharing
//! is what makes `Db` cheap to version: `transact` builds a new `Indexes`
//! bundle by cloning the four trees (an O(1) pointer-bump per tree, not a
//! deep copy) and inserting/removing a handful of entries.

use std::collections::HashSet;
use std::sync::Arc;

use im::OrdSet;

use crate::datom::{AevtKey, AvetKey, Datom, EavtKey, VaetKey};
use crate::ids::{Attribute, EntityId, TxId};
use crate::value::Value;

/// The four built-in orderings over a set of datoms, kept mutually
/// consistent under `insert`/`remove`.
#[derive(Debug, Clone, Default)]
pub struct Indexes {
    eavt: OrdSet<EavtKey>,
    aevt: OrdSet<AevtKey>,
    avet: OrdSet<AvetKey>,
    /// Only ever holds datoms whose value is an entity reference.
    vaet: OrdSet<VaetKey>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.eavt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eavt.is_empty()
    }

    /// Every datom in the bundle, in EAVT order.
    pub fn all(&self) -> Vec<Arc<Datom>> {
        self.eavt.iter().map(|key| Arc::clone(&key.0)).collect()
    }

    /// Inserts `datom` into every applicable index. Atomic in the sense that
    /// either all four (three, for non-ref values) entries are added, or —
    /// since this only touches in-memory persistent structures — none are
    /// (there is no failure mode once we own `Arc<Datom>`).
    pub fn insert(&mut self, datom: Arc<Datom>) {
        let is_ref = datom.value.is_ref();
        self.eavt.insert(EavtKey::new(Arc::clone(&datom)));
        self.aevt.insert(AevtKey::new(Arc::clone(&datom)));
        self.avet.insert(AvetKey::new(Arc::clone(&datom)));
        if is_ref {
            self.vaet.insert(VaetKey::new(datom));
        }
    }

    /// Removes `datom` from every index it could appear in. A no-op for
    /// entries that were never present.
    pub fn remove(&mut self, datom: &Arc<Datom>) {
        self.eavt.remove(&EavtKey::new(Arc::clone(datom)));
        self.aevt.remove(&AevtKey::new(Arc::clone(datom)));
        self.avet.remove(&AvetKey::new(Arc::clone(datom)));
        if datom.value.is_ref() {
            self.vaet.remove(&VaetKey::new(Arc::clone(datom)));
        }
    }

    /// All current datoms for entity `e`, in EAVT order.
    pub fn datoms_for_entity(&self, e: EntityId) -> Vec<Arc<Datom>> {
        let lower = EavtKey::new(probe(e, min_attr(), min_value(), TxId::GENESIS));
        scan(self.eavt.range(lower..), |d| d.entity == e)
    }

    /// All current datoms for `(e, a)`.
    pub fn datoms_for_entity_attr(&self, e: EntityId, a: &Attribute) -> Vec<Arc<Datom>> {
        let lower = EavtKey::new(probe(e, Arc::clone(a), min_value(), TxId::GENESIS));
        scan(self.eavt.range(lower..), |d| d.entity == e && &d.attribute == a)
    }

    /// All current datoms for `(e, a, v)` — at most one by the crate's
    /// invariants, but returned as a vec to keep the scan helper uniform.
    pub fn datoms_for_entity_attr_value(
        &self,
        e: EntityId,
        a: &Attribute,
        v: &Value,
    ) -> Vec<Arc<Datom>> {
        self.datoms_for_entity_attr(e, a)
            .into_iter()
            .filter(|d| &d.value == v)
            .collect()
    }

    /// All current datoms for attribute `a`, in AEVT order.
    pub fn datoms_for_attr(&self, a: &Attribute) -> Vec<Arc<Datom>> {
        let lower = AevtKey::new(probe(EntityId::MIN, Arc::clone(a), min_value(), TxId::GENESIS));
        scan(self.aevt.range(lower..), |d| &d.attribute == a)
    }

    /// Deduplicated entities that currently have attribute `a`.
    pub fn entities_with_attr(&self, a: &Attribute) -> Vec<EntityId> {
        dedup_entities(self.datoms_for_attr(a).iter().map(|d| d.entity))
    }

    /// All current datoms where attribute=`a` and value=`v`, via AVET.
    pub fn datoms_for_attr_value(&self, a: &Attribute, v: &Value) -> Vec<Arc<Datom>> {
        let lower = AvetKey::new(probe(EntityId::MIN, Arc::clone(a), v.clone(), TxId::GENESIS));
        scan(self.avet.range(lower..), |d| &d.attribute == a && &d.value == v)
    }

    /// Deduplicated entities where `a` = `v`.
    pub fn entities_with_attr_value(&self, a: &Attribute, v: &Value) -> Vec<EntityId> {
        dedup_entities(self.datoms_for_attr_value(a, v).iter().map(|d| d.entity))
    }

    /// All current datoms whose value references entity `t`, via VAET.
    pub fn datoms_referencing(&self, t: EntityId) -> Vec<Arc<Datom>> {
        let target = Value::Ref(t);
        let lower = VaetKey::new(probe(EntityId::MIN, min_attr(), target.clone(), TxId::GENESIS));
        scan(self.vaet.range(lower..), |d| d.value == target)
    }

    /// Deduplicated entities referencing `t`.
    pub fn entities_referencing(&self, t: EntityId) -> Vec<EntityId> {
        dedup_entities(self.datoms_referencing(t).iter().map(|d| d.entity))
    }

    /// Entities referencing `t` specifically through attribute `a`.
    pub fn entities_referencing_via_attr(&self, t: EntityId, a: &Attribute) -> Vec<EntityId> {
        let target = Value::Ref(t);
        let lower = VaetKey::new(probe(EntityId::MIN, Arc::clone(a), target.clone(), TxId::GENESIS));
        let datoms = scan(
            self.vaet.range(lower..),
            |d| d.value == target && &d.attribute == a,
        );
        dedup_entities(datoms.iter().map(|d| d.entity))
    }
}

fn dedup_entities(entities: impl Iterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for e in entities {
        if seen.insert(e) {
            result.push(e);
        }
    }
    result
}

/// Builds a sentinel datom used only to seed `OrdSet::range`'s lower bound:
/// the exact prefix we're scanning for (entity/attribute/value, as the
/// caller pins them), with every remaining key component set to the
/// smallest value that ordering allows. Ordered just at or below the first
/// real entry matching that prefix, never stored in an index itself.
fn probe(entity: EntityId, attribute: Attribute, value: Value, tx: TxId) -> Arc<Datom> {
    Arc::new(Datom {
        entity,
        attribute,
        value,
        tx,
        added: false,
    })
}

/// The smallest possible attribute — the empty string sorts before every
/// real (non-empty, see `Datom`'s deserializer) attribute name.
fn min_attr() -> Attribute {
    Arc::from("")
}

/// The smallest possible value under the total order from spec §3: the
/// lowest-ranked tag (`Int`) at its lowest value.
fn min_value() -> Value {
    Value::Int(i64::MIN)
}

/// Walks a range already seeded at the target prefix's lower bound,
/// collecting the contiguous run of entries matching `matches` and stopping
/// the instant it sees one that doesn't — since the range starts at the
/// prefix's first possible key, the first non-match is necessarily past the
/// end of the range, so there's nothing left to find past it (the early
/// termination spec §4.1 requires, without ever touching entries below the
/// lower bound).
fn scan<'a, K, F>(range: impl Iterator<Item = &'a K>, matches: F) -> Vec<Arc<Datom>>
where
    K: KeyDatom + 'a,
    F: Fn(&Datom) -> bool,
{
    let mut result = Vec::new();
    for key in range {
        let datom = key.datom();
        if matches(datom) {
            result.push(Arc::clone(datom));
        } else {
            break;
        }
    }
    result
}

trait KeyDatom {
    fn datom(&self) -> &Arc<Datom>;
}

impl KeyDatom for EavtKey {
    fn datom(&self) -> &Arc<Datom> {
        &self.0
    }
}

impl KeyDatom for AevtKey {
    fn datom(&self) -> &Arc<Datom> {
        &self.0
    }
}

impl KeyDatom for AvetKey {
    fn datom(&self) -> &Arc<Datom> {
        &self.0
    }
}

impl KeyDatom for VaetKey {
    fn datom(&self) -> &Arc<Datom> {
        &self.0
    }
}
