//! Turns a declarative operation list into a new [`Db`] (spec.md §4.3).
//!
//! Five steps, in order: tx-function expansion, retract-entity expansion,
//! temp-id resolution, schema validation, apply. The transactor never
//! mutates its input `Db` — every step either returns an expanded operation
//! list or a brand new `Db`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::clock::Instant;
use crate::datom::Datom;
use crate::db::Db;
use crate::error::{Error, Result, SchemaError};
use crate::ids::{Attribute, EntityId, TxId};
use crate::schema::attribute::{Unique, ValueType};
use crate::schema::default::DB_TX_INSTANT;
use crate::tx::{EntityRef, Operation, TxContext, TxFunctions};
use crate::value::Value;

/// Recursion bound for tx-function expansion (spec.md §4.3 step 1, default 32).
pub const DEFAULT_MAX_TX_FUNCTION_DEPTH: u32 = 32;

/// The result of a successful transaction (spec.md §4.3 step 5).
#[derive(Debug, Clone)]
pub struct TxReport {
    pub tx_id: TxId,
    pub instant: Instant,
    /// Every datom produced, in the order its originating operation appeared
    /// (spec.md §9 "operation order within a transaction").
    pub tx_data: Vec<Arc<Datom>>,
    /// Maps each temporary (negative) entity id used in the transaction to
    /// the permanent id the transactor allocated for it.
    pub temp_ids: HashMap<EntityId, EntityId>,
}

#[derive(Clone)]
pub struct Transactor {
    pub tx_functions: TxFunctions,
    pub max_tx_function_depth: u32,
}

impl Default for Transactor {
    fn default() -> Self {
        Self {
            tx_functions: TxFunctions::new(),
            max_tx_function_depth: DEFAULT_MAX_TX_FUNCTION_DEPTH,
        }
    }
}

/// An operation tagged with whether it is subject to schema validation.
/// Operations produced by expanding a `Call` or a `RetractEntity` bypass
/// validation (spec.md §4.3 step 3: "Retractions and expanded calls bypass
/// validation").
#[derive(Debug, Clone)]
struct Staged {
    op: Operation,
    validate: bool,
}

impl Transactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tx_functions(mut self, tx_functions: TxFunctions) -> Self {
        self.tx_functions = tx_functions;
        self
    }

    pub fn with_max_tx_function_depth(mut self, depth: u32) -> Self {
        self.max_tx_function_depth = depth;
        self
    }

    /// `transact(db, ops, instant) -> (db', report) | error` (spec.md §4.3).
    /// Pure with respect to `db`: on success or failure, `db` is unchanged.
    pub fn transact(&self, db: &Db, ops: Vec<Operation>, instant: Instant) -> Result<(Db, TxReport)> {
        let staged = self.expand_calls(db, ops, 0)?;
        let staged = self.expand_retract_entities(db, staged)?;
        let (staged, temp_ids, resolved_db) = resolve_temp_ids(db, staged);
        self.validate_schema(&resolved_db, &staged)?;
        self.apply(&resolved_db, staged, temp_ids, instant)
    }

    /// Step 1: recursively expands `Operation::Call(name, args)` via the
    /// registered tx-function, bounded by `max_tx_function_depth`.
    fn expand_calls(&self, db: &Db, ops: Vec<Operation>, depth: u32) -> Result<Vec<Staged>> {
        if depth > self.max_tx_function_depth {
            return Err(Error::TxFunctionDepthExceeded);
        }
        let mut staged = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                Operation::Call(name, args) => {
                    let f = self
                        .tx_functions
                        .get(&name)
                        .ok_or_else(|| Error::TxFunctionNotFound(name.clone()))?;
                    let ctx = TxContext { db };
                    let produced = f(&ctx, &args)?;
                    tracing::debug!(tx_function = %name, depth, produced = produced.len(), "expanding tx function");
                    let mut expanded = self.expand_calls(db, produced, depth + 1)?;
                    for s in &mut expanded {
                        s.validate = false;
                    }
                    staged.append(&mut expanded);
                }
                other => staged.push(Staged { op: other, validate: true }),
            }
        }
        Ok(staged)
    }

    /// Step 2: expands each `RetractEntity(ref)` into concrete `Retract`
    /// operations, cascading through component references and pulling
    /// inbound references (spec.md §4.3 step 2). `visited` and `dedup` are
    /// shared across every `RetractEntity` op in the transaction, not just
    /// within one op's cascade — two retractions whose cascades overlap must
    /// still produce each `(entity, attribute, value)` retraction only once.
    fn expand_retract_entities(&self, db: &Db, ops: Vec<Staged>) -> Result<Vec<Staged>> {
        let mut staged = Vec::with_capacity(ops.len());
        let mut visited = HashSet::new();
        let mut dedup = HashSet::new();
        for s in ops {
            match s.op {
                Operation::RetractEntity(r) => {
                    let target = resolve_ref(db, &r)?;
                    let mut retractions = Vec::new();
                    collect_cascade(db, target, &mut visited, &mut dedup, &mut retractions);
                    for (e, a, v) in retractions {
                        staged.push(Staged {
                            op: Operation::Retract(e, a, v),
                            validate: false,
                        });
                    }
                }
                other => staged.push(Staged { op: other, validate: s.validate }),
            }
        }
        Ok(staged)
    }

    /// Step 3: schema validation. Only ops still marked `validate` (direct
    /// user `Add`s, neither call- nor retract-entity-expanded) are checked.
    fn validate_schema(&self, db: &Db, ops: &[Staged]) -> Result<()> {
        let Some(schema) = db.schema.clone() else {
            return Ok(());
        };

        let mut cardinality_counts: HashMap<(EntityId, Attribute), u32> = HashMap::new();
        let mut claimed: HashMap<(Attribute, Value), EntityId> = HashMap::new();

        for s in ops {
            let Operation::Add(e, a, v) = &s.op else { continue };
            if !s.validate {
                continue;
            }

            let Some(attr_schema) = schema.get(a) else {
                if schema.strict {
                    return Err(SchemaError::UndefinedAttribute(a.clone()).into());
                }
                continue;
            };

            let actual = ValueType::of(v);
            if actual != attr_schema.value_type {
                return Err(SchemaError::TypeMismatch {
                    attr: a.clone(),
                    expected: attr_schema.value_type,
                    actual,
                }
                .into());
            }

            if attr_schema.cardinality == crate::schema::attribute::Cardinality::One {
                let count = cardinality_counts.entry((*e, a.clone())).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(SchemaError::CardinalityViolation(*e, a.clone()).into());
                }
            }

            if attr_schema.unique != Unique::None {
                let existing = db
                    .entities_with_attr_value(a, v)
                    .into_iter()
                    .next()
                    .or_else(|| claimed.get(&(a.clone(), v.clone())).copied());
                if let Some(existing) = existing {
                    if existing != *e {
                        return Err(SchemaError::UniquenessViolation {
                            attr: a.clone(),
                            value: v.clone(),
                            existing,
                            new: *e,
                        }
                        .into());
                    }
                }
                claimed.insert((a.clone(), v.clone()), *e);
            }
        }
        Ok(())
    }

    /// Step 4-5: applies the fully expanded, validated operation list to a
    /// fresh copy of `db`'s indexes, producing the new `Db` and its report.
    fn apply(
        &self,
        db: &Db,
        ops: Vec<Staged>,
        temp_ids: HashMap<EntityId, EntityId>,
        instant: Instant,
    ) -> Result<(Db, TxReport)> {
        let new_tx = db.basis_t.next();
        let mut next = db.clone();
        let mut tx_data = Vec::with_capacity(ops.len() + 1);

        for s in ops {
            match s.op {
                Operation::Add(e, a, v) => {
                    let new_datom = Arc::new(Datom::assert(e, a.clone(), v.clone(), new_tx));
                    if let Some(old) = find_current(&next, e, &a, &v) {
                        next.current.remove(&old);
                    }
                    next.current.insert(Arc::clone(&new_datom));
                    next.history.insert(Arc::clone(&new_datom));
                    next.current_facts.insert((e, a, v));
                    tx_data.push(new_datom);
                }
                Operation::Retract(e, a, v) => {
                    if !next.contains_fact(e, &a, &v) {
                        return Err(Error::FactNotFound(e, a, v));
                    }
                    let new_datom = Arc::new(Datom::retract(e, a.clone(), v.clone(), new_tx));
                    if let Some(old) = find_current(&next, e, &a, &v) {
                        next.current.remove(&old);
                    }
                    next.history.insert(Arc::clone(&new_datom));
                    next.current_facts.remove(&(e, a, v));
                    tx_data.push(new_datom);
                }
                Operation::RetractEntity(_) | Operation::Call(_, _) => unreachable!(
                    "RetractEntity/Call operations are fully expanded before apply"
                ),
            }
        }

        let tx_instant = Arc::new(Datom::tx_instant(
            new_tx,
            crate::ids::attribute(DB_TX_INSTANT),
            instant,
        ));
        next.current.insert(Arc::clone(&tx_instant));
        next.history.insert(Arc::clone(&tx_instant));
        tx_data.push(tx_instant);

        next.basis_t = new_tx;

        let report = TxReport {
            tx_id: new_tx,
            instant,
            tx_data,
            temp_ids,
        };
        Ok((next, report))
    }
}

/// Finds the single currently-visible datom for `(e, a, v)`, if any — used
/// to locate the exact `Arc<Datom>` to remove from the current indexes when
/// a triple is superseded or retracted.
fn find_current(db: &Db, e: EntityId, a: &Attribute, v: &Value) -> Option<Arc<Datom>> {
    db.current
        .datoms_for_entity_attr_value(e, a, v)
        .into_iter()
        .next()
}

/// Resolves an `EntityRef` against `db` (spec.md §6 `ref ::= id(e) |
/// lookup(a, v)`). Fails if the attribute is not a unique attribute in the
/// current schema, or if the lookup does not resolve to exactly one entity.
fn resolve_ref(db: &Db, r: &EntityRef) -> Result<EntityId> {
    match r {
        EntityRef::Id(e) => Ok(*e),
        EntityRef::Lookup(a, v) => {
            let unique = db
                .schema
                .as_ref()
                .and_then(|s| s.get(a))
                .map(|attr_schema| attr_schema.unique != Unique::None)
                .unwrap_or(false);
            if !unique {
                return Err(Error::LookupAttrNotUnique(a.clone()));
            }
            let mut entities = db.entities_with_attr_value(a, v);
            match entities.len() {
                0 => Err(Error::LookupNotFound(a.clone(), v.clone())),
                1 => Ok(entities.remove(0)),
                _ => Err(Error::LookupAmbiguous(a.clone(), v.clone())),
            }
        }
    }
}

/// Recursively collects every datom that must be retracted to remove
/// `target` and its component descendants: the entity's own current datoms
/// (cascading into component-flagged ref values), plus every current datom
/// that references `target` inbound. `visited` guards against cycles in the
/// component graph; `dedup` suppresses duplicate retractions across
/// multiple `RetractEntity` operations in the same transaction.
fn collect_cascade(
    db: &Db,
    target: EntityId,
    visited: &mut HashSet<EntityId>,
    dedup: &mut HashSet<(EntityId, Attribute, Value)>,
    out: &mut Vec<(EntityId, Attribute, Value)>,
) {
    if !visited.insert(target) {
        return;
    }

    for d in db.entity(target) {
        let key = (d.entity, d.attribute.clone(), d.value.clone());
        if dedup.insert(key.clone()) {
            out.push(key);
        }
        if let Value::Ref(child) = &d.value {
            let child = *child;
            let is_component = db
                .schema
                .as_ref()
                .and_then(|s| s.get(&d.attribute))
                .map(|attr_schema| attr_schema.component)
                .unwrap_or(false);
            if is_component {
                collect_cascade(db, child, visited, dedup, out);
            }
        }
    }

    for d in db.datoms_referencing(target) {
        let key = (d.entity, d.attribute.clone(), d.value.clone());
        if dedup.insert(key.clone()) {
            out.push(key);
        }
    }
}

/// Substitutes every temporary (negative) entity id appearing as an
/// operation's subject or as a ref-typed value with a permanent id,
/// allocated in first-seen order from `db`'s counter. Returns the resolved
/// operations, the temp-id -> permanent-id map for the report, and a `Db`
/// whose `next_entity_id` reflects the allocation (everything else about it
/// is otherwise identical to `db`).
fn resolve_temp_ids(db: &Db, ops: Vec<Staged>) -> (Vec<Staged>, HashMap<EntityId, EntityId>, Db) {
    fn resolve(id: EntityId, next: &mut Db, map: &mut HashMap<EntityId, EntityId>) -> EntityId {
        if id.is_permanent() || id == EntityId::NULL {
            return id;
        }
        *map.entry(id).or_insert_with(|| {
            let fresh = EntityId(next.next_entity_id);
            next.next_entity_id += 1;
            fresh
        })
    }

    let mut map: HashMap<EntityId, EntityId> = HashMap::new();
    let mut next = db.clone();
    let mut resolved = Vec::with_capacity(ops.len());

    for s in ops {
        let op = match s.op {
            Operation::Add(e, a, v) => {
                let e = resolve(e, &mut next, &mut map);
                let v = match v {
                    Value::Ref(r) => Value::Ref(resolve(r, &mut next, &mut map)),
                    other => other,
                };
                Operation::Add(e, a, v)
            }
            Operation::Retract(e, a, v) => {
                let e = resolve(e, &mut next, &mut map);
                let v = match v {
                    Value::Ref(r) => Value::Ref(resolve(r, &mut next, &mut map)),
                    other => other,
                };
                Operation::Retract(e, a, v)
            }
            other => other,
        };
        resolved.push(Staged { op, validate: s.validate });
    }

    (resolved, map, next)
}
