//! Hierarchical entity projection (spec.md §4.6): a declarative pattern
//! language over `attr`, `wildcard`, `nested`, `reverse`, `limited` and
//! `withDefault`, bounded by max-depth and cycle detection.

use std::collections::{BTreeMap, HashSet};

use crate::db::Db;
use crate::ids::{Attribute, EntityId};
use crate::value::Value;

/// One element of a pull request (spec.md §4.6, §6 "Pull-pattern surface").
#[derive(Debug, Clone)]
pub enum PullPattern {
    Attr(Attribute),
    Wildcard,
    Nested(Attribute, Vec<PullPattern>),
    Reverse(Attribute, Vec<PullPattern>),
    Limited(Attribute, usize),
    WithDefault(Attribute, String),
}

impl PullPattern {
    pub fn attr(a: impl Into<Attribute>) -> Self {
        PullPattern::Attr(a.into())
    }

    pub fn wildcard() -> Self {
        PullPattern::Wildcard
    }

    pub fn nested(a: impl Into<Attribute>, sub: Vec<PullPattern>) -> Self {
        PullPattern::Nested(a.into(), sub)
    }

    pub fn reverse(a: impl Into<Attribute>, sub: Vec<PullPattern>) -> Self {
        PullPattern::Reverse(a.into(), sub)
    }

    pub fn limited(a: impl Into<Attribute>, n: usize) -> Self {
        PullPattern::Limited(a.into(), n)
    }

    pub fn with_default(a: impl Into<Attribute>, default: impl Into<String>) -> Self {
        PullPattern::WithDefault(a.into(), default.into())
    }
}

/// One projected value in a pull result (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum PullValue {
    Scalar(Value),
    Ref(EntityId),
    Entity(BTreeMap<Attribute, PullValue>),
    Many(Vec<PullValue>),
}

#[derive(Debug, Clone, Copy)]
pub struct PullConfig {
    pub max_depth: usize,
    pub include_id: bool,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            include_id: false,
        }
    }
}

pub struct Pull<'a> {
    db: &'a Db,
    config: PullConfig,
}

impl<'a> Pull<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self {
            db,
            config: PullConfig::default(),
        }
    }

    pub fn with_config(db: &'a Db, config: PullConfig) -> Self {
        Self { db, config }
    }

    /// Projects `e` through `patterns`, producing `attribute -> PullValue`.
    pub fn execute(&self, e: EntityId, patterns: &[PullPattern]) -> BTreeMap<Attribute, PullValue> {
        let mut visited = HashSet::new();
        self.pull_entity(e, patterns, &mut visited, 0)
    }

    fn pull_entity(
        &self,
        e: EntityId,
        patterns: &[PullPattern],
        visited: &mut HashSet<EntityId>,
        depth: usize,
    ) -> BTreeMap<Attribute, PullValue> {
        let mut result = BTreeMap::new();
        if self.config.include_id {
            result.insert(crate::ids::attribute(":db/id"), PullValue::Ref(e));
        }

        // Wildcard outputs are defaults: explicit patterns below override
        // them for the same attribute (spec.md §4.6 "pattern conflict rule").
        for pattern in patterns {
            if matches!(pattern, PullPattern::Wildcard) {
                for a in self.current_attrs(e) {
                    let value = self.values_as_pull(e, &a, None);
                    result.insert(a, value);
                }
            }
        }

        for pattern in patterns {
            match pattern {
                PullPattern::Wildcard => {}
                PullPattern::Attr(a) => {
                    result.insert(a.clone(), self.values_as_pull(e, a, None));
                }
                PullPattern::Limited(a, n) => {
                    result.insert(a.clone(), self.values_as_pull(e, a, Some(*n)));
                }
                PullPattern::WithDefault(a, default) => {
                    let value = self.db.get(e, a);
                    if value.is_empty() {
                        result.insert(a.clone(), PullValue::Scalar(Value::str(default.clone())));
                    } else {
                        result.insert(a.clone(), self.values_as_pull(e, a, None));
                    }
                }
                PullPattern::Nested(a, sub) => {
                    let refs: Vec<EntityId> = self
                        .db
                        .get(e, a)
                        .into_iter()
                        .filter_map(|v| v.as_ref_entity())
                        .collect();
                    if !refs.is_empty() {
                        let value = self.pull_refs(&refs, sub, visited, depth);
                        result.insert(a.clone(), value);
                    }
                }
                PullPattern::Reverse(a, sub) => {
                    let refs = self.db.referencing_via_attr(e, a);
                    if !refs.is_empty() {
                        let value = self.pull_refs(&refs, sub, visited, depth);
                        result.insert(a.clone(), value);
                    }
                }
            }
        }

        result
    }

    /// Pulls each entity in `refs` through `sub`, wrapping a single result
    /// bare and more than one in `Many` (spec.md §4.6 "one or many"),
    /// degrading to a plain `Ref` on a cycle or at max depth.
    fn pull_refs(
        &self,
        refs: &[EntityId],
        sub: &[PullPattern],
        visited: &mut HashSet<EntityId>,
        depth: usize,
    ) -> PullValue {
        let mut values = Vec::with_capacity(refs.len());
        for &r in refs {
            values.push(self.pull_one_ref(r, sub, visited, depth));
        }
        if values.len() == 1 {
            values.into_iter().next().unwrap()
        } else {
            PullValue::Many(values)
        }
    }

    fn pull_one_ref(
        &self,
        r: EntityId,
        sub: &[PullPattern],
        visited: &mut HashSet<EntityId>,
        depth: usize,
    ) -> PullValue {
        if depth + 1 >= self.config.max_depth || visited.contains(&r) {
            return PullValue::Ref(r);
        }
        visited.insert(r);
        let nested = self.pull_entity(r, sub, visited, depth + 1);
        visited.remove(&r);
        PullValue::Entity(nested)
    }

    /// Scalar current attribute names for `e` — the set `wildcard` expands
    /// to (spec.md §4.6).
    fn current_attrs(&self, e: EntityId) -> Vec<Attribute> {
        let mut seen = HashSet::new();
        let mut attrs = Vec::new();
        for d in self.db.entity(e) {
            if seen.insert(d.attribute.clone()) {
                attrs.push(d.attribute.clone());
            }
        }
        attrs
    }

    /// Current values of `e.a` as a `PullValue`: a bare scalar/ref if
    /// exactly one value, `Many` otherwise; `limit` caps the value count
    /// (spec.md §4.6 `limited`).
    fn values_as_pull(&self, e: EntityId, a: &Attribute, limit: Option<usize>) -> PullValue {
        let mut values = self.db.get(e, a);
        if let Some(n) = limit {
            values.truncate(n);
        }
        let mut pulled: Vec<PullValue> = values
            .into_iter()
            .map(|v| match v.as_ref_entity() {
                Some(entity) => PullValue::Ref(entity),
                None => PullValue::Scalar(v),
            })
            .collect();
        if pulled.len() == 1 {
            pulled.remove(0)
        } else {
            PullValue::Many(pulled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::connection::Connection;
    use crate::ids::attribute;
    use crate::tx::Operation;

    fn setup() -> (Connection<MockClock>, EntityId, EntityId) {
        let mut c = Connection::with_clock(MockClock::new());
        let name = attribute(":person/name");
        let friend = attribute(":person/friend");
        c.transact(vec![
            Operation::add(1i64, name.clone(), "Alice"),
            Operation::add(2i64, name, "Bob"),
            Operation::add(1i64, friend, EntityId(2)),
        ])
        .unwrap();
        (c, EntityId(1), EntityId(2))
    }

    #[test]
    fn plain_attr_returns_bare_scalar() {
        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(alice, &[PullPattern::attr(":person/name")]);
        assert_eq!(
            Some(&PullValue::Scalar(Value::str("Alice"))),
            result.get(&attribute(":person/name"))
        );
    }

    #[test]
    fn nested_pattern_recurses_into_referenced_entity() {
        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(
            alice,
            &[PullPattern::nested(
                ":person/friend",
                vec![PullPattern::attr(":person/name")],
            )],
        );
        let PullValue::Entity(friend) = result.get(&attribute(":person/friend")).unwrap() else {
            panic!("expected nested entity");
        };
        assert_eq!(
            Some(&PullValue::Scalar(Value::str("Bob"))),
            friend.get(&attribute(":person/name"))
        );
    }

    #[test]
    fn reverse_pattern_finds_inbound_references() {
        let (c, _alice, bob) = setup();
        let result = Pull::new(c.db()).execute(
            bob,
            &[PullPattern::reverse(
                ":person/friend",
                vec![PullPattern::attr(":person/name")],
            )],
        );
        let PullValue::Entity(referrer) = result.get(&attribute(":person/friend")).unwrap() else {
            panic!("expected reverse entity");
        };
        assert_eq!(
            Some(&PullValue::Scalar(Value::str("Alice"))),
            referrer.get(&attribute(":person/name"))
        );
    }

    #[test]
    fn cyclic_reference_degrades_to_plain_ref() {
        let mut c = Connection::with_clock(MockClock::new());
        let friend = attribute(":person/friend");
        c.transact(vec![
            Operation::add(1i64, friend.clone(), EntityId(2)),
            Operation::add(2i64, friend.clone(), EntityId(1)),
        ])
        .unwrap();

        let result = Pull::new(c.db()).execute(
            EntityId(1),
            &[PullPattern::nested(":person/friend", vec![PullPattern::nested(
                ":person/friend",
                vec![PullPattern::nested(":person/friend", vec![])],
            )])],
        );

        // Three levels deep the cycle degrades to a ref rather than looping.
        let PullValue::Entity(level1) = result.get(&friend).unwrap() else { panic!() };
        let PullValue::Entity(level2) = level1.get(&friend).unwrap() else { panic!() };
        assert_eq!(Some(&PullValue::Ref(EntityId(2))), level2.get(&friend));
    }

    #[test]
    fn max_depth_degrades_to_ref_without_panicking() {
        let (c, alice, bob) = setup();
        let config = PullConfig { max_depth: 1, include_id: false };
        let result = Pull::with_config(c.db(), config).execute(
            alice,
            &[PullPattern::nested(
                ":person/friend",
                vec![PullPattern::attr(":person/name")],
            )],
        );
        assert_eq!(
            Some(&PullValue::Ref(bob)),
            result.get(&attribute(":person/friend"))
        );
    }

    #[test]
    fn with_default_falls_back_when_attribute_missing() {
        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(
            alice,
            &[PullPattern::with_default(":person/nickname", "anonymous")],
        );
        assert_eq!(
            Some(&PullValue::Scalar(Value::str("anonymous"))),
            result.get(&attribute(":person/nickname"))
        );
    }

    #[test]
    fn explicit_pattern_overrides_wildcard_for_same_attribute() {
        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(
            alice,
            &[PullPattern::wildcard(), PullPattern::limited(":person/name", 0)],
        );
        assert_eq!(
            Some(&PullValue::Many(vec![])),
            result.get(&attribute(":person/name"))
        );
    }

    #[test]
    fn wildcard_pulls_every_current_attribute() {
        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(alice, &[PullPattern::wildcard()]);
        assert!(result.contains_key(&attribute(":person/name")));
        assert!(result.contains_key(&attribute(":person/friend")));
    }

    #[test]
    fn include_id_adds_db_id_key() {
        let (c, alice, _bob) = setup();
        let config = PullConfig { max_depth: 10, include_id: true };
        let result = Pull::with_config(c.db(), config).execute(alice, &[]);
        assert_eq!(Some(&PullValue::Ref(alice)), result.get(&attribute(":db/id")));
    }

    /// Shape assertion over a pull result's key set — the kind of
    /// structurally richer check `googletest`'s matchers are reached for in
    /// this crate, rather than a chain of `contains_key` calls.
    #[test]
    fn wildcard_result_keys_are_exactly_the_entitys_current_attributes() {
        use googletest::prelude::*;

        let (c, alice, _bob) = setup();
        let result = Pull::new(c.db()).execute(alice, &[PullPattern::wildcard()]);
        let keys: Vec<&Attribute> = result.keys().collect();
        assert_that!(
            keys,
            unordered_elements_are![eq(&attribute(":person/name")), eq(&attribute(":person/friend"))]
        );
    }
}
