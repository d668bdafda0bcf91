//! Quickcheck property suite for spec.md §8's quantified invariants
//! (P1 determinism, P2 purity, P4 monotonic tx, P8 cardinality-one,
//! P9 uniqueness, P12 pull bounds). Mirrors the teacher's
//! `tests/storage/serde.rs` arrangement: an `extern crate` integration test
//! driving hand-written `Arbitrary` generators over small, bounded inputs
//! rather than the crate's full value space, so shrinking stays useful.

extern crate factstore;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

use factstore::clock::MockClock;
use factstore::connection::Connection;
use factstore::db::Db;
use factstore::ids::{attribute, Attribute, EntityId};
use factstore::pull::{Pull, PullConfig, PullPattern, PullValue};
use factstore::schema::attribute::{AttributeSchema, ValueType};
use factstore::schema::Schema;
use factstore::transactor::Transactor;
use factstore::tx::Operation;
use factstore::value::Value;

const ATTR_NAMES: [&str; 3] = [":p/a", ":p/b", ":p/c"];

fn small_attr(n: u8) -> Attribute {
    attribute(ATTR_NAMES[(n as usize) % ATTR_NAMES.len()])
}

/// A small, bounded `Add` used to build arbitrary transactions: entity in
/// `1..=5`, one of three attributes, value in `0..=4`. Entities and values
/// are kept small and overlapping on purpose — that's what exercises
/// supersede/cardinality/uniqueness behavior instead of always hitting
/// disjoint triples.
#[derive(Debug, Clone)]
struct SmallAdd {
    entity: i64,
    attr: u8,
    value: i64,
}

impl Arbitrary for SmallAdd {
    fn arbitrary(g: &mut Gen) -> Self {
        let entity = 1 + (u8::arbitrary(g) % 5) as i64;
        let attr = u8::arbitrary(g);
        let value = (u8::arbitrary(g) % 5) as i64;
        SmallAdd { entity, attr, value }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let (entity, attr, value) = (self.entity, self.attr, self.value);
        Box::new(
            value
                .shrink()
                .filter(|v| *v >= 0)
                .map(move |value| SmallAdd { entity, attr, value }),
        )
    }
}

impl SmallAdd {
    fn op(&self) -> Operation {
        Operation::add(self.entity, small_attr(self.attr), self.value)
    }
}

#[derive(Debug, Clone)]
struct SmallAdds(Vec<SmallAdd>);

impl Arbitrary for SmallAdds {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = usize::arbitrary(g) % 8;
        SmallAdds((0..len).map(|_| SmallAdd::arbitrary(g)).collect())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().map(SmallAdds))
    }
}

/// P1 (determinism): transacting the same ops against the same db twice
/// produces dbs with identical current-fact content and identical report
/// data, every time.
#[quickcheck]
fn p1_transact_is_deterministic(adds: SmallAdds) {
    let db = Db::new();
    let transactor = Transactor::new();
    let ops_a: Vec<_> = adds.0.iter().map(SmallAdd::op).collect();
    let ops_b: Vec<_> = adds.0.iter().map(SmallAdd::op).collect();

    let (db_a, report_a) = transactor
        .transact(&db, ops_a, factstore::clock::Instant(0))
        .unwrap();
    let (db_b, report_b) = transactor
        .transact(&db, ops_b, factstore::clock::Instant(0))
        .unwrap();

    assert_eq!(db_a.current_datoms(), db_b.current_datoms());
    assert_eq!(report_a.tx_data, report_b.tx_data);
}

/// P2 (purity): `transact` never mutates its input `Db` — every entity's
/// fact set observed before the call equals what's observed after.
#[quickcheck]
fn p2_transact_does_not_mutate_input_db(adds: SmallAdds) {
    let db = Db::new();
    let transactor = Transactor::new();
    let before: Vec<_> = (1..=5).map(|e| db.entity(EntityId(e))).collect();

    let ops: Vec<_> = adds.0.iter().map(SmallAdd::op).collect();
    let _ = transactor.transact(&db, ops, factstore::clock::Instant(0));

    let after: Vec<_> = (1..=5).map(|e| db.entity(EntityId(e))).collect();
    assert_eq!(before, after);
}

/// P4 (monotonic tx): successive transactions on the same connection produce
/// strictly increasing tx ids, one higher each time.
#[quickcheck]
fn p4_tx_ids_increase_by_one_per_transaction(counts: Vec<u8>) {
    let mut conn = Connection::with_clock(MockClock::new());
    let name = attribute(":p/name");
    let mut expected = 0u64;
    for (i, n) in counts.iter().take(10).enumerate() {
        let entity = 1000 + i as i64;
        let report = conn
            .transact(vec![Operation::add(entity, name.clone(), *n as i64)])
            .unwrap();
        expected += 1;
        assert_eq!(expected, report.tx_id.0);
    }
}

/// P8 (cardinality-one): once an attribute is declared `:db.cardinality/one`,
/// every entity has at most one currently-visible value for it after any
/// sequence of single-op transactions.
#[quickcheck]
fn p8_cardinality_one_holds_after_every_transaction(adds: SmallAdds) {
    let attr = small_attr(0);
    let schema = Schema::new(false).with_attribute(AttributeSchema::new(attr.clone(), ValueType::Int));
    let mut conn = Connection::with_db(Db::new().with_schema(schema), MockClock::new());

    for add in &adds.0 {
        // One op per transaction: the spec only rejects same-attribute
        // duplicates *within* a transaction, so cross-transaction overwrite
        // must never violate cardinality.
        let op = Operation::add(add.entity, attr.clone(), add.value);
        let _ = conn.transact(vec![op]);
        assert!(conn.db().get(EntityId(add.entity), &attr).len() <= 1);
    }
}

/// P9 (uniqueness): for a `:db.unique/identity` attribute, at most one
/// entity currently asserts any given value, regardless of how many
/// (possibly conflicting) transactions were attempted.
#[quickcheck]
fn p9_uniqueness_never_has_two_current_owners(adds: SmallAdds) {
    let attr = small_attr(0);
    let schema = Schema::new(false)
        .with_attribute(AttributeSchema::new(attr.clone(), ValueType::Int).unique_identity());
    let mut conn = Connection::with_db(Db::new().with_schema(schema), MockClock::new());

    for add in &adds.0 {
        let op = Operation::add(add.entity, attr.clone(), add.value);
        let _ = conn.transact(vec![op]);
        for v in 0..5i64 {
            let owners = conn.db().entities_with_attr_value(&attr, &Value::Int(v));
            assert!(owners.len() <= 1, "value {v} has owners {owners:?}");
        }
    }
}

/// A small ref-graph generator for P12: `edges[i]` is the (possibly cyclic)
/// `:link/to` target of entity `i`, modulo the entity count, so cycles of
/// every length up to the generated size are reachable.
#[derive(Debug, Clone)]
struct RefGraph {
    edges: Vec<u8>,
}

impl Arbitrary for RefGraph {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = 1 + (usize::arbitrary(g) % 6);
        RefGraph {
            edges: (0..len).map(|_| u8::arbitrary(g)).collect(),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.edges.shrink().map(|edges| RefGraph { edges }))
    }
}

fn pull_depth(value: &PullValue) -> usize {
    match value {
        PullValue::Scalar(_) | PullValue::Ref(_) => 0,
        PullValue::Entity(children) => {
            1 + children.values().map(pull_depth).max().unwrap_or(0)
        }
        PullValue::Many(items) => items.iter().map(pull_depth).max().unwrap_or(0),
    }
}

/// P12 (pull bounds): for any ref graph (including cycles) and any
/// `maxDepth = D`, the pulled result never nests deeper than `D`, and
/// `execute` always terminates (quickcheck's own runner bounds the test, but
/// a runaway recursion here would hang or overflow the stack instead of
/// returning).
#[quickcheck]
fn p12_pull_never_exceeds_configured_max_depth(graph: RefGraph, depth: u8) {
    let link = attribute(":link/to");
    let mut conn = Connection::with_clock(MockClock::new());
    let n = graph.edges.len() as u8;
    let ops: Vec<_> = graph
        .edges
        .iter()
        .enumerate()
        .map(|(i, target)| {
            Operation::add(
                1 + i as i64,
                link.clone(),
                EntityId(1 + (*target % n.max(1)) as i64),
            )
        })
        .collect();
    conn.transact(ops).unwrap();

    let max_depth = 1 + (depth as usize % 6);
    let config = PullConfig { max_depth, include_id: false };

    fn pattern_chain(a: Attribute, depth: usize) -> Vec<PullPattern> {
        if depth == 0 {
            vec![]
        } else {
            vec![PullPattern::nested(a.clone(), pattern_chain(a, depth - 1))]
        }
    }
    let patterns = pattern_chain(link.clone(), max_depth + 3);

    let result = Pull::with_config(conn.db(), config).execute(EntityId(1), &patterns);
    let observed_depth = result
        .get(&link)
        .map(pull_depth)
        .unwrap_or(0);
    assert!(
        observed_depth <= max_depth,
        "pull nested {observed_depth} deep, configured max_depth was {max_depth}"
    );
}
