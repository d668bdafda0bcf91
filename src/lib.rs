//! An embedded, fact-oriented database engine: immutable datoms over four
//! ordered indexes, a validating transactor, time travel, and a Pull-style
//! declarative reader, with an optional journal-backed persistence layer.
//!
//! See the module docs for each layer's role:
//! - [`value`] / [`ids`] — the scalar value and identifier types a datom is built from
//! - [`datom`] / [`index`] — the immutable fact and its four index orderings
//! - [`db`] — the queryable snapshot those indexes compose into
//! - [`schema`] — attribute definitions and the validation they drive
//! - [`tx`] / [`transactor`] — the declarative operation language and the pipeline that applies it
//! - [`connection`] — the transaction log a `Db` needs for time travel
//! - [`pull`] — the declarative, pattern-driven entity reader
//! - [`persistence`] — durable journal + snapshot storage on top of `connection`
//! - [`clock`] / [`error`] — the ambient clock and error taxonomy shared by the above

pub mod clock;
pub mod connection;
pub mod datom;
pub mod db;
pub mod error;
pub mod ids;
pub mod index;
pub mod persistence;
pub mod pull;
pub mod schema;
pub mod transactor;
pub mod tx;
pub mod value;

#[cfg(test)]
mod tests {
    use crate::clock::MockClock;
    use crate::connection::Connection;
    use crate::db::Db;
    use crate::ids::{attribute, EntityId};
    use crate::pull::{Pull, PullPattern, PullValue};
    use crate::schema::attribute::{AttributeSchema, ValueType};
    use crate::schema::Schema;
    use crate::tx::{EntityRef, Operation, Transaction};
    use crate::value::Value;

    fn schema() -> Schema {
        Schema::new(true)
            .with_attribute(
                AttributeSchema::new(":person/name", ValueType::Str).unique_identity(),
            )
            .with_attribute(AttributeSchema::new(":person/age", ValueType::Int))
            .with_attribute(AttributeSchema::new(":person/friend", ValueType::Ref).many())
    }

    /// Exercises the full pipeline end to end: schema-validated transact,
    /// temp-id resolution across a ref-typed attribute, time travel, and
    /// Pull — the same shape as the scenario walkthroughs in spec.md §9.
    #[test]
    fn transact_time_travel_and_pull_compose() {
        let db = Db::with_builtin_schema().with_schema(schema());
        let mut conn = Connection::with_db(db, MockClock::new());

        let name = attribute(":person/name");
        let age = attribute(":person/age");
        let friend = attribute(":person/friend");

        let report = conn
            .transact(
                Transaction::new()
                    .with(Operation::add(-1i64, name.clone(), "Alice"))
                    .with(Operation::add(-1i64, age.clone(), 30i64))
                    .with(Operation::add(-2i64, name.clone(), "Bob"))
                    .with(Operation::add(-1i64, friend.clone(), Value::Ref(EntityId(-2))))
                    .operations,
            )
            .unwrap();

        let alice = *report.temp_ids.get(&EntityId(-1)).unwrap();
        assert_eq!(Some(Value::Int(30)), conn.db().get_one(alice, &age));

        conn.transact(vec![
            Operation::retract(alice, age.clone(), 30i64),
            Operation::add(alice, age.clone(), 31i64),
        ])
        .unwrap();
        assert_eq!(Some(Value::Int(31)), conn.db().get_one(alice, &age));
        assert_eq!(
            Some(Value::Int(30)),
            conn.as_of(report.tx_id).get_one(alice, &age)
        );

        let pulled = Pull::new(conn.db()).execute(
            alice,
            &[
                PullPattern::attr(name.clone()),
                PullPattern::nested(friend.clone(), vec![PullPattern::attr(name.clone())]),
            ],
        );
        match pulled.get(&friend) {
            Some(PullValue::Entity(attrs)) => {
                assert_eq!(Some(&PullValue::Scalar(Value::str("Bob"))), attrs.get(&name));
            }
            other => panic!("expected a nested entity, got {other:?}"),
        }
    }

    #[test]
    fn retract_entity_by_lookup_cascades_components() {
        let schema = Schema::new(true)
            .with_attribute(
                AttributeSchema::new(":order/id", ValueType::Str).unique_identity(),
            )
            .with_attribute(
                AttributeSchema::new(":order/line", ValueType::Ref).many().component(),
            );
        let db = Db::with_builtin_schema().with_schema(schema);
        let mut conn = Connection::with_db(db, MockClock::new());

        let order_id = attribute(":order/id");
        let line = attribute(":order/line");

        let report = conn
            .transact(vec![
                Operation::add(-1i64, order_id.clone(), "ORD-1"),
                Operation::add(-1i64, line.clone(), Value::Ref(EntityId(-2))),
            ])
            .unwrap();
        let order = *report.temp_ids.get(&EntityId(-1)).unwrap();
        let line_item = *report.temp_ids.get(&EntityId(-2)).unwrap();

        conn.transact(vec![Operation::retract_entity(EntityRef::lookup(
            order_id.clone(),
            "ORD-1",
        ))])
        .unwrap();

        assert!(conn.db().entity(order).is_empty());
        assert!(conn.db().entity(line_item).is_empty());
    }
}
