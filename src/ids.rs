//! Identifier newtypes shared by the datom, index and transactor layers.

/// Identifies an entity. Negative values denote a *temporary* id, used only
/// within the operation list of a single transaction and resolved to a
/// permanent positive id by the transactor before any datom is produced.
/// Zero is reserved and never assigned to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub i64);

impl EntityId {
    pub const NULL: EntityId = EntityId(0);

    /// The smallest possible `EntityId`, used as an index-scan sentinel: a
    /// probe key built with this as its entity component sorts before every
    /// real entity's entries, so `OrdSet::range` can seek straight to the
    /// start of a prefix without walking from the very first element.
    pub const MIN: EntityId = EntityId(i64::MIN);

    pub fn is_temp(self) -> bool {
        self.0 < 0
    }

    pub fn is_permanent(self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId(value)
    }
}

/// Identifies a transaction. Monotonically increasing; zero ("genesis")
/// precedes any user transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxId(pub u64);

impl TxId {
    pub const GENESIS: TxId = TxId(0);

    pub fn next(self) -> TxId {
        TxId(self.0 + 1)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxId {
    fn from(value: u64) -> Self {
        TxId(value)
    }
}

/// Entity ids below this belong to the tx-entity partition: `Datom::tx_instant`
/// stamps `:db/txInstant` on an entity derived from the tx id itself, and this
/// offset keeps that synthetic entity out of the user/schema id range handed
/// out by `Db::alloc_entity_id`.
pub const TX_PARTITION: i64 = 1 << 32;

/// An attribute name, e.g. `:person/name`. Cheaply clonable since the same
/// attribute string is shared across every datom and every index entry that
/// mentions it.
pub type Attribute = std::sync::Arc<str>;

pub fn attribute(ident: &str) -> Attribute {
    std::sync::Arc::from(ident)
}
