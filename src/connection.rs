//! Layers a transaction log over a [`Db`] to provide time travel (spec.md
//! §4.4): `asOf`, `since`, entity/attribute history.

use std::sync::Arc;

use crate::clock::{Clock, Instant, SystemClock};
use crate::datom::Datom;
use crate::db::Db;
use crate::error::Result;
use crate::ids::{Attribute, EntityId, TxId};
use crate::transactor::{TxReport, Transactor};
use crate::tx::Operation;

/// One committed transaction: the datoms it produced, including the
/// `:db/txInstant` fact the transactor stamps on every transaction.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub tx_id: TxId,
    pub instant: Instant,
    pub datoms: Vec<Arc<Datom>>,
}

/// A `Db` plus the append-only log of every transaction that produced it.
/// `Connection` is the in-memory half of time travel; [`crate::persistence`]
/// adds durability on top of the same log shape.
pub struct Connection<C: Clock = SystemClock> {
    db: Db,
    log: Vec<LogEntry>,
    clock: C,
    transactor: Transactor,
}

impl Connection<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for Connection<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Connection<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            db: Db::new(),
            log: Vec::new(),
            clock,
            transactor: Transactor::new(),
        }
    }

    pub fn with_db(db: Db, clock: C) -> Self {
        Self {
            db,
            log: Vec::new(),
            clock,
            transactor: Transactor::new(),
        }
    }

    pub fn with_transactor(mut self, transactor: Transactor) -> Self {
        self.transactor = transactor;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Transacts `ops` against the current db, publishing the resulting db
    /// and appending the entry to the in-memory log on success. Leaves both
    /// the db and the log unchanged on error.
    pub fn transact(&mut self, ops: Vec<Operation>) -> Result<TxReport> {
        let instant = self.clock.now();
        let (new_db, report) = self.transactor.transact(&self.db, ops, instant)?;
        self.log.push(LogEntry {
            tx_id: report.tx_id,
            instant: report.instant,
            datoms: report.tx_data.clone(),
        });
        self.db = new_db;
        Ok(report)
    }

    /// Reconstructs a `Db` whose visibility is that of transaction `t`
    /// (spec.md §4.4): all datoms from entries with `tx_id <= t`, grouped
    /// by `(entity, attribute, value)`, keeping only groups whose latest
    /// member is an assertion.
    pub fn as_of(&self, t: TxId) -> Db {
        let datoms = self.datoms_up_to(t);
        Db::rebuild_from_datoms(datoms, t, self.db.schema.clone())
    }

    /// Every datom (assertion and retraction) from transactions strictly
    /// after `t`, in tx order.
    pub fn since(&self, t: TxId) -> Vec<Arc<Datom>> {
        self.log
            .iter()
            .filter(|entry| entry.tx_id > t)
            .flat_map(|entry| entry.datoms.iter().cloned())
            .collect()
    }

    /// Every datom ever written about entity `e`, ascending by tx.
    pub fn entity_history(&self, e: EntityId) -> Vec<Arc<Datom>> {
        let mut datoms: Vec<_> = self
            .log
            .iter()
            .flat_map(|entry| entry.datoms.iter().cloned())
            .filter(|d| d.entity == e)
            .collect();
        datoms.sort_by_key(|d| d.tx);
        datoms
    }

    /// Every datom ever written about `(e, a)`, ascending by tx.
    pub fn attr_history(&self, e: EntityId, a: &Attribute) -> Vec<Arc<Datom>> {
        let mut datoms: Vec<_> = self
            .log
            .iter()
            .flat_map(|entry| entry.datoms.iter().cloned())
            .filter(|d| d.entity == e && &d.attribute == a)
            .collect();
        datoms.sort_by_key(|d| d.tx);
        datoms
    }

    fn datoms_up_to(&self, t: TxId) -> Vec<Arc<Datom>> {
        self.log
            .iter()
            .filter(|entry| entry.tx_id <= t)
            .flat_map(|entry| entry.datoms.iter().cloned())
            .collect()
    }

    /// Rebuilds `log` from externally-sourced entries (spec.md §4.7 recovery)
    /// and replaces the current `db` with the db those entries reconstruct
    /// to. Used by [`crate::persistence`] after reading a snapshot and
    /// replaying the journal tail.
    pub(crate) fn restore(&mut self, log: Vec<LogEntry>, db: Db) {
        self.log = log;
        self.db = db;
    }
}
