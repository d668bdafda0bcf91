//! Durable journal + snapshot persistence (spec.md §4.7, §6).
//!
//! A [`PersistentConnection`] pairs an in-memory [`Connection`] with an
//! append-only journal file (one JSON line per transaction) and a periodic
//! full snapshot. Recovery replays the journal tail on top of the last
//! snapshot; compaction folds the journal into a fresh snapshot and
//! truncates it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Instant, SystemClock};
use crate::connection::{Connection, LogEntry};
use crate::datom::Datom;
use crate::db::Db;
use crate::error::{Error, PersistenceError, Result};
use crate::ids::TxId;
use crate::transactor::TxReport;
use crate::tx::Operation;

type PResult<T> = std::result::Result<T, PersistenceError>;

/// Wire form of one journal line (spec.md §6): `{"txId":N,"instant":N,"datoms":[...]}`.
#[derive(Serialize, Deserialize)]
struct LogEntryWire {
    #[serde(rename = "txId")]
    tx_id: u64,
    instant: i64,
    datoms: Vec<Datom>,
}

impl From<&LogEntry> for LogEntryWire {
    fn from(entry: &LogEntry) -> Self {
        LogEntryWire {
            tx_id: entry.tx_id.0,
            instant: entry.instant.0,
            datoms: entry.datoms.iter().map(|d| (**d).clone()).collect(),
        }
    }
}

impl From<LogEntryWire> for LogEntry {
    fn from(wire: LogEntryWire) -> Self {
        LogEntry {
            tx_id: TxId(wire.tx_id),
            instant: Instant(wire.instant),
            datoms: wire.datoms.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Wire form of `<journal>.snapshot.json` (spec.md §6): `{"basisT":N,
/// "nextEntityId":N,"currentFacts":[...],"txLog":[...]}`.
#[derive(Serialize, Deserialize)]
struct SnapshotWire {
    #[serde(rename = "basisT")]
    basis_t: u64,
    #[serde(rename = "nextEntityId")]
    next_entity_id: i64,
    #[serde(rename = "currentFacts")]
    current_facts: Vec<Datom>,
    #[serde(rename = "txLog")]
    tx_log: Vec<LogEntryWire>,
}

fn snapshot_path(journal_path: &Path) -> PathBuf {
    let mut os = journal_path.as_os_str().to_owned();
    os.push(".snapshot.json");
    PathBuf::from(os)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

fn open_append(path: &Path) -> PResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(PersistenceError::from)
}

/// Reads every well-formed line of the journal at `path`. A line that fails
/// to parse is skipped with a `tracing::warn!` rather than aborting
/// recovery (spec.md §4.7 "malformed journal lines: skipped with a
/// warning").
fn read_journal(path: &Path) -> PResult<Vec<LogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntryWire>(&line) {
            Ok(wire) => entries.push(LogEntry::from(wire)),
            Err(err) => {
                tracing::warn!(path = %path.display(), line = lineno + 1, error = %err, "skipping malformed journal line");
            }
        }
    }
    Ok(entries)
}

fn append_journal_line(handle: &mut File, entry: &LogEntry) -> PResult<()> {
    let wire = LogEntryWire::from(entry);
    let line = serde_json::to_string(&wire)?;
    writeln!(handle, "{line}")?;
    handle.flush()?;
    Ok(())
}

fn read_snapshot(path: &Path) -> PResult<Option<SnapshotWire>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    let wire: SnapshotWire = serde_json::from_str(&data)?;
    Ok(Some(wire))
}

fn write_snapshot_atomic(path: &Path, wire: &SnapshotWire) -> PResult<()> {
    let tmp = tmp_path(path);
    let data = serde_json::to_string(wire)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// A [`Connection`] backed by a journal file and periodic snapshots. Every
/// `transact` that returns successfully has had its line flushed before the
/// call returns (spec.md §5: "a transaction is considered committed only
/// after its journal line is flushed").
pub struct PersistentConnection<C: Clock = SystemClock> {
    connection: Connection<C>,
    journal_path: PathBuf,
    handle: File,
}

impl PersistentConnection<SystemClock> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(path, SystemClock::new())
    }
}

impl<C: Clock> PersistentConnection<C> {
    /// Opens (or creates) the journal at `path`, replaying the last snapshot
    /// (if any) and the journal tail on top of it (spec.md §4.7 recovery).
    pub fn open_with_clock(path: impl AsRef<Path>, clock: C) -> Result<Self> {
        Self::recover(path.as_ref(), clock).map_err(Error::from)
    }

    fn recover(journal_path: &Path, clock: C) -> PResult<Self> {
        let snap_path = snapshot_path(journal_path);
        let snapshot = read_snapshot(&snap_path)?;

        let mut log = Vec::new();
        let mut snapshot_basis = TxId::GENESIS;
        let mut recorded_next_entity_id = crate::db::FIRST_USER_ENTITY_ID;

        if let Some(snapshot) = snapshot {
            snapshot_basis = TxId(snapshot.basis_t);
            recorded_next_entity_id = snapshot.next_entity_id;
            log.extend(snapshot.tx_log.into_iter().map(LogEntry::from));
        }

        for entry in read_journal(journal_path)? {
            if entry.tx_id > snapshot_basis {
                log.push(entry);
            }
        }

        let basis_t = log.iter().map(|e| e.tx_id).max().unwrap_or(TxId::GENESIS);
        let all_datoms: Vec<Arc<Datom>> = log.iter().flat_map(|e| e.datoms.iter().cloned()).collect();
        let mut db = Db::rebuild_from_datoms(all_datoms, basis_t, None);
        if db.next_entity_id < recorded_next_entity_id {
            db.next_entity_id = recorded_next_entity_id;
        }

        let handle = open_append(journal_path)?;

        let mut connection = Connection::with_clock(clock);
        connection.restore(log, db);

        Ok(Self {
            connection,
            journal_path: journal_path.to_path_buf(),
            handle,
        })
    }

    pub fn db(&self) -> &Db {
        self.connection.db()
    }

    pub fn as_of(&self, t: TxId) -> Db {
        self.connection.as_of(t)
    }

    pub fn since(&self, t: TxId) -> Vec<Arc<Datom>> {
        self.connection.since(t)
    }

    pub fn entity_history(&self, e: crate::ids::EntityId) -> Vec<Arc<Datom>> {
        self.connection.entity_history(e)
    }

    pub fn attr_history(&self, e: crate::ids::EntityId, a: &crate::ids::Attribute) -> Vec<Arc<Datom>> {
        self.connection.attr_history(e, a)
    }

    /// Transacts `ops`, then appends the resulting entry to the journal and
    /// flushes it before returning (spec.md §4.7).
    pub fn transact(&mut self, ops: Vec<Operation>) -> Result<TxReport> {
        let report = self.connection.transact(ops)?;
        let entry = LogEntry {
            tx_id: report.tx_id,
            instant: report.instant,
            datoms: report.tx_data.clone(),
        };
        append_journal_line(&mut self.handle, &entry).map_err(Error::from)?;
        Ok(report)
    }

    /// Writes a snapshot of the current state, then truncates the journal
    /// file to the entries strictly newer than the snapshot's basis
    /// (spec.md §4.7 "Compaction").
    pub fn compact(&mut self) -> Result<()> {
        self.compact_inner().map_err(Error::from)
    }

    fn compact_inner(&mut self) -> PResult<()> {
        tracing::info!(path = %self.journal_path.display(), "starting compaction");
        self.handle.flush()?;

        let db = self.connection.db();
        let wire = SnapshotWire {
            basis_t: db.basis_t.0,
            next_entity_id: db.next_entity_id(),
            current_facts: db.current_datoms().iter().map(|d| (**d).clone()).collect(),
            tx_log: self.connection.log().iter().map(LogEntryWire::from).collect(),
        };
        write_snapshot_atomic(&snapshot_path(&self.journal_path), &wire)?;

        let tmp_journal = tmp_path(&self.journal_path);
        {
            let mut tmp = File::create(&tmp_journal)?;
            for entry in self.connection.log().iter().filter(|e| e.tx_id > db.basis_t) {
                writeln!(tmp, "{}", serde_json::to_string(&LogEntryWire::from(entry))?)?;
            }
        }
        fs::rename(&tmp_journal, &self.journal_path)?;
        self.handle = open_append(&self.journal_path)?;

        tracing::info!(path = %self.journal_path.display(), "compaction finished");
        Ok(())
    }
}
