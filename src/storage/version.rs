//! Multiversion chains and the per-store version manager
//!
//! Every (table, primary key) location owns a chain of versions ordered
//! newest first. Reads resolve against the chain for the reader's
//! timestamp; writes stage an uncommitted version that becomes visible
//! to others only when the writing transaction commits. Timestamp
//! ordering checks and waiting are driven from here but decided by the
//! concurrency controller.

use super::store::Store;
use super::ChainCoord;
use crate::concurrency::{ConcurrencyController, TxMeta};
use crate::error::{Error, Result};
use crate::types::value::{Row, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One version of a row. A `None` value is a deletion tombstone.
#[derive(Debug, Clone)]
pub struct Version {
    pub value: Option<Row>,
    pub writer_ts: u64,
    pub committed: bool,
    /// Eviction hint only; never consulted for correctness.
    pub created_at: Instant,
}

/// What a chain holds for a reader at a given timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Visible {
    /// No version qualifies at this timestamp.
    Nothing,
    /// The qualifying version is committed or the reader's own.
    /// `None` means the row is deleted at this timestamp.
    Row(Option<Row>),
    /// The qualifying version is uncommitted by another live writer.
    Blocked { writer_ts: u64 },
}

/// The ordered versions of one (table, primary key) location, newest
/// first, plus the highest timestamp that has read it.
///
/// Invariants: writer timestamps strictly decrease along the chain, and
/// at most one version is uncommitted (always the head).
#[derive(Debug, Default)]
pub struct VersionChain {
    versions: Vec<Version>,
    read_ts: u64,
}

impl VersionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    pub fn lift_read_ts(&mut self, ts: u64) {
        self.read_ts = self.read_ts.max(ts);
    }

    pub fn newest_committed(&self) -> Option<&Version> {
        self.versions.iter().find(|v| v.committed)
    }

    pub fn uncommitted(&self) -> Option<&Version> {
        self.versions.iter().find(|v| !v.committed)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// True if some version on the chain was written at `ts`.
    pub fn has_writer(&self, ts: u64) -> bool {
        self.versions.iter().any(|v| v.writer_ts == ts)
    }

    /// Resolve the chain for a reader: the newest version with
    /// `writer_ts <= ts`, blocking on a foreign uncommitted one.
    pub fn visible_at(&self, ts: u64) -> Visible {
        match self.versions.iter().find(|v| v.writer_ts <= ts) {
            None => Visible::Nothing,
            Some(v) if !v.committed && v.writer_ts != ts => Visible::Blocked {
                writer_ts: v.writer_ts,
            },
            Some(v) => Visible::Row(v.value.clone()),
        }
    }

    /// Base mutator: stage a version for writer `ts`. An existing
    /// uncommitted version from the same writer is upgraded in place, so
    /// a transaction never holds more than one version per chain.
    pub fn put_version(&mut self, ts: u64, value: Option<Row>) {
        if let Some(v) = self.versions.iter_mut().find(|v| !v.committed) {
            if v.writer_ts == ts {
                v.value = value;
                return;
            }
        }
        self.versions.insert(
            0,
            Version {
                value,
                writer_ts: ts,
                committed: false,
                created_at: Instant::now(),
            },
        );
    }

    /// True if the chain head is an uncommitted version staged by `ts`
    /// with nothing newer above it.
    pub fn staged_by(&self, ts: u64) -> bool {
        self.versions
            .first()
            .map_or(false, |v| !v.committed && v.writer_ts == ts)
    }

    /// Flip the version staged by `ts` to committed. Returns the newly
    /// committed value and the previously committed one (for index
    /// maintenance), or `None` if `ts` staged nothing here.
    pub fn commit_writer(&mut self, ts: u64) -> Option<(Option<Row>, Option<Row>)> {
        let pos = self
            .versions
            .iter()
            .position(|v| !v.committed && v.writer_ts == ts)?;
        let prior = self
            .versions
            .iter()
            .skip(pos + 1)
            .find(|v| v.committed)
            .and_then(|v| v.value.clone());
        self.versions[pos].committed = true;
        Some((self.versions[pos].value.clone(), prior))
    }

    /// Base mutator: drop the uncommitted version staged by `ts`, if any.
    pub fn delete_version(&mut self, ts: u64) -> bool {
        let before = self.versions.len();
        self.versions.retain(|v| v.committed || v.writer_ts != ts);
        before != self.versions.len()
    }

    /// Drop versions no live transaction can still be required to read:
    /// committed versions older than `min_live_ts` that are shadowed by
    /// a newer committed version, and trailing tombstones nobody can
    /// observe anymore.
    pub fn gc(&mut self, min_live_ts: u64) -> usize {
        let before = self.versions.len();

        // The newest committed version at or below the horizon still
        // serves the oldest live reader; everything beneath it is
        // shadowed for every current and future timestamp.
        if let Some(cut) = self
            .versions
            .iter()
            .position(|v| v.committed && v.writer_ts <= min_live_ts)
        {
            self.versions.truncate(cut + 1);
        }

        // A committed tombstone at the head, at or below the horizon,
        // reads the same as an empty chain for everyone.
        if self
            .versions
            .first()
            .map_or(false, |v| v.committed && v.value.is_none() && v.writer_ts <= min_live_ts)
        {
            self.versions.remove(0);
        }

        before - self.versions.len()
    }
}

/// Per-store version manager: resolves reads, stages writes, commits or
/// discards staged versions, and prunes chains.
pub struct VersionManager {
    store: Arc<Store>,
}

impl VersionManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn coord(&self, table: &str, key: &Value) -> ChainCoord {
        ChainCoord::new(self.store.name(), table, key.clone())
    }

    /// MVCC read: the newest version at or below the reader's timestamp.
    /// Waits (via the controller) while that version is an uncommitted
    /// write of another live transaction, then re-reads.
    ///
    /// The chain is created on demand so the read timestamp survives for
    /// ordering checks against later inserts of the same key.
    pub fn read(
        &self,
        ctrl: &ConcurrencyController,
        tx: &TxMeta,
        table: &str,
        key: &Value,
    ) -> Result<Option<Row>> {
        let table_state = self.store.table(table)?;
        let chain = table_state.chain(key);
        self.read_chain(ctrl, tx, &chain, &self.coord(table, key))
    }

    fn read_chain(
        &self,
        ctrl: &ConcurrencyController,
        tx: &TxMeta,
        chain: &Arc<Mutex<VersionChain>>,
        coord: &ChainCoord,
    ) -> Result<Option<Row>> {
        loop {
            ctrl.check_live(tx)?;
            let blocked_ts = {
                let mut guard = chain.lock();
                match guard.visible_at(tx.ts) {
                    Visible::Blocked { writer_ts } => writer_ts,
                    Visible::Row(value) => {
                        guard.lift_read_ts(tx.ts);
                        return Ok(value);
                    }
                    Visible::Nothing => {
                        guard.lift_read_ts(tx.ts);
                        return Ok(None);
                    }
                }
            };
            // No chain lock held while parked.
            ctrl.wait_for_writer(tx, blocked_ts, coord)?;
        }
    }

    /// Stage a write (`None` deletes) as an uncommitted version after the
    /// timestamp-ordering checks. Waits on a foreign uncommitted version
    /// the same way reads do.
    pub fn write(
        &self,
        ctrl: &ConcurrencyController,
        tx: &TxMeta,
        table: &str,
        key: &Value,
        value: Option<Row>,
    ) -> Result<()> {
        let table_state = self.store.table(table)?;
        let chain = table_state.chain(key);
        let coord = self.coord(table, key);

        loop {
            ctrl.check_live(tx)?;
            let blocked_ts = {
                let mut guard = chain.lock();

                // A committed read by a younger transaction would be
                // invalidated by this write.
                if tx.ts < guard.read_ts() {
                    return Err(Error::TimestampOrder {
                        ts: tx.ts,
                        conflict_ts: guard.read_ts(),
                    });
                }
                // A younger committed write supersedes us. Thomas's rule
                // would drop the write silently; restarting keeps the
                // schedule uniform.
                if let Some(newest) = guard.newest_committed() {
                    if tx.ts < newest.writer_ts {
                        return Err(Error::TimestampOrder {
                            ts: tx.ts,
                            conflict_ts: newest.writer_ts,
                        });
                    }
                }

                match guard.uncommitted() {
                    Some(v) if v.writer_ts != tx.ts => v.writer_ts,
                    _ => {
                        guard.put_version(tx.ts, value.clone());
                        return Ok(());
                    }
                }
            };
            ctrl.wait_for_writer(tx, blocked_ts, &coord)?;
        }
    }

    /// Scan every visible row of a table at the transaction's timestamp.
    /// Returns (primary key, row) pairs; waits on blocking writers chain
    /// by chain.
    pub fn scan(
        &self,
        ctrl: &ConcurrencyController,
        tx: &TxMeta,
        table: &str,
    ) -> Result<Vec<(Value, Row)>> {
        let table_state = self.store.table(table)?;
        let mut rows = Vec::new();
        for (key, chain) in table_state.chains_snapshot() {
            let coord = self.coord(table, &key);
            if let Some(row) = self.read_chain(ctrl, tx, &chain, &coord)? {
                rows.push((key, row));
            }
        }
        Ok(rows)
    }

    /// 2PC prepare: verify every staged version of `ts` at the given
    /// coordinates still exists at its chain head, unsuperseded.
    pub fn prepare(&self, ts: u64, coords: &[&ChainCoord]) -> bool {
        for coord in coords {
            let staged = self
                .store
                .table(&coord.table)
                .ok()
                .and_then(|t| t.existing_chain(&coord.key))
                .map_or(false, |chain| chain.lock().staged_by(ts));
            if !staged {
                return false;
            }
        }
        true
    }

    /// 2PC commit step: flip the versions staged by `ts` to committed
    /// and swap the secondary index entries to the new committed rows.
    /// Only mutates in-memory state; cannot fail.
    pub fn commit(&self, ts: u64, coords: &[&ChainCoord]) {
        for coord in coords {
            let Ok(table_state) = self.store.table(&coord.table) else {
                continue;
            };
            let Some(chain) = table_state.existing_chain(&coord.key) else {
                continue;
            };
            let flipped = chain.lock().commit_writer(ts);
            if let Some((new_row, prior_row)) = flipped {
                table_state.index_swap(&coord.key, prior_row.as_ref(), new_row.as_ref());
            }
        }
    }

    /// Abort path: remove every uncommitted version staged by `ts`.
    pub fn discard(&self, ts: u64, coords: &[&ChainCoord]) {
        for coord in coords {
            if let Ok(table_state) = self.store.table(&coord.table) {
                if let Some(chain) = table_state.existing_chain(&coord.key) {
                    chain.lock().delete_version(ts);
                }
            }
        }
    }

    /// Opportunistic GC across all chains of the store.
    pub fn gc(&self, min_live_ts: u64) -> usize {
        let mut removed = 0;
        for table_state in self.store.tables() {
            for (_, chain) in table_state.chains_snapshot() {
                removed += chain.lock().gc(min_live_ts);
            }
        }
        if removed > 0 {
            debug!(store = %self.store.name(), removed, "version gc pass");
        }
        removed
    }
}
