//! Transaction coordinator
//!
//! Orchestrates the transaction lifecycle over the two participant
//! stores: begin, the data operations, two-phase commit, abort with undo
//! accounting, and the closure-based retry loop that absorbs restartable
//! aborts.
//!
//! State machine:
//!
//! ```text
//!            begin              prepare             commit-step
//!    [.] ---------> ACTIVE -----------> PREPARING -------------> COMMITTED
//!                    |  \                   |
//!              abort |   \  abort           | prepare-fail
//!                    v    v                 v
//!                  ABORTED <-------------- ABORTED
//! ```

use crate::concurrency::{CancelFlag, ConcurrencyController, TxMeta};
use crate::config::Config;
use crate::error::{AbortCause, Error, Result};
use crate::storage::{ChainCoord, Store, VersionManager};
use crate::types::schema::{Column, TableSchema};
use crate::types::value::{DataType, Row, Value};
use crate::undo::{UndoEntry, UndoLog};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use crate::concurrency::TxId;

/// The financial store identifier.
pub const FINANCIAL: &str = "financial";
/// The inventory store identifier.
pub const INVENTORY: &str = "inventory";

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Active,
    Preparing,
    Committed,
    Aborted,
}

/// Coordinator counters surfaced through [`Coordinator::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub active_count: usize,
    pub committed_count: u64,
    pub aborted_count: u64,
    pub restart_count: u64,
    pub deadlocks_detected: u64,
}

#[derive(Default)]
struct Counters {
    committed: AtomicU64,
    aborted: AtomicU64,
    restarts: AtomicU64,
}

struct Engine {
    stores: BTreeMap<String, VersionManager>,
    controller: ConcurrencyController,
    config: Config,
    counters: Counters,
    last_gc: Mutex<Instant>,
}

impl Engine {
    fn vm(&self, store: &str) -> Result<&VersionManager> {
        self.stores
            .get(store)
            .ok_or_else(|| Error::StoreNotFound(store.to_string()))
    }

    /// Opportunistic version GC, rate-limited by the configured interval.
    fn maybe_gc(&self) {
        {
            let mut last = self.last_gc.lock();
            if last.elapsed() < self.config.gc_interval {
                return;
            }
            *last = Instant::now();
        }
        let horizon = self.controller.min_live_ts().unwrap_or(u64::MAX);
        let mut removed = 0;
        for vm in self.stores.values() {
            removed += vm.gc(horizon);
        }
        if removed > 0 {
            debug!(removed, horizon, "garbage collected shadowed versions");
        }
    }
}

/// The coordinator owning both stores, the concurrency controller, and
/// the transaction lifecycle.
pub struct Coordinator {
    engine: Arc<Engine>,
}

impl Coordinator {
    /// Build a coordinator over the two system stores and install the
    /// fixed schema.
    pub fn new(config: Config) -> Result<Self> {
        let controller =
            ConcurrencyController::new(config.initial_timestamp, config.wait_timeout);
        let mut stores = BTreeMap::new();
        for name in [FINANCIAL, INVENTORY] {
            stores.insert(
                name.to_string(),
                VersionManager::new(Arc::new(Store::new(name))),
            );
        }
        let coordinator = Self {
            engine: Arc::new(Engine {
                stores,
                controller,
                config,
                counters: Counters::default(),
                last_gc: Mutex::new(Instant::now()),
            }),
        };
        coordinator.install_schemas()?;
        info!("coordinator initialized with stores: financial, inventory");
        Ok(coordinator)
    }

    fn install_schemas(&self) -> Result<()> {
        let financial = self.store(FINANCIAL)?;
        financial.create_table(TableSchema::new(
            "users",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("username", DataType::String).unique(),
                Column::new("email", DataType::String),
            ],
        )?)?;
        financial.create_table(TableSchema::new(
            "accounts",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("user_id", DataType::Integer).indexed(),
                Column::new("type", DataType::String),
                Column::new("balance", DataType::Decimal),
            ],
        )?)?;
        financial.create_table(TableSchema::new(
            "transactions",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("account_id", DataType::Integer).indexed(),
                Column::new("kind", DataType::String),
                Column::new("amount", DataType::Decimal),
                Column::new("ts", DataType::Timestamp),
            ],
        )?)?;

        let inventory = self.store(INVENTORY)?;
        inventory.create_table(TableSchema::new(
            "categories",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::String).unique(),
                Column::new("parent_id", DataType::Integer).indexed().nullable(),
            ],
        )?)?;
        inventory.create_table(TableSchema::new(
            "products",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("category_id", DataType::Integer).indexed(),
                Column::new("name", DataType::String),
                Column::new("price", DataType::Decimal),
                Column::new("stock", DataType::Integer),
            ],
        )?)?;
        inventory.create_table(TableSchema::new(
            "orders",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("user_id", DataType::Integer).indexed(),
                Column::new("status", DataType::String),
                Column::new("total", DataType::Decimal),
                Column::new("ts", DataType::Timestamp),
            ],
        )?)?;
        inventory.create_table(TableSchema::new(
            "order_items",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("order_id", DataType::Integer).indexed(),
                Column::new("product_id", DataType::Integer).indexed(),
                Column::new("qty", DataType::Integer),
                Column::new("unit_price", DataType::Decimal),
            ],
        )?)?;
        Ok(())
    }

    /// Begin a transaction with a fresh timestamp.
    pub fn begin(&self) -> Tx {
        self.begin_with(CancelFlag::new())
    }

    /// Begin a transaction carrying an externally held cancel flag.
    pub fn begin_with(&self, cancel: CancelFlag) -> Tx {
        let meta = self.engine.controller.begin(cancel.clone());
        Tx {
            engine: self.engine.clone(),
            meta,
            state: TxState::Active,
            undo: UndoLog::new(),
            read_set: HashSet::new(),
            write_set: Vec::new(),
            participants: BTreeSet::new(),
            restart_count: 0,
            cancel,
        }
    }

    /// Run a transaction body under the coordinator's retry loop.
    ///
    /// The body is re-executed with a fresh timestamp after every
    /// restartable abort, up to `max_restarts` times; it must therefore
    /// be idempotent and free of external side effects. Non-restartable
    /// causes surface immediately.
    pub fn run<T>(&self, body: impl FnMut(&mut Tx) -> Result<T>) -> Result<T> {
        self.run_with_cancel(CancelFlag::new(), body)
    }

    /// [`Coordinator::run`] with an externally held cancel flag. The
    /// flag is honored at the next suspension point of whichever
    /// incarnation is running.
    pub fn run_with_cancel<T>(
        &self,
        cancel: CancelFlag,
        mut body: impl FnMut(&mut Tx) -> Result<T>,
    ) -> Result<T> {
        let mut restarts = 0;
        loop {
            let mut tx = self.begin_with(cancel.clone());
            tx.restart_count = restarts;
            let outcome = body(&mut tx).and_then(|value| tx.commit().map(|_| value));
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let cause = err.abort_cause();
                    tx.rollback(cause);
                    if cause.is_restartable() && restarts < self.engine.config.max_restarts {
                        restarts += 1;
                        self.engine.counters.restarts.fetch_add(1, Ordering::SeqCst);
                        info!(%cause, restarts, "restarting transaction body");
                        continue;
                    }
                    return Err(Error::TransactionAborted {
                        cause,
                        exhausted: cause.is_restartable(),
                    });
                }
            }
        }
    }

    /// Direct access to a store's base layer (committed rows only).
    pub fn store(&self, name: &str) -> Result<Arc<Store>> {
        Ok(self.engine.vm(name)?.store().clone())
    }

    pub fn schema(&self, store: &str, table: &str) -> Result<TableSchema> {
        self.store(store)?.schema(table)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            active_count: self.engine.controller.live_count(),
            committed_count: self.engine.counters.committed.load(Ordering::SeqCst),
            aborted_count: self.engine.counters.aborted.load(Ordering::SeqCst),
            restart_count: self.engine.counters.restarts.load(Ordering::SeqCst),
            deadlocks_detected: self.engine.controller.deadlocks_detected(),
        }
    }

    /// Committed row counts per store and table.
    pub fn store_stats(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.engine
            .stores
            .iter()
            .map(|(name, vm)| (name.clone(), vm.store().row_counts()))
            .collect()
    }
}

/// A transaction handle. All data operations validate against the
/// transaction's timestamp; mutations stage uncommitted versions and
/// record their inverse in the undo log.
pub struct Tx {
    engine: Arc<Engine>,
    meta: TxMeta,
    state: TxState,
    undo: UndoLog,
    read_set: HashSet<ChainCoord>,
    write_set: Vec<ChainCoord>,
    participants: BTreeSet<String>,
    restart_count: u32,
    cancel: CancelFlag,
}

impl Tx {
    pub fn id(&self) -> TxId {
        self.meta.id
    }

    pub fn ts(&self) -> u64 {
        self.meta.ts
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(String::as_str)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(Error::TransactionNotActive(self.meta.id));
        }
        self.engine.controller.check_live(&self.meta)
    }

    fn track_write(&mut self, coord: ChainCoord) {
        if !self.write_set.contains(&coord) {
            self.write_set.push(coord);
        }
    }

    fn coords_for(&self, store: &str) -> Vec<ChainCoord> {
        self.write_set
            .iter()
            .filter(|c| c.store == store)
            .cloned()
            .collect()
    }

    pub fn schema(&self, store: &str, table: &str) -> Result<TableSchema> {
        self.engine.vm(store)?.store().schema(table)
    }

    /// Read one row by primary key at this transaction's timestamp.
    pub fn read(&mut self, store: &str, table: &str, key: &Value) -> Result<Option<Row>> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        self.participants.insert(store.to_string());
        let row = vm.read(&engine.controller, &self.meta, table, key)?;
        self.read_set
            .insert(ChainCoord::new(store, table, key.clone()));
        Ok(row)
    }

    /// Scan all rows visible to this transaction, filtered by the
    /// predicate.
    pub fn scan(
        &mut self,
        store: &str,
        table: &str,
        predicate: impl Fn(&Row) -> bool,
    ) -> Result<Vec<Row>> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        self.participants.insert(store.to_string());
        let visible = vm.scan(&engine.controller, &self.meta, table)?;
        let mut rows = Vec::new();
        for (key, row) in visible {
            self.read_set.insert(ChainCoord::new(store, table, key));
            if predicate(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Look up rows through a secondary index, re-checked against this
    /// transaction's snapshot (the index itself tracks committed state).
    pub fn scan_index(
        &mut self,
        store: &str,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Row>> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        let schema = vm.store().schema(table)?;
        let idx = schema.column_index(column)?;
        let pks = vm.store().table(table)?.index_lookup(column, value)?;
        let mut rows = Vec::new();
        for pk in pks {
            if let Some(row) = self.read(store, table, &pk)? {
                if row[idx] == *value {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    /// Insert a row. The primary key must be unoccupied at this
    /// transaction's snapshot.
    pub fn insert(&mut self, store: &str, table: &str, row: Row) -> Result<()> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        let schema = vm.store().schema(table)?;
        schema.validate_row(&row)?;
        let key = schema.primary_key_of(&row);
        self.participants.insert(store.to_string());

        if vm
            .read(&engine.controller, &self.meta, table, &key)?
            .is_some()
        {
            return Err(Error::DuplicatePrimaryKey {
                table: table.to_string(),
                key,
            });
        }
        let table_state = vm.store().table(table)?;
        for (idx, column) in schema.indexed_columns() {
            if column.unique
                && !row[idx].is_null()
                && table_state.unique_conflict(&column.name, &row[idx], &key)
            {
                return Err(Error::UniqueViolation {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
        }

        vm.write(&engine.controller, &self.meta, table, &key, Some(row))?;
        let coord = ChainCoord::new(store, table, key);
        self.track_write(coord.clone());
        self.undo.push(UndoEntry::Insert { chain: coord });
        Ok(())
    }

    /// Replace the row stored under `key`. The primary key cannot change.
    pub fn update(&mut self, store: &str, table: &str, key: &Value, row: Row) -> Result<()> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        let schema = vm.store().schema(table)?;
        schema.validate_row(&row)?;
        if schema.primary_key_of(&row) != *key {
            return Err(Error::InvalidValue(
                "Primary key cannot change in an update".into(),
            ));
        }
        self.participants.insert(store.to_string());

        let prior = vm
            .read(&engine.controller, &self.meta, table, key)?
            .ok_or_else(|| Error::RowNotFound {
                table: table.to_string(),
                key: key.clone(),
            })?;
        let table_state = vm.store().table(table)?;
        for (idx, column) in schema.indexed_columns() {
            if column.unique
                && row[idx] != prior[idx]
                && !row[idx].is_null()
                && table_state.unique_conflict(&column.name, &row[idx], key)
            {
                return Err(Error::UniqueViolation {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
        }

        vm.write(&engine.controller, &self.meta, table, key, Some(row))?;
        let coord = ChainCoord::new(store, table, key.clone());
        self.track_write(coord.clone());
        self.undo.push(UndoEntry::Update {
            chain: coord,
            prior,
        });
        Ok(())
    }

    /// Delete the row stored under `key` by staging a tombstone.
    pub fn delete(&mut self, store: &str, table: &str, key: &Value) -> Result<()> {
        self.ensure_active()?;
        let engine = self.engine.clone();
        let vm = engine.vm(store)?;
        self.participants.insert(store.to_string());

        let prior = vm
            .read(&engine.controller, &self.meta, table, key)?
            .ok_or_else(|| Error::RowNotFound {
                table: table.to_string(),
                key: key.clone(),
            })?;

        vm.write(&engine.controller, &self.meta, table, key, None)?;
        let coord = ChainCoord::new(store, table, key.clone());
        self.track_write(coord.clone());
        self.undo.push(UndoEntry::Delete {
            chain: coord,
            prior,
        });
        Ok(())
    }

    /// Two-phase commit across the participant stores.
    ///
    /// Prepare walks the participants in deterministic order and
    /// verifies every staged version is still in place; any veto aborts.
    /// The commit step only flips in-memory flags and cannot fail.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(Error::TransactionNotActive(self.meta.id));
        }
        if let Err(err) = self.engine.controller.check_live(&self.meta) {
            self.rollback(err.abort_cause());
            return Err(err);
        }

        self.state = TxState::Preparing;
        debug!(tx = %self.meta.id, ts = self.meta.ts, "preparing");

        let engine = self.engine.clone();
        let plan: Vec<(String, Vec<ChainCoord>)> = self
            .participants
            .iter()
            .map(|store| (store.clone(), self.coords_for(store)))
            .collect();

        // Phase 1: prepare.
        for (store, coords) in &plan {
            let vm = engine.vm(store)?;
            let refs: Vec<&ChainCoord> = coords.iter().collect();
            if !vm.prepare(self.meta.ts, &refs) {
                warn!(tx = %self.meta.id, store, "prepare vetoed");
                self.rollback(AbortCause::PrepareFail);
                return Err(Error::PrepareFailed {
                    store: store.clone(),
                });
            }
        }
        // A deadlock victimization during prepare aborts before the
        // point of no return.
        if let Err(err) = engine.controller.check_live(&self.meta) {
            self.rollback(err.abort_cause());
            return Err(err);
        }

        // Phase 2: commit. Must not fail.
        self.state = TxState::Committed;
        for (store, coords) in &plan {
            if let Ok(vm) = engine.vm(store) {
                let refs: Vec<&ChainCoord> = coords.iter().collect();
                vm.commit(self.meta.ts, &refs);
            }
        }
        engine.controller.finish(&self.meta);
        engine.counters.committed.fetch_add(1, Ordering::SeqCst);
        debug!(tx = %self.meta.id, ts = self.meta.ts, writes = self.write_set.len(), "committed");
        engine.maybe_gc();
        Ok(())
    }

    /// Abort this transaction, discarding every staged version.
    pub fn abort(mut self) {
        self.rollback(AbortCause::UserAbort);
    }

    /// Internal abort path: replay the undo log in reverse for
    /// accounting, discard staged versions, release the controller
    /// registration. Idempotent once terminal.
    pub(crate) fn rollback(&mut self, cause: AbortCause) {
        if !matches!(self.state, TxState::Active | TxState::Preparing) {
            return;
        }
        let id = self.meta.id;
        let undone = self.undo.len();
        for entry in self.undo.drain_reverse() {
            debug!(tx = %id, undo = %entry, "rolling back");
        }
        let engine = self.engine.clone();
        for store in &self.participants {
            if let Ok(vm) = engine.vm(store) {
                let coords = self
                    .write_set
                    .iter()
                    .filter(|c| &c.store == store)
                    .cloned()
                    .collect::<Vec<_>>();
                let refs: Vec<&ChainCoord> = coords.iter().collect();
                vm.discard(self.meta.ts, &refs);
            }
        }
        engine.controller.finish(&self.meta);
        self.state = TxState::Aborted;
        engine.counters.aborted.fetch_add(1, Ordering::SeqCst);
        info!(tx = %id, %cause, undone, "transaction aborted");
        engine.maybe_gc();
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        // A handle dropped mid-flight must not leave staged versions or
        // a live controller registration behind.
        self.rollback(AbortCause::UserAbort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn coordinator() -> Coordinator {
        Coordinator::new(Config::default()).unwrap()
    }

    fn account_row(id: i64, user_id: i64, balance: i64) -> Row {
        vec![
            Value::Integer(id),
            Value::Integer(user_id),
            Value::String("checking".into()),
            Value::Decimal(Decimal::from(balance)),
        ]
    }

    #[test]
    fn insert_read_commit_visibility() {
        let coord = coordinator();

        let mut tx = coord.begin();
        tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100))
            .unwrap();
        // Read-your-own-writes before commit.
        let row = tx.read(FINANCIAL, "accounts", &Value::Integer(1)).unwrap();
        assert_eq!(row, Some(account_row(1, 1, 100)));
        tx.commit().unwrap();

        let mut tx2 = coord.begin();
        let row = tx2.read(FINANCIAL, "accounts", &Value::Integer(1)).unwrap();
        assert_eq!(row, Some(account_row(1, 1, 100)));
        tx2.commit().unwrap();

        let stats = coord.stats();
        assert_eq!(stats.committed_count, 2);
        assert_eq!(stats.active_count, 0);
    }

    #[test]
    fn duplicate_primary_key_is_a_constraint_error() {
        let coord = coordinator();
        coord
            .run(|tx| tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100)))
            .unwrap();

        let err = coord
            .run(|tx| tx.insert(FINANCIAL, "accounts", account_row(1, 2, 50)))
            .unwrap_err();
        assert_eq!(
            err,
            Error::TransactionAborted {
                cause: AbortCause::Constraint,
                exhausted: false
            }
        );
    }

    #[test]
    fn unique_index_is_enforced() {
        let coord = coordinator();
        coord
            .run(|tx| {
                tx.insert(
                    FINANCIAL,
                    "users",
                    vec![
                        Value::Integer(1),
                        Value::String("alice".into()),
                        Value::String("a@example.com".into()),
                    ],
                )
            })
            .unwrap();

        let err = coord
            .run(|tx| {
                tx.insert(
                    FINANCIAL,
                    "users",
                    vec![
                        Value::Integer(2),
                        Value::String("alice".into()),
                        Value::String("other@example.com".into()),
                    ],
                )
            })
            .unwrap_err();
        assert_eq!(err.abort_cause(), AbortCause::Constraint);
    }

    #[test]
    fn dropped_transaction_aborts() {
        let coord = coordinator();
        {
            let mut tx = coord.begin();
            tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100))
                .unwrap();
            // Dropped without commit.
        }
        assert_eq!(coord.stats().active_count, 0);
        assert_eq!(coord.stats().aborted_count, 1);
        assert!(coord
            .store(FINANCIAL)
            .unwrap()
            .lookup("accounts", &Value::Integer(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn prepare_veto_aborts_and_is_restartable() {
        let coord = coordinator();

        let mut tx = coord.begin();
        tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100))
            .unwrap();
        // Sabotage: drop the staged version behind the transaction's
        // back so prepare finds it missing.
        let coords = vec![ChainCoord::new(FINANCIAL, "accounts", Value::Integer(1))];
        let refs: Vec<&ChainCoord> = coords.iter().collect();
        coord.engine.vm(FINANCIAL).unwrap().discard(tx.ts(), &refs);

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, Error::PrepareFailed { .. }));
        assert!(err.abort_cause().is_restartable());
        assert_eq!(tx.state(), TxState::Aborted);
        assert_eq!(coord.stats().aborted_count, 1);
    }

    #[test]
    fn retry_loop_restarts_on_timestamp_order() {
        let coord = coordinator();
        coord
            .run(|tx| tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100)))
            .unwrap();

        let mut attempts = 0;
        coord
            .run(|tx| {
                attempts += 1;
                if attempts == 1 {
                    // A younger transaction reads (and commits) first,
                    // lifting the chain's read timestamp above ours.
                    coord.run(|peer| {
                        peer.read(FINANCIAL, "accounts", &Value::Integer(1))
                            .map(|_| ())
                    })?;
                }
                tx.update(FINANCIAL, "accounts", &Value::Integer(1), account_row(1, 1, 80))
            })
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(coord.stats().restart_count, 1);
        let row = coord
            .store(FINANCIAL)
            .unwrap()
            .lookup("accounts", &Value::Integer(1))
            .unwrap()
            .unwrap();
        assert_eq!(row[3], Value::Decimal(Decimal::from(80)));
    }

    #[test]
    fn operations_on_terminal_transactions_fail() {
        let coord = coordinator();
        let mut tx = coord.begin();
        tx.commit().unwrap();
        assert_eq!(
            tx.read(FINANCIAL, "accounts", &Value::Integer(1)),
            Err(Error::TransactionNotActive(tx.id()))
        );
        assert!(tx.commit().is_err());
    }

    #[test]
    fn unknown_store_and_table_errors() {
        let coord = coordinator();
        let mut tx = coord.begin();
        assert!(matches!(
            tx.read("archive", "accounts", &Value::Integer(1)),
            Err(Error::StoreNotFound(_))
        ));
        assert!(matches!(
            tx.read(FINANCIAL, "missing", &Value::Integer(1)),
            Err(Error::TableNotFound(_))
        ));
        tx.abort();
    }

    #[test]
    fn store_stats_report_committed_rows() {
        let coord = coordinator();
        coord
            .run(|tx| {
                tx.insert(FINANCIAL, "accounts", account_row(1, 1, 100))?;
                tx.insert(FINANCIAL, "accounts", account_row(2, 1, 50))
            })
            .unwrap();
        let stats = coord.store_stats();
        assert_eq!(stats[FINANCIAL]["accounts"], 2);
        assert_eq!(stats[FINANCIAL]["users"], 0);
        assert_eq!(stats[INVENTORY]["products"], 0);
    }
}
