//! Record stores: named collections of indexed tables
//!
//! A store owns table schemas, the version chains addressed by primary
//! key, and the secondary indexes. Nothing here enforces isolation; the
//! version manager and the concurrency controller layer that on top.
//! The lookups and scans exposed directly on the store see committed
//! rows only.

use super::version::VersionChain;
use crate::error::{Error, Result};
use crate::types::schema::TableSchema;
use crate::types::value::{Row, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One table: immutable schema, version chains keyed by primary key, and
/// secondary indexes mapping column value to the committed primary keys
/// carrying it.
pub struct TableState {
    pub schema: TableSchema,
    chains: RwLock<HashMap<Value, Arc<Mutex<VersionChain>>>>,
    indexes: Mutex<HashMap<String, HashMap<Value, HashSet<Value>>>>,
}

impl TableState {
    fn new(schema: TableSchema) -> Self {
        let mut indexes = HashMap::new();
        for (_, column) in schema.indexed_columns() {
            indexes.insert(column.name.clone(), HashMap::new());
        }
        Self {
            schema,
            chains: RwLock::new(HashMap::new()),
            indexes: Mutex::new(indexes),
        }
    }

    /// The chain for a primary key, created on first touch so read
    /// timestamps recorded against missing rows survive for ordering
    /// checks.
    pub fn chain(&self, key: &Value) -> Arc<Mutex<VersionChain>> {
        if let Some(chain) = self.chains.read().get(key) {
            return chain.clone();
        }
        self.chains
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VersionChain::new())))
            .clone()
    }

    pub fn existing_chain(&self, key: &Value) -> Option<Arc<Mutex<VersionChain>>> {
        self.chains.read().get(key).cloned()
    }

    pub fn chains_snapshot(&self) -> Vec<(Value, Arc<Mutex<VersionChain>>)> {
        self.chains
            .read()
            .iter()
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect()
    }

    /// Committed primary keys currently carrying `value` in the indexed
    /// column. Errors if the column has no index.
    pub fn index_lookup(&self, column: &str, value: &Value) -> Result<Vec<Value>> {
        let indexes = self.indexes.lock();
        let index = indexes
            .get(column)
            .ok_or_else(|| Error::InvalidValue(format!("No index on column '{}'", column)))?;
        Ok(index
            .get(value)
            .map(|pks| pks.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// True if a committed row other than `self_pk` holds `value` in the
    /// indexed column.
    pub fn unique_conflict(&self, column: &str, value: &Value, self_pk: &Value) -> bool {
        self.indexes
            .lock()
            .get(column)
            .and_then(|index| index.get(value))
            .map_or(false, |pks| pks.iter().any(|pk| pk != self_pk))
    }

    /// Swap index entries when a chain's committed head changes. Null
    /// values are not indexed.
    pub fn index_swap(&self, pk: &Value, prior: Option<&Row>, current: Option<&Row>) {
        let mut indexes = self.indexes.lock();
        for (idx, column) in self.schema.indexed_columns() {
            let Some(index) = indexes.get_mut(&column.name) else {
                continue;
            };
            if let Some(prior_row) = prior {
                let value = &prior_row[idx];
                if !value.is_null() {
                    if let Some(pks) = index.get_mut(value) {
                        pks.remove(pk);
                        if pks.is_empty() {
                            index.remove(value);
                        }
                    }
                }
            }
            if let Some(row) = current {
                let value = &row[idx];
                if !value.is_null() {
                    index.entry(value.clone()).or_default().insert(pk.clone());
                }
            }
        }
    }

    /// Newest committed row for a primary key.
    pub fn committed_row(&self, key: &Value) -> Option<Row> {
        self.existing_chain(key)?
            .lock()
            .newest_committed()
            .and_then(|v| v.value.clone())
    }

    /// Count of committed rows.
    pub fn committed_count(&self) -> usize {
        self.chains_snapshot()
            .iter()
            .filter(|(_, chain)| {
                chain
                    .lock()
                    .newest_committed()
                    .map_or(false, |v| v.value.is_some())
            })
            .count()
    }
}

/// A named in-memory store of tables.
pub struct Store {
    name: String,
    tables: RwLock<HashMap<String, Arc<TableState>>>,
}

impl Store {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a table. Idempotent by name: re-creating an identical
    /// schema is a no-op, a different schema under an existing name is
    /// an error.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.get(&schema.name) {
            if existing.schema == schema {
                return Ok(());
            }
            return Err(Error::DuplicateTable(schema.name));
        }
        tables.insert(schema.name.clone(), Arc::new(TableState::new(schema)));
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableState>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn schema(&self, name: &str) -> Result<TableSchema> {
        Ok(self.table(name)?.schema.clone())
    }

    pub fn tables(&self) -> Vec<Arc<TableState>> {
        self.tables.read().values().cloned().collect()
    }

    /// Committed row for a primary key, bypassing any isolation.
    pub fn lookup(&self, table: &str, key: &Value) -> Result<Option<Row>> {
        Ok(self.table(table)?.committed_row(key))
    }

    /// All committed rows of a table, bypassing any isolation.
    pub fn scan(&self, table: &str) -> Result<Vec<Row>> {
        let table_state = self.table(table)?;
        Ok(table_state
            .chains_snapshot()
            .into_iter()
            .filter_map(|(_, chain)| chain.lock().newest_committed().and_then(|v| v.value.clone()))
            .collect())
    }

    /// Committed row counts per table.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.tables
            .read()
            .iter()
            .map(|(name, table)| (name.clone(), table.committed_count()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::Column;
    use crate::types::value::DataType;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("username", DataType::String).unique(),
                Column::new("email", DataType::String),
            ],
        )
        .unwrap()
    }

    fn commit_row(table: &TableState, ts: u64, row: Row) {
        let pk = table.schema.primary_key_of(&row);
        let chain = table.chain(&pk);
        let flipped = {
            let mut guard = chain.lock();
            guard.put_version(ts, Some(row));
            guard.commit_writer(ts)
        };
        let (new_row, prior) = flipped.unwrap();
        table.index_swap(&pk, prior.as_ref(), new_row.as_ref());
    }

    #[test]
    fn create_table_is_idempotent_by_schema() {
        let store = Store::new("financial");
        store.create_table(users_schema()).unwrap();
        store.create_table(users_schema()).unwrap();

        let different = TableSchema::new(
            "users",
            vec![Column::new("id", DataType::Integer).primary_key()],
        )
        .unwrap();
        assert!(matches!(
            store.create_table(different),
            Err(Error::DuplicateTable(_))
        ));
    }

    #[test]
    fn unknown_table_errors() {
        let store = Store::new("financial");
        assert!(matches!(
            store.lookup("missing", &Value::Integer(1)),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn committed_lookup_and_scan() {
        let store = Store::new("financial");
        store.create_table(users_schema()).unwrap();
        let table = store.table("users").unwrap();

        commit_row(
            &table,
            1,
            vec![
                Value::Integer(1),
                Value::String("alice".into()),
                Value::String("alice@example.com".into()),
            ],
        );

        // Staged but uncommitted rows stay invisible to base lookups.
        let chain = table.chain(&Value::Integer(2));
        chain.lock().put_version(
            2,
            Some(vec![
                Value::Integer(2),
                Value::String("bob".into()),
                Value::String("bob@example.com".into()),
            ]),
        );

        assert!(store.lookup("users", &Value::Integer(1)).unwrap().is_some());
        assert!(store.lookup("users", &Value::Integer(2)).unwrap().is_none());
        assert_eq!(store.scan("users").unwrap().len(), 1);
        assert_eq!(store.row_counts()["users"], 1);
    }

    #[test]
    fn index_tracks_committed_rows() {
        let store = Store::new("financial");
        store.create_table(users_schema()).unwrap();
        let table = store.table("users").unwrap();

        commit_row(
            &table,
            1,
            vec![
                Value::Integer(1),
                Value::String("alice".into()),
                Value::String("a@example.com".into()),
            ],
        );

        let pks = table
            .index_lookup("username", &Value::String("alice".into()))
            .unwrap();
        assert_eq!(pks, vec![Value::Integer(1)]);
        assert!(table.unique_conflict(
            "username",
            &Value::String("alice".into()),
            &Value::Integer(2)
        ));
        assert!(!table.unique_conflict(
            "username",
            &Value::String("alice".into()),
            &Value::Integer(1)
        ));

        // Rename swaps the index entry.
        commit_row(
            &table,
            2,
            vec![
                Value::Integer(1),
                Value::String("alice2".into()),
                Value::String("a@example.com".into()),
            ],
        );
        assert!(table
            .index_lookup("username", &Value::String("alice".into()))
            .unwrap()
            .is_empty());
        assert_eq!(
            table
                .index_lookup("username", &Value::String("alice2".into()))
                .unwrap(),
            vec![Value::Integer(1)]
        );

        assert!(table.index_lookup("email", &Value::Null).is_err());
    }
}
