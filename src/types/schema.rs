//! Table schemas and columns
//!
//! Tables are immutable after creation: no ALTER TABLE, no dropping
//! columns. The schema's column list is the ordered name-to-value
//! mapping that gives rows their shape.

use super::value::{DataType, Row, Value};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A table schema: its data structure and constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// The table name. Unique within a store. Can't be empty.
    pub name: String,
    /// The primary key column index. A table must have exactly one.
    pub primary_key: usize,
    /// The table's columns. Must have at least one.
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidValue("Table name cannot be empty".into()));
        }
        if columns.is_empty() {
            return Err(Error::InvalidValue(
                "Table must have at least one column".into(),
            ));
        }

        let primary_keys: Vec<_> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();

        if primary_keys.len() != 1 {
            return Err(Error::InvalidValue(
                "Table must have exactly one primary key".into(),
            ));
        }
        let primary_key = primary_keys[0];

        if columns[primary_key].datatype.is_nullable() {
            return Err(Error::InvalidValue("Primary key cannot be nullable".into()));
        }

        Ok(TableSchema {
            name,
            primary_key,
            columns,
        })
    }

    /// Validates a row against this schema.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidValue(format!(
                "Row has {} columns, table {} has {}",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(row.iter()) {
            if value.is_null() && !column.datatype.is_nullable() {
                return Err(Error::NullConstraintViolation(column.name.clone()));
            }
            if !value.is_null() {
                value.check_type(&column.datatype)?;
            }
        }

        Ok(())
    }

    /// Returns the index and definition of the named column.
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Returns the index of the named column, as an error if missing.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.column(name)
            .map(|(i, _)| i)
            .ok_or_else(|| Error::InvalidValue(format!("Column '{}' not found", name)))
    }

    /// The primary key value of a row shaped for this schema.
    pub fn primary_key_of(&self, row: &Row) -> Value {
        row[self.primary_key].clone()
    }

    /// Columns carrying a secondary index (unique columns included).
    pub fn indexed_columns(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| (c.index || c.unique) && !c.primary_key)
    }
}

/// A table column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name. Can't be empty.
    pub name: String,
    /// Column datatype. Wrap in `Nullable` to allow nulls.
    pub datatype: DataType,
    /// Whether this is the primary key column.
    pub primary_key: bool,
    /// Whether the column only allows unique values (ignoring NULLs).
    pub unique: bool,
    /// Whether the column carries a secondary index.
    pub index: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Column {
            name: name.into(),
            datatype,
            primary_key: false,
            unique: false,
            index: false,
        }
    }

    /// Marks this column as the primary key. Primary keys are inherently
    /// unique and indexed through the rowset itself.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.index = false;
        self
    }

    /// Allows nulls in this column.
    pub fn nullable(mut self) -> Self {
        if !self.primary_key && !self.datatype.is_nullable() {
            self.datatype = DataType::Nullable(Box::new(self.datatype));
        }
        self
    }

    /// Requires values to be unique. Unique columns get an index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        if !self.primary_key {
            self.index = true;
        }
        self
    }

    /// Adds a secondary index on this column.
    pub fn indexed(mut self) -> Self {
        if !self.primary_key {
            self.index = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn schema_creation() {
        let schema = users_schema();
        assert_eq!(schema.primary_key, 0);
        assert!(schema.columns[1].unique);
        assert!(schema.columns[1].index);
        assert_eq!(schema.column_index("email").unwrap(), 2);
        assert!(schema.column_index("missing").is_err());
    }

    #[test]
    fn schema_validation_errors() {
        assert!(TableSchema::new("empty", vec![]).is_err());

        let no_pk = vec![Column::new("id", DataType::Integer)];
        assert!(TableSchema::new("nopk", no_pk).is_err());

        let two_pks = vec![
            Column::new("a", DataType::Integer).primary_key(),
            Column::new("b", DataType::Integer).primary_key(),
        ];
        assert!(TableSchema::new("twopk", two_pks).is_err());
    }

    #[test]
    fn row_validation() {
        let schema = users_schema();

        let ok = vec![
            Value::Integer(1),
            Value::String("alice".into()),
            Value::String("alice@example.com".into()),
        ];
        assert!(schema.validate_row(&ok).is_ok());

        // Wrong arity
        assert!(schema.validate_row(&vec![Value::Integer(1)]).is_err());

        // Null in non-nullable column
        let nulled = vec![
            Value::Integer(2),
            Value::Null,
            Value::String("x".into()),
        ];
        assert!(schema.validate_row(&nulled).is_err());

        // Wrong tag
        let wrong = vec![
            Value::String("not-an-int".into()),
            Value::String("bob".into()),
            Value::String("bob@example.com".into()),
        ];
        assert!(schema.validate_row(&wrong).is_err());
    }

    #[test]
    fn nullable_builder_wraps_datatype() {
        let col = Column::new("parent_id", DataType::Integer).nullable();
        assert!(col.datatype.is_nullable());
        assert_eq!(col.datatype.base_type(), &DataType::Integer);
    }
}
