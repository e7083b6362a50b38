//! In-memory relational storage: record stores and version chains

pub mod store;
pub mod version;

pub use store::{Store, TableState};
pub use version::{Version, VersionChain, VersionManager};

use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global coordinate of a version chain: one (store, table, primary key)
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainCoord {
    pub store: String,
    pub table: String,
    pub key: Value,
}

impl ChainCoord {
    pub fn new(store: impl Into<String>, table: impl Into<String>, key: Value) -> Self {
        Self {
            store: store.into(),
            table: table.into(),
            key,
        }
    }
}

impl fmt::Display for ChainCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.store, self.table, self.key)
    }
}
