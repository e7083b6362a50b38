//! Per-transaction undo log
//!
//! Each entry is the self-contained inverse of one executed operation,
//! appended in execution order and drained in reverse on abort. The
//! physical rollback happens wholesale through the version manager's
//! discard path; the drained log is the authoritative record of what was
//! undone, so abort accounting stays accurate.

use crate::storage::ChainCoord;
use crate::types::value::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The inverse of one executed data operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UndoEntry {
    /// Inverse of an INSERT: delete the row again.
    Insert { chain: ChainCoord },
    /// Inverse of an UPDATE: restore the prior row.
    Update { chain: ChainCoord, prior: Row },
    /// Inverse of a DELETE: reinsert the prior row.
    Delete { chain: ChainCoord, prior: Row },
}

impl UndoEntry {
    pub fn chain(&self) -> &ChainCoord {
        match self {
            UndoEntry::Insert { chain }
            | UndoEntry::Update { chain, .. }
            | UndoEntry::Delete { chain, .. } => chain,
        }
    }
}

impl fmt::Display for UndoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoEntry::Insert { chain } => write!(f, "delete {}", chain),
            UndoEntry::Update { chain, .. } => write!(f, "restore {}", chain),
            UndoEntry::Delete { chain, .. } => write!(f, "reinsert {}", chain),
        }
    }
}

/// Ordered undo entries of one transaction.
#[derive(Debug, Default)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain all entries in reverse execution order.
    pub fn drain_reverse(&mut self) -> impl Iterator<Item = UndoEntry> + '_ {
        self.entries.drain(..).rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::Value;

    fn coord(key: i64) -> ChainCoord {
        ChainCoord::new("financial", "accounts", Value::Integer(key))
    }

    #[test]
    fn drains_in_reverse_order() {
        let mut log = UndoLog::new();
        log.push(UndoEntry::Insert { chain: coord(1) });
        log.push(UndoEntry::Update {
            chain: coord(2),
            prior: vec![Value::Integer(2)],
        });
        log.push(UndoEntry::Delete {
            chain: coord(3),
            prior: vec![Value::Integer(3)],
        });
        assert_eq!(log.len(), 3);

        let chains: Vec<i64> = log
            .drain_reverse()
            .map(|e| match &e.chain().key {
                Value::Integer(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(chains, vec![3, 2, 1]);
        assert!(log.is_empty());
    }

    #[test]
    fn entries_describe_their_inverse() {
        let entry = UndoEntry::Insert { chain: coord(7) };
        assert_eq!(entry.to_string(), "delete financial.accounts[7]");
    }
}
