//! An in-process distributed transactional storage engine
//!
//! Coordinates ACID transactions spanning two independent in-memory
//! relational stores (`financial` and `inventory`) under one
//! coordinator:
//! - Timestamp-ordering concurrency control with multiversion reads
//! - Per-operation undo logging and total rollback on abort
//! - Wait-for-graph deadlock detection with youngest-victim selection
//! - Two-phase commit across the participant stores
//! - Closure-based transaction bodies with automatic abort-and-restart
//!
//! Everything is process-local and volatile: no wire protocol, no disk,
//! no recovery. Embedding programs own those surfaces.
//!
//! ```
//! use dualtx::{Config, Coordinator, Value, FINANCIAL};
//! use rust_decimal::Decimal;
//!
//! let coordinator = Coordinator::new(Config::default())?;
//! coordinator.run(|tx| {
//!     tx.insert(
//!         FINANCIAL,
//!         "accounts",
//!         vec![
//!             Value::Integer(1),
//!             Value::Integer(1),
//!             Value::String("checking".into()),
//!             Value::Decimal(Decimal::from(100)),
//!         ],
//!     )
//! })?;
//! # Ok::<(), dualtx::Error>(())
//! ```

pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod storage;
pub mod types;
pub mod undo;
pub mod workload;

pub use concurrency::{CancelFlag, ConcurrencyController, TxId};
pub use config::Config;
pub use coordinator::{Coordinator, Stats, Tx, TxState, FINANCIAL, INVENTORY};
pub use error::{AbortCause, Error, Result};
pub use storage::{ChainCoord, Store, VersionManager};
pub use types::{Column, DataType, Row, TableSchema, Value};
pub use undo::{UndoEntry, UndoLog};
