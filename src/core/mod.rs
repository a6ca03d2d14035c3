//! Core mapper types and traits
//!
//! This module provides the building blocks of the mapper: record and column
//! conversion traits, table mappings, SQL dialects, the CRUD engine, and the
//! executor capability backends implement.

pub mod context;
mod crud;
pub mod database;
pub mod database_types;
pub mod dbmap;
pub mod dialect;
pub mod error;
pub mod handle;
pub mod mapping;
pub mod record;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use context::Context;
pub use database::{Connection, ConnectionBuilder, ExecResult, SqlExecutor, TransactionExecutor};
pub use database_types::DatabaseType;
pub use dbmap::DbMap;
pub use dialect::{
    dialect_for, rebind, Dialect, KeyRetrieval, MySqlDialect, PostgresDialect, SqliteDialect,
};
pub use error::{DatabaseError, Result, LOCK_CONFLICT_COUNT};
pub use handle::{LogSink, TraceSink, WriterSink};
pub use mapping::{ColumnMap, TableMap};
pub use record::{ColumnValue, FieldDef, FieldKind, Hooks, Record};
pub use transaction::Transaction;
pub use value::{DatabaseResult, DatabaseRow, DatabaseValue};
