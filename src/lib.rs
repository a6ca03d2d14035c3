//! # Rust DbMap
//!
//! A typed record to table mapper. Register plain Rust structs as tables, and the
//! mapper derives the SQL for inserting, updating, deleting and loading them,
//! creates and drops their tables, and binds query results back into structs.
//!
//! ## Features
//!
//! - **Typed records**: `impl_record!` maps struct fields to columns without runtime reflection
//! - **Dialects**: SQLite, PostgreSQL and MySQL placeholder, quoting and DDL rules
//! - **Generated keys**: auto-increment keys are written back after insert
//! - **Optimistic locking**: a version column guards updates and deletes
//! - **Lifecycle hooks**: run code before and after each insert, update or delete, and after loads
//! - **Transactions**: the same CRUD calls inside a transaction
//! - **Cancellation**: every call takes a [`Context`] that can cancel the statement in flight
//! - **Statement tracing**: log every statement with its arguments
//!
//! ## Supported Databases
//!
//! | Database | Feature | Generated keys |
//! |----------|---------|----------------|
//! | SQLite | `sqlite` (default) | last insert id |
//! | PostgreSQL | `postgres` | `returning` |
//! | MySQL | `mysql` | last insert id |
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rust_dbmap = { version = "0.1", features = ["sqlite"] }
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use rust_dbmap::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     id: i64,
//!     fname: String,
//!     lname: String,
//!     version: i64,
//! }
//!
//! impl_record!(Person {
//!     id: i64,
//!     fname: String => "first_name",
//!     lname: String,
//!     version: i64,
//! });
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::background();
//!     let conn = SqliteDatabase::connect(":memory:").await?;
//!     let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
//!
//!     dbmap.add_table::<Person>().set_keys(true, &["id"]);
//!     dbmap.create_tables(&ctx).await?;
//!
//!     let mut person = Person { fname: "Ben".into(), lname: "Doe".into(), ..Default::default() };
//!     dbmap.insert(&ctx, &mut [&mut person]).await?;
//!     assert_eq!(person.version, 1);
//!
//!     person.lname = "Smith".into();
//!     dbmap.update(&ctx, &mut [&mut person]).await?;
//!
//!     let people: Vec<Person> = dbmap
//!         .select(&ctx, "select * from person where lname = ?", &["Smith".into()])
//!         .await?;
//!     println!("{:?}", people);
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Working with Transactions
//!
//! ```rust,no_run
//! use rust_dbmap::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Account {
//!     id: i64,
//!     balance: f64,
//! }
//!
//! impl_record!(Account { id: i64, balance: f64 });
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::background();
//!     let conn = SqliteDatabase::connect(":memory:").await?;
//!     let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
//!     dbmap.add_table::<Account>().set_keys(true, &["id"]);
//!     dbmap.create_tables(&ctx).await?;
//!
//!     let tx = dbmap.begin(&ctx).await?;
//!     let mut account = Account { id: 0, balance: 100.0 };
//!     match tx.insert(&ctx, &mut [&mut account]).await {
//!         Ok(()) => tx.commit().await?,
//!         Err(e) => {
//!             tx.rollback().await?;
//!             return Err(e);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! rust_dbmap/
//! ├── src/
//! │   ├── core/              # Mapper types and traits
//! │   │   ├── context.rs     # Cancellation and deadlines
//! │   │   ├── crud.rs        # Insert/update/delete/get/select engine
//! │   │   ├── database.rs    # Executor traits
//! │   │   ├── dbmap.rs       # Table registry and DDL
//! │   │   ├── dialect.rs     # SQL dialects
//! │   │   ├── handle.rs      # Statement tracing
//! │   │   ├── mapping.rs     # Table and column mappings
//! │   │   ├── record.rs      # Record, column value and hook traits
//! │   │   ├── transaction.rs # Transactions
//! │   │   └── value.rs       # Value types
//! │   ├── backends/          # Database backend implementations
//! │   │   ├── sqlite.rs
//! │   │   ├── postgres.rs
//! │   │   └── mysql.rs
//! │   └── lib.rs
//! ├── demos/                 # Example programs
//! ├── tests/                 # Integration tests
//! └── Cargo.toml
//! ```

/// Core mapper types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_dbmap::prelude::*;
///
/// let ctx = Context::background();
/// assert!(ctx.check().is_ok());
/// ```
pub mod prelude {
    pub use crate::core::{
        ColumnMap, ColumnValue, Connection, ConnectionBuilder, Context, DatabaseError,
        DatabaseResult, DatabaseRow, DatabaseType, DatabaseValue, DbMap, Dialect, ExecResult,
        Hooks, LogSink, MySqlDialect, PostgresDialect, Record, Result, SqlExecutor,
        SqliteDialect, TableMap, TraceSink, Transaction, WriterSink,
    };
    pub use crate::impl_record;

    #[cfg(feature = "mysql")]
    pub use crate::backends::MysqlDatabase;
    #[cfg(feature = "postgres")]
    pub use crate::backends::PostgresDatabase;
    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;
}

// Re-export at root level for convenience
pub use crate::core::{
    Context, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType, DatabaseValue, DbMap,
    Record, Result, Transaction,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDatabase;
