//! SQLite database backend implementation
//!
//! This module provides a SQLite implementation of the executor traits on top of
//! rusqlite. rusqlite is blocking, so every statement runs on the blocking thread
//! pool and is raced against the call's context and the operation timeout; a
//! losing statement is stopped through the connection's interrupt handle.
//!
//! The connection is single: an open transaction holds it exclusively until it is
//! committed, rolled back or dropped, and plain statements wait for it.

use crate::core::{
    context::Context,
    database::{Connection, ExecResult, SqlExecutor, TransactionExecutor},
    database_types::DatabaseType,
    error::{DatabaseError, Result},
    value::{DatabaseResult, DatabaseRow, DatabaseValue},
};
use async_trait::async_trait;
use rusqlite::{params_from_iter, InterruptHandle, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a dropped transaction waits for the connection to roll back
const DROP_ROLLBACK_WAIT: Duration = Duration::from_secs(1);

struct SqliteShared {
    conn: parking_lot::Mutex<rusqlite::Connection>,
    interrupt: InterruptHandle,
    gate: Arc<AsyncMutex<()>>,
}

/// SQLite database implementation
pub struct SqliteDatabase {
    shared: Arc<SqliteShared>,
    operation_timeout: Duration,
}

impl SqliteDatabase {
    /// Open a database file, or an in-memory database for `:memory:`
    ///
    /// # Errors
    ///
    /// Returns the driver error if the database cannot be opened, or
    /// `ConnectionTimeout` if opening takes longer than the operation timeout.
    pub async fn connect(path: &str) -> Result<Self> {
        let path = path.to_string();

        // Offload blocking database operations to blocking thread pool with timeout
        let mut task = tokio::task::spawn_blocking(move || -> Result<rusqlite::Connection> {
            let conn = rusqlite::Connection::open(&path)?;
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
            Ok(conn)
        });

        let conn = tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
            }
            _ = tokio::time::sleep(DEFAULT_OPERATION_TIMEOUT) => {
                task.abort();
                return Err(DatabaseError::connection_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64));
            }
        };

        let conn = conn.map_err(|e| {
            tracing::error!(error = %e, "failed to open SQLite database");
            e
        })?;

        Ok(Self {
            shared: Arc::new(SqliteShared {
                interrupt: conn.get_interrupt_handle(),
                conn: parking_lot::Mutex::new(conn),
                gate: Arc::new(AsyncMutex::new(())),
            }),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// Set the timeout applied to every statement
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    async fn acquire(&self, ctx: &Context) -> Result<OwnedMutexGuard<()>> {
        let gate = Arc::clone(&self.shared.gate);
        tokio::select! {
            guard = gate.lock_owned() => Ok(guard),
            err = ctx.done() => Err(err),
        }
    }
}

/// Convert a rusqlite Row to a DatabaseRow
fn row_to_database_row(row: &Row) -> rusqlite::Result<DatabaseRow> {
    let mut db_row = DatabaseRow::new();
    let column_count = row.as_ref().column_count();

    for i in 0..column_count {
        let column_name = row.as_ref().column_name(i)?.to_string();
        let value = match row.get_ref(i)? {
            rusqlite::types::ValueRef::Null => DatabaseValue::Null,
            rusqlite::types::ValueRef::Integer(v) => DatabaseValue::Long(v),
            rusqlite::types::ValueRef::Real(v) => DatabaseValue::Double(v),
            rusqlite::types::ValueRef::Text(v) => {
                DatabaseValue::String(String::from_utf8_lossy(v).to_string())
            }
            rusqlite::types::ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        };
        db_row.insert(column_name, value);
    }

    Ok(db_row)
}

/// Convert DatabaseValue to rusqlite parameter
fn value_to_param(value: &DatabaseValue) -> Box<dyn rusqlite::ToSql + Send> {
    match value {
        DatabaseValue::Null => Box::new(None::<i64>),
        DatabaseValue::Bool(v) => Box::new(*v),
        DatabaseValue::Int(v) => Box::new(*v),
        DatabaseValue::Long(v) => Box::new(*v),
        DatabaseValue::Float(v) => Box::new(*v as f64),
        DatabaseValue::Double(v) => Box::new(*v),
        DatabaseValue::String(v) => Box::new(v.clone()),
        DatabaseValue::Bytes(v) => Box::new(v.clone()),
        DatabaseValue::Timestamp(v) => Box::new(*v),
    }
}

/// Run `f` against the connection on the blocking pool
///
/// The statement is interrupted when the context ends or the timeout passes.
async fn run_blocking<T, F>(
    shared: &Arc<SqliteShared>,
    timeout: Duration,
    ctx: &Context,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
{
    ctx.check()?;
    let conn_arc = Arc::clone(shared);
    let abandoned = Arc::new(AtomicBool::new(false));
    let task_abandoned = Arc::clone(&abandoned);

    // Offload blocking database operations to blocking thread pool with timeout
    let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
        let conn = conn_arc.conn.lock();
        // Interrupting is a no-op before the statement starts
        if task_abandoned.load(Ordering::Acquire) {
            return Err(DatabaseError::Cancelled);
        }
        f(&conn)
    });

    let err = tokio::select! {
        result = &mut task => {
            return result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?;
        }
        err = ctx.done() => err,
        _ = tokio::time::sleep(timeout) => DatabaseError::query_timeout(timeout.as_millis() as u64),
    };
    abandoned.store(true, Ordering::Release);
    shared.interrupt.interrupt();
    task.abort();
    Err(err)
}

async fn execute_on(
    shared: &Arc<SqliteShared>,
    timeout: Duration,
    ctx: &Context,
    query: &str,
    args: &[DatabaseValue],
) -> Result<ExecResult> {
    let query = query.to_string();
    let params: Vec<_> = args.iter().map(value_to_param).collect();
    run_blocking(shared, timeout, ctx, move |conn| {
        let mut stmt = conn.prepare(&query)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(ExecResult {
            rows_affected: affected as u64,
            last_insert_id: Some(conn.last_insert_rowid()),
        })
    })
    .await
}

async fn fetch_one_on(
    shared: &Arc<SqliteShared>,
    timeout: Duration,
    ctx: &Context,
    query: &str,
    args: &[DatabaseValue],
) -> Result<DatabaseRow> {
    let query = query.to_string();
    let params: Vec<_> = args.iter().map(value_to_param).collect();
    run_blocking(shared, timeout, ctx, move |conn| {
        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => Ok(row_to_database_row(row)?),
            None => Err(DatabaseError::NoRows),
        }
    })
    .await
}

async fn fetch_all_on(
    shared: &Arc<SqliteShared>,
    timeout: Duration,
    ctx: &Context,
    query: &str,
    args: &[DatabaseValue],
) -> Result<DatabaseResult> {
    let query = query.to_string();
    let params: Vec<_> = args.iter().map(value_to_param).collect();
    run_blocking(shared, timeout, ctx, move |conn| {
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), row_to_database_row)?;

        let mut results = Vec::new();
        for row_result in rows {
            results.push(row_result?);
        }
        Ok(results)
    })
    .await
}

#[async_trait]
impl SqlExecutor for SqliteDatabase {
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        let _permit = self.acquire(ctx).await?;
        execute_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }

    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow> {
        let _permit = self.acquire(ctx).await?;
        fetch_one_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let _permit = self.acquire(ctx).await?;
        fetch_all_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }
}

#[async_trait]
impl Connection for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn begin(&self, ctx: &Context) -> Result<Box<dyn TransactionExecutor>> {
        let permit = self.acquire(ctx).await?;
        execute_on(&self.shared, self.operation_timeout, ctx, "BEGIN TRANSACTION", &[]).await?;

        Ok(Box::new(SqliteTransaction {
            shared: Arc::clone(&self.shared),
            operation_timeout: self.operation_timeout,
            permit: parking_lot::Mutex::new(Some(permit)),
            finished: AtomicBool::new(false),
        }))
    }
}

/// An open SQLite transaction
///
/// Holds the connection exclusively until it ends.
pub struct SqliteTransaction {
    shared: Arc<SqliteShared>,
    operation_timeout: Duration,
    permit: parking_lot::Mutex<Option<OwnedMutexGuard<()>>>,
    finished: AtomicBool,
}

impl SqliteTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction_done());
        }
        Ok(())
    }

    async fn finish(&self, statement: &str) -> Result<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(DatabaseError::transaction_done());
        }
        let ctx = Context::background();
        let result = execute_on(&self.shared, self.operation_timeout, &ctx, statement, &[]).await;
        self.permit.lock().take();
        result.map(|_| ())
    }
}

#[async_trait]
impl SqlExecutor for SqliteTransaction {
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        self.ensure_open()?;
        execute_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }

    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow> {
        self.ensure_open()?;
        fetch_one_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        self.ensure_open()?;
        fetch_all_on(&self.shared, self.operation_timeout, ctx, query, args).await
    }
}

#[async_trait]
impl TransactionExecutor for SqliteTransaction {
    async fn commit(&self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // Best-effort cleanup since Drop cannot be async
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::warn!("SQLite transaction dropped without commit or rollback; rolling back");
        match self.shared.conn.try_lock_for(DROP_ROLLBACK_WAIT) {
            Some(conn) => {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %e, "rollback of dropped SQLite transaction failed");
                }
            }
            None => {
                tracing::error!("connection busy, dropped SQLite transaction was not rolled back");
            }
        }
        // The connection permit is released when the fields drop
    }
}
