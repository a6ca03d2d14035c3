//! PostgreSQL database backend implementation
//!
//! This module provides a PostgreSQL implementation of the executor traits using
//! tokio-postgres. Statements are prepared first so arguments can be converted to
//! the parameter types the server expects. A statement that outlives its context
//! or the operation timeout is cancelled on the server through the client's
//! cancel token.

use crate::core::{
    context::Context,
    database::{Connection, ExecResult, SqlExecutor, TransactionExecutor},
    database_types::DatabaseType,
    error::{DatabaseError, Result},
    value::{DatabaseResult, DatabaseRow, DatabaseValue},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{CancelToken, Client, NoTls, Row, Statement};

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    client: Arc<Mutex<Client>>,
    cancel_token: CancelToken,
    operation_timeout: Duration,
}

impl PostgresDatabase {
    /// Connect using a libpq-style connection string
    ///
    /// # Errors
    ///
    /// Returns the driver error if the server refuses the connection, or
    /// `ConnectionTimeout` if connecting takes longer than the operation timeout.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let connect_future = tokio_postgres::connect(connection_string, NoTls);

        let (client, connection) = tokio::time::timeout(DEFAULT_OPERATION_TIMEOUT, connect_future)
            .await
            .map_err(|_| {
                DatabaseError::connection_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64)
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "failed to connect to PostgreSQL");
                DatabaseError::connection(e.to_string())
            })?;

        // Spawn the connection handler in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Self {
            cancel_token: client.cancel_token(),
            client: Arc::new(Mutex::new(client)),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// Set the timeout applied to every statement
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    async fn lock(&self, ctx: &Context) -> Result<OwnedMutexGuard<Client>> {
        let client = Arc::clone(&self.client);
        tokio::select! {
            guard = client.lock_owned() => Ok(guard),
            err = ctx.done() => Err(err),
        }
    }
}

/// Convert a tokio_postgres Row to a DatabaseRow
fn row_to_database_row(row: &Row) -> Result<DatabaseRow> {
    let mut db_row = DatabaseRow::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let column_name = column.name().to_string();
        let value = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(idx)?
                .map(DatabaseValue::Bool),
            "int2" => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| DatabaseValue::Int(v as i32)),
            "int4" => row
                .try_get::<_, Option<i32>>(idx)?
                .map(DatabaseValue::Int),
            "int8" => row
                .try_get::<_, Option<i64>>(idx)?
                .map(DatabaseValue::Long),
            "float4" => row
                .try_get::<_, Option<f32>>(idx)?
                .map(DatabaseValue::Float),
            "float8" => row
                .try_get::<_, Option<f64>>(idx)?
                .map(DatabaseValue::Double),
            "bytea" => row
                .try_get::<_, Option<Vec<u8>>>(idx)?
                .map(DatabaseValue::Bytes),
            "timestamptz" => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)?
                .map(DatabaseValue::from),
            "timestamp" => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(|v| DatabaseValue::from(v.and_utc())),
            // Text types and anything else readable as a string
            _ => row
                .try_get::<_, Option<String>>(idx)?
                .map(DatabaseValue::String),
        };
        db_row.insert(column_name, value.unwrap_or(DatabaseValue::Null));
    }

    Ok(db_row)
}

fn boxed<T: ToSql + Sync + Send + 'static>(value: Option<T>) -> Option<Param> {
    value.map(|v| Box::new(v) as Param)
}

/// Typed NULL for a parameter of type `ty`
fn null_param(ty: &Type) -> Param {
    match ty.name() {
        "bool" => Box::new(None::<bool>),
        "int2" => Box::new(None::<i16>),
        "int4" => Box::new(None::<i32>),
        "int8" => Box::new(None::<i64>),
        "float4" => Box::new(None::<f32>),
        "float8" => Box::new(None::<f64>),
        "bytea" => Box::new(None::<Vec<u8>>),
        "timestamptz" => Box::new(None::<DateTime<Utc>>),
        "timestamp" => Box::new(None::<NaiveDateTime>),
        _ => Box::new(None::<String>),
    }
}

/// Convert DatabaseValue without a target type
fn raw_param(value: &DatabaseValue) -> Param {
    match value {
        DatabaseValue::Null => Box::new(None::<String>),
        DatabaseValue::Bool(v) => Box::new(*v),
        DatabaseValue::Int(v) => Box::new(*v),
        DatabaseValue::Long(v) => Box::new(*v),
        DatabaseValue::Float(v) => Box::new(*v),
        DatabaseValue::Double(v) => Box::new(*v),
        DatabaseValue::String(v) => Box::new(v.clone()),
        DatabaseValue::Bytes(v) => Box::new(v.clone()),
        DatabaseValue::Timestamp(v) => Box::new(*v),
    }
}

/// Convert DatabaseValue to the parameter type the statement expects
fn value_to_param(value: &DatabaseValue, ty: &Type) -> Param {
    if value.is_null() {
        return null_param(ty);
    }
    let converted = match ty.name() {
        "bool" => boxed(value.as_bool()),
        "int2" => boxed(value.as_long().and_then(|v| i16::try_from(v).ok())),
        "int4" => boxed(value.as_int()),
        "int8" => boxed(value.as_long()),
        "float4" => boxed(value.as_float()),
        "float8" => boxed(value.as_double()),
        "bytea" => boxed(value.as_bytes().map(<[u8]>::to_vec)),
        "timestamptz" => boxed(value.as_timestamp()),
        "timestamp" => boxed(value.as_timestamp().map(|v| v.naive_utc())),
        "text" | "varchar" | "bpchar" | "name" => match value {
            DatabaseValue::Bytes(_) => None,
            other => boxed(Some(other.as_string())),
        },
        _ => None,
    };
    converted.unwrap_or_else(|| raw_param(value))
}

fn bind_params(stmt: &Statement, args: &[DatabaseValue]) -> Result<Vec<Param>> {
    if stmt.params().len() != args.len() {
        return Err(DatabaseError::query(format!(
            "statement expects {} parameter(s) but {} were given",
            stmt.params().len(),
            args.len()
        )));
    }
    Ok(args
        .iter()
        .zip(stmt.params())
        .map(|(value, ty)| value_to_param(value, ty))
        .collect())
}

fn param_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Race a statement against the context and the timeout
///
/// The server-side statement is cancelled when the statement loses.
async fn guarded<T, F>(ctx: &Context, timeout: Duration, token: &CancelToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.check()?;
    let err = tokio::select! {
        result = fut => return result,
        err = ctx.done() => err,
        _ = tokio::time::sleep(timeout) => DatabaseError::query_timeout(timeout.as_millis() as u64),
    };
    if let Err(e) = token.cancel_query(NoTls).await {
        tracing::warn!(error = %e, "failed to cancel PostgreSQL statement");
    }
    Err(err)
}

async fn execute_on(client: &Client, query: &str, args: &[DatabaseValue]) -> Result<ExecResult> {
    let stmt = client.prepare(query).await?;
    let params = bind_params(&stmt, args)?;
    let rows = client.execute(&stmt, &param_refs(&params)).await?;
    Ok(ExecResult {
        rows_affected: rows,
        last_insert_id: None,
    })
}

async fn fetch_all_on(client: &Client, query: &str, args: &[DatabaseValue]) -> Result<DatabaseResult> {
    let stmt = client.prepare(query).await?;
    let params = bind_params(&stmt, args)?;
    let rows = client.query(&stmt, &param_refs(&params)).await?;
    rows.iter().map(row_to_database_row).collect()
}

async fn fetch_one_on(client: &Client, query: &str, args: &[DatabaseValue]) -> Result<DatabaseRow> {
    let stmt = client.prepare(query).await?;
    let params = bind_params(&stmt, args)?;
    let rows = client.query(&stmt, &param_refs(&params)).await?;
    match rows.first() {
        Some(row) => row_to_database_row(row),
        None => Err(DatabaseError::NoRows),
    }
}

#[async_trait]
impl SqlExecutor for PostgresDatabase {
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        let client = self.lock(ctx).await?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, execute_on(&client, query, args))
            .await
    }

    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow> {
        let client = self.lock(ctx).await?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, fetch_one_on(&client, query, args))
            .await
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let client = self.lock(ctx).await?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, fetch_all_on(&client, query, args))
            .await
    }
}

#[async_trait]
impl Connection for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn begin(&self, ctx: &Context) -> Result<Box<dyn TransactionExecutor>> {
        let client = self.lock(ctx).await?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, async {
            client.batch_execute("BEGIN").await?;
            Ok(())
        })
        .await?;

        Ok(Box::new(PostgresTransaction {
            client: Mutex::new(Some(client)),
            cancel_token: self.cancel_token.clone(),
            operation_timeout: self.operation_timeout,
            finished: AtomicBool::new(false),
        }))
    }
}

/// An open PostgreSQL transaction
///
/// Holds the client exclusively until it ends.
pub struct PostgresTransaction {
    client: Mutex<Option<OwnedMutexGuard<Client>>>,
    cancel_token: CancelToken,
    operation_timeout: Duration,
    finished: AtomicBool,
}

impl PostgresTransaction {
    async fn finish(&self, statement: &str) -> Result<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(DatabaseError::transaction_done());
        }
        let client = self
            .client
            .lock()
            .await
            .take()
            .ok_or_else(DatabaseError::transaction_done)?;
        let ctx = Context::background();
        guarded(&ctx, self.operation_timeout, &self.cancel_token, async {
            client.batch_execute(statement).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SqlExecutor for PostgresTransaction {
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DatabaseError::transaction_done)?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, execute_on(client, query, args))
            .await
    }

    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DatabaseError::transaction_done)?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, fetch_one_on(client, query, args))
            .await
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DatabaseError::transaction_done)?;
        guarded(ctx, self.operation_timeout, &self.cancel_token, fetch_all_on(client, query, args))
            .await
    }
}

#[async_trait]
impl TransactionExecutor for PostgresTransaction {
    async fn commit(&self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        // Best-effort cleanup since Drop cannot be async
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(client) = self.client.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("PostgreSQL transaction dropped without commit or rollback; rolling back");
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::error!(error = %e, "rollback of dropped PostgreSQL transaction failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    "PostgreSQL transaction dropped outside a tokio runtime and was not rolled back"
                );
            }
        }
    }
}

#[cfg(all(test, feature = "postgres"))]
mod tests {
    use super::*;

    fn get_postgres_url() -> Option<String> {
        std::env::var("POSTGRES_URL").ok()
    }

    #[test]
    fn test_value_to_param_uses_target_type() {
        let param = value_to_param(&DatabaseValue::Long(7), &Type::INT4);
        assert!(<i32 as ToSql>::accepts(&Type::INT4));
        assert!(format!("{:?}", param).contains('7'));

        let param = value_to_param(&DatabaseValue::Null, &Type::VARCHAR);
        assert_eq!(format!("{:?}", param), "None");
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_execute_and_fetch() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let ctx = Context::background();
        let db = PostgresDatabase::connect(&url).await?;

        db.execute(&ctx, "DROP TABLE IF EXISTS test_execute", &[]).await?;
        db.execute(
            &ctx,
            "CREATE TABLE test_execute (id SERIAL PRIMARY KEY, name TEXT)",
            &[],
        )
        .await?;

        let row = db
            .fetch_one(
                &ctx,
                "INSERT INTO test_execute (name) VALUES ($1) RETURNING id",
                &["Alice".into()],
            )
            .await?;
        assert_eq!(row.get("id"), Some(&DatabaseValue::Int(1)));

        let rows = db
            .fetch_all(&ctx, "SELECT * FROM test_execute WHERE id = $1", &[DatabaseValue::Long(1)])
            .await?;
        assert_eq!(rows.len(), 1);

        db.execute(&ctx, "DROP TABLE test_execute", &[]).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test --features postgres -- --ignored
    async fn test_postgres_transaction() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let ctx = Context::background();
        let db = PostgresDatabase::connect(&url).await?;

        db.execute(&ctx, "DROP TABLE IF EXISTS test_transaction", &[]).await?;
        db.execute(
            &ctx,
            "CREATE TABLE test_transaction (id SERIAL PRIMARY KEY, name TEXT)",
            &[],
        )
        .await?;

        let tx = db.begin(&ctx).await?;
        tx.execute(&ctx, "INSERT INTO test_transaction (name) VALUES ('Alice')", &[])
            .await?;
        tx.commit().await?;
        assert!(tx.commit().await.is_err());
        drop(tx);

        let tx = db.begin(&ctx).await?;
        tx.execute(&ctx, "INSERT INTO test_transaction (name) VALUES ('Bob')", &[])
            .await?;
        tx.rollback().await?;
        drop(tx);

        let results = db.fetch_all(&ctx, "SELECT * FROM test_transaction", &[]).await?;
        assert_eq!(results.len(), 1);

        db.execute(&ctx, "DROP TABLE test_transaction", &[]).await?;
        Ok(())
    }
}
