//! Mapping registry
//!
//! [`DbMap`] owns the connection, the dialect and the registered table mappings.
//! Tables are registered and configured through `&mut DbMap` during setup; once
//! setup is done the map is shared by reference and every CRUD call, DDL call and
//! transaction goes through it.

use super::context::Context;
use super::crud;
use super::database::{Connection, ExecResult, SqlExecutor};
use super::dialect::{dialect_for, Dialect};
use super::error::{DatabaseError, Result};
use super::handle::{TraceSink, Tracer, TracingExecutor};
use super::mapping::{ColumnMap, TableMap};
use super::record::Record;
use super::transaction::Transaction;
use super::value::DatabaseValue;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::Arc;

/// Registry of table mappings bound to one connection and dialect
///
/// # Example
///
/// ```rust,no_run
/// use rust_dbmap::prelude::*;
///
/// #[derive(Debug, Default)]
/// struct Invoice {
///     id: i64,
///     memo: String,
/// }
///
/// impl_record!(Invoice { id: i64, memo: String });
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let ctx = Context::background();
///     let conn = SqliteDatabase::connect(":memory:").await?;
///     let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
///     dbmap.add_table::<Invoice>().set_keys(true, &["id"]);
///     dbmap.create_tables(&ctx).await?;
///
///     let mut invoice = Invoice { id: 0, memo: "first".to_string() };
///     dbmap.insert(&ctx, &mut [&mut invoice]).await?;
///     let loaded: Invoice = dbmap.get(&ctx, &[invoice.id.into()]).await?;
///     assert_eq!(loaded.memo, "first");
///     Ok(())
/// }
/// ```
pub struct DbMap {
    conn: Box<dyn Connection>,
    dialect: Box<dyn Dialect>,
    tables: Vec<TableMap>,
    tracer: RwLock<Option<Tracer>>,
}

impl DbMap {
    /// Create a registry over a connection and dialect
    pub fn new(conn: Box<dyn Connection>, dialect: Box<dyn Dialect>) -> Self {
        Self {
            conn,
            dialect,
            tables: Vec::new(),
            tracer: RwLock::new(None),
        }
    }

    /// Create a registry using the default dialect for the connection's database type
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the connection reports no database type.
    pub fn with_default_dialect(conn: Box<dyn Connection>) -> Result<Self> {
        let dialect = dialect_for(conn.database_type()).ok_or_else(|| {
            DatabaseError::configuration(format!(
                "no dialect for database type {}",
                conn.database_type()
            ))
        })?;
        Ok(Self::new(conn, dialect))
    }

    /// Active dialect
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Underlying connection
    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// Register record type `T` under its default table name
    ///
    /// Registering a type again returns the existing mapping unchanged.
    pub fn add_table<T: Record>(&mut self) -> &mut TableMap {
        self.register::<T>(None)
    }

    /// Register record type `T` under an explicit table name
    ///
    /// Registering a type again returns the existing mapping unchanged.
    pub fn add_table_with_name<T: Record, S: Into<String>>(&mut self, name: S) -> &mut TableMap {
        self.register::<T>(Some(name.into()))
    }

    fn register<T: Record>(&mut self, name: Option<String>) -> &mut TableMap {
        let type_id = TypeId::of::<T>();
        let index = match self.tables.iter().position(|t| t.type_id() == type_id) {
            Some(index) => index,
            None => {
                self.tables.push(TableMap::derive::<T>(name));
                self.tables.len() - 1
            }
        };
        &mut self.tables[index]
    }

    /// Mapping registered for `T`, if any
    pub fn table_for<T: Record>(&self) -> Option<&TableMap> {
        self.find_table(TypeId::of::<T>())
    }

    /// Mutable mapping registered for `T`, if any
    pub fn table_for_mut<T: Record>(&mut self) -> Option<&mut TableMap> {
        let type_id = TypeId::of::<T>();
        self.tables.iter_mut().find(|t| t.type_id() == type_id)
    }

    /// All registered mappings in registration order
    pub fn tables(&self) -> &[TableMap] {
        &self.tables
    }

    pub(crate) fn find_table(&self, type_id: TypeId) -> Option<&TableMap> {
        self.tables.iter().find(|t| t.type_id() == type_id)
    }

    pub(crate) fn table_for_type(&self, type_id: TypeId, type_name: &str) -> Result<&TableMap> {
        self.find_table(type_id).ok_or_else(|| {
            DatabaseError::configuration(format!("no table registered for type {}", type_name))
        })
    }

    pub(crate) fn table_for_record(&self, record: &dyn Record) -> Result<&TableMap> {
        self.table_for_type(record.record_type(), record.record_type_name())
    }

    /// Start tracing every statement to `sink`, each line prefixed with `prefix`
    pub fn trace_on<S: Into<String>>(&self, prefix: S, sink: Arc<dyn TraceSink>) {
        *self.tracer.write() = Some(Tracer::new(prefix, sink));
    }

    /// Stop tracing
    pub fn trace_off(&self) {
        *self.tracer.write() = None;
    }

    pub(crate) fn trace(&self, query: &str, args: &[DatabaseValue]) {
        if let Some(tracer) = self.tracer.read().as_ref() {
            tracer.trace(query, args);
        }
    }

    fn handle(&self) -> TracingExecutor<'_, dyn Connection> {
        TracingExecutor::new(self, self.conn.as_ref())
    }

    /// Column definition as written by `create table`
    ///
    /// A custom create SQL set on the column is returned verbatim.
    pub fn column_sql(&self, table: &TableMap, col: &ColumnMap) -> String {
        if let Some(sql) = &col.sql_create {
            return sql.clone();
        }

        let dialect = self.dialect();
        let mut sql = format!(
            "{} {}",
            dialect.quote_field(&col.column_name),
            dialect.to_sql_type(col)
        );
        if !col.nullable {
            sql.push_str(" not null");
        }
        if col.is_key && table.keys().count() == 1 {
            sql.push_str(" primary key");
        }
        if col.is_auto_incr {
            let keyword = dialect.auto_incr_str();
            if !keyword.is_empty() {
                sql.push(' ');
                sql.push_str(keyword);
            }
        }
        if col.unique {
            sql.push_str(" unique");
        }
        sql
    }

    /// `create table` statement for a registered mapping
    pub fn create_table_sql(&self, table: &TableMap, if_not_exists: bool) -> String {
        let dialect = self.dialect();
        let mut defs: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !c.transient)
            .map(|c| self.column_sql(table, c))
            .collect();

        let keys: Vec<String> = table
            .keys()
            .map(|k| dialect.quote_field(&k.column_name))
            .collect();
        if keys.len() > 1 {
            defs.push(format!("primary key ({})", keys.join(", ")));
        }

        format!(
            "create table {}{} ({}){}",
            if if_not_exists { "if not exists " } else { "" },
            dialect.quote_field(table.table_name()),
            defs.join(", "),
            dialect.create_table_suffix()
        )
    }

    /// Create every registered table
    pub async fn create_tables(&self, ctx: &Context) -> Result<()> {
        self.create_all(ctx, false).await
    }

    /// Create every registered table that doesn't exist yet
    pub async fn create_tables_if_not_exists(&self, ctx: &Context) -> Result<()> {
        self.create_all(ctx, true).await
    }

    async fn create_all(&self, ctx: &Context, if_not_exists: bool) -> Result<()> {
        for table in &self.tables {
            let sql = self.create_table_sql(table, if_not_exists);
            self.exec(ctx, &sql, &[]).await?;
        }
        Ok(())
    }

    /// Drop every registered table that exists
    pub async fn drop_tables(&self, ctx: &Context) -> Result<()> {
        for table in &self.tables {
            let sql = format!(
                "drop table if exists {};",
                self.dialect.quote_field(table.table_name())
            );
            self.exec(ctx, &sql, &[]).await?;
        }
        Ok(())
    }

    /// Remove every row from every registered table
    pub async fn truncate_tables(&self, ctx: &Context) -> Result<()> {
        self.truncate_all(ctx, false).await
    }

    /// Remove every row and restart generated keys of every registered table
    pub async fn truncate_tables_identity_restart(&self, ctx: &Context) -> Result<()> {
        self.truncate_all(ctx, true).await
    }

    async fn truncate_all(&self, ctx: &Context, restart_identity: bool) -> Result<()> {
        for table in &self.tables {
            let restart = restart_identity && table.auto_incr_key().is_some();
            for sql in self
                .dialect
                .truncate_statements(table.table_name(), restart)
            {
                self.exec(ctx, &sql, &[]).await?;
            }
        }
        Ok(())
    }

    /// Begin a transaction
    pub async fn begin(&self, ctx: &Context) -> Result<Transaction<'_>> {
        self.trace("begin;", &[]);
        let tx = self.conn.begin(ctx).await?;
        Ok(Transaction::new(self, tx))
    }

    /// Insert records, filling in generated keys and initial versions
    ///
    /// Records may be of different registered types. Processing stops at the first
    /// error.
    pub async fn insert(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<()> {
        crud::insert(ctx, self, &self.handle(), records).await
    }

    /// Update records by primary key, returning the number of rows changed
    ///
    /// # Errors
    ///
    /// Returns `OptimisticLock` when a versioned record no longer matches its row.
    /// [`DatabaseError::rows_affected`] reports `-1` for that error.
    pub async fn update(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<i64> {
        crud::update(ctx, self, &self.handle(), records).await
    }

    /// Delete records by primary key, returning the number of rows removed
    pub async fn delete(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<i64> {
        crud::delete(ctx, self, &self.handle(), records).await
    }

    /// Load a record by primary key values, in key order
    ///
    /// # Errors
    ///
    /// Returns `NoRows` when no row matches.
    pub async fn get<T: Record + Default>(&self, ctx: &Context, keys: &[DatabaseValue]) -> Result<T> {
        crud::get(ctx, self, &self.handle(), keys).await
    }

    /// Run a query and bind every row into a `T`
    pub async fn select<T: Record + Default>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<Vec<T>> {
        crud::select(ctx, self, &self.handle(), query, args).await
    }

    /// Run a query and bind its first row into a `T`
    ///
    /// # Errors
    ///
    /// Returns `NoRows` when the query produces no rows.
    pub async fn select_one<T: Record + Default>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<T> {
        crud::select_one(ctx, self, &self.handle(), query, args).await
    }

    /// Execute a statement directly
    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        self.handle().execute(ctx, query, args).await
    }

    /// Close the underlying connection
    pub async fn close(self) -> Result<()> {
        self.conn.close().await
    }
}

impl std::fmt::Debug for DbMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbMap")
            .field("dialect", &self.dialect)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}
