//! Transactions
//!
//! A [`Transaction`] runs the same CRUD engine as [`DbMap`] against an open
//! transaction instead of the plain connection.

use super::context::Context;
use super::crud;
use super::database::{ExecResult, SqlExecutor, TransactionExecutor};
use super::dbmap::DbMap;
use super::error::Result;
use super::handle::TracingExecutor;
use super::record::Record;
use super::value::DatabaseValue;

/// An open transaction bound to a mapper
///
/// End it with [`Transaction::commit`] or [`Transaction::rollback`]. A transaction
/// dropped without either is rolled back by the backend on a best-effort basis.
///
/// # Example
///
/// ```ignore
/// let tx = dbmap.begin(&ctx).await?;
/// tx.insert(&ctx, &mut [&mut first, &mut second]).await?;
/// tx.commit().await?;
/// ```
pub struct Transaction<'a> {
    dbmap: &'a DbMap,
    tx: Box<dyn TransactionExecutor>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(dbmap: &'a DbMap, tx: Box<dyn TransactionExecutor>) -> Self {
        Self { dbmap, tx }
    }

    fn handle(&self) -> TracingExecutor<'_, dyn TransactionExecutor> {
        TracingExecutor::new(self.dbmap, self.tx.as_ref())
    }

    /// Same as [`DbMap::insert`], inside the transaction
    pub async fn insert(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<()> {
        crud::insert(ctx, self.dbmap, &self.handle(), records).await
    }

    /// Same as [`DbMap::update`], inside the transaction
    pub async fn update(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<i64> {
        crud::update(ctx, self.dbmap, &self.handle(), records).await
    }

    /// Same as [`DbMap::delete`], inside the transaction
    pub async fn delete(&self, ctx: &Context, records: &mut [&mut dyn Record]) -> Result<i64> {
        crud::delete(ctx, self.dbmap, &self.handle(), records).await
    }

    /// Same as [`DbMap::get`], inside the transaction
    pub async fn get<T: Record + Default>(&self, ctx: &Context, keys: &[DatabaseValue]) -> Result<T> {
        crud::get(ctx, self.dbmap, &self.handle(), keys).await
    }

    /// Same as [`DbMap::select`], inside the transaction
    pub async fn select<T: Record + Default>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<Vec<T>> {
        crud::select(ctx, self.dbmap, &self.handle(), query, args).await
    }

    /// Same as [`DbMap::select_one`], inside the transaction
    pub async fn select_one<T: Record + Default>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<T> {
        crud::select_one(ctx, self.dbmap, &self.handle(), query, args).await
    }

    /// Same as [`DbMap::exec`], inside the transaction
    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        self.handle().execute(ctx, query, args).await
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns a transaction error if the transaction already ended.
    pub async fn commit(&self) -> Result<()> {
        self.dbmap.trace("commit;", &[]);
        self.tx.commit().await
    }

    /// Roll the transaction back
    ///
    /// # Errors
    ///
    /// Returns a transaction error if the transaction already ended.
    pub async fn rollback(&self) -> Result<()> {
        self.dbmap.trace("rollback;", &[]);
        self.tx.rollback().await
    }
}
