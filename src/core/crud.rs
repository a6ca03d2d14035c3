//! CRUD engine
//!
//! Stateless operations shared by [`DbMap`] and
//! [`Transaction`](super::transaction::Transaction). Each one takes the mapper for
//! table lookup and the executor the statements run on, which is already wrapped
//! for tracing by the caller.

use super::context::Context;
use super::database::SqlExecutor;
use super::dbmap::DbMap;
use super::dialect::KeyRetrieval;
use super::error::{DatabaseError, Result};
use super::mapping::TableMap;
use super::record::Record;
use super::value::{DatabaseRow, DatabaseValue};
use std::any::TypeId;

/// Insert every record in order
pub(crate) async fn insert(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    records: &mut [&mut dyn Record],
) -> Result<()> {
    for record in records.iter_mut() {
        let record: &mut dyn Record = &mut **record;
        ctx.check()?;

        if let Some(hooks) = record.hooks() {
            hooks.pre_insert(ctx, exec).await?;
        }

        let table = dbmap.table_for_record(record)?;
        if let Some(key) = table.auto_incr_key() {
            if !key.kind.is_integer() {
                return Err(DatabaseError::configuration(format!(
                    "auto-increment key {} of table {} is not an integer column",
                    key.column_name, table.table_name()
                )));
            }
        }
        check_max_size(table, record)?;

        let plan = table.insert_plan(dbmap.dialect())?;
        let args = plan.bind_args(record, None)?;

        match (plan.key_field, plan.key_retrieval) {
            (Some(field), Some(KeyRetrieval::Returning)) => {
                let row = exec.fetch_one(ctx, &plan.query, &args).await?;
                let value = row.into_values().next().ok_or_else(|| {
                    DatabaseError::query(format!(
                        "insert into {} returned no generated key",
                        table.table_name()
                    ))
                })?;
                record.set_field(field, value)?;
            }
            (Some(field), _) => {
                let result = exec.execute(ctx, &plan.query, &args).await?;
                let id = result.last_insert_id.ok_or_else(|| {
                    DatabaseError::query(format!(
                        "driver reported no generated key for table {}",
                        table.table_name()
                    ))
                })?;
                record.set_field(field, DatabaseValue::Long(id))?;
            }
            (None, _) => {
                exec.execute(ctx, &plan.query, &args).await?;
            }
        }

        if let Some(version) = table.version_col() {
            record.set_field(version.field_name, DatabaseValue::Long(1))?;
        }

        if let Some(hooks) = record.hooks() {
            hooks.post_insert(ctx, exec).await?;
        }
    }
    Ok(())
}

/// Update every record in order, returning the total number of rows changed
pub(crate) async fn update(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    records: &mut [&mut dyn Record],
) -> Result<i64> {
    let mut total = 0;
    for record in records.iter_mut() {
        let record: &mut dyn Record = &mut **record;
        ctx.check()?;

        if let Some(hooks) = record.hooks() {
            hooks.pre_update(ctx, exec).await?;
        }

        let table = dbmap.table_for_record(record)?;
        check_max_size(table, record)?;

        let plan = table.update_plan(dbmap.dialect())?;
        let version = current_version(table, record)?;
        let args = plan.bind_args(record, version)?;

        let rows = exec.execute(ctx, &plan.query, &args).await?.rows_affected as i64;

        if let (Some(col), Some(old)) = (table.version_col(), version) {
            if rows == 0 {
                tracing::debug!(
                    table = %table.table_name(),
                    version = old,
                    "update matched no row at the expected version"
                );
                return Err(DatabaseError::OptimisticLock);
            }
            if rows == 1 {
                record.set_field(col.field_name, DatabaseValue::Long(old + 1))?;
            }
        }

        if let Some(hooks) = record.hooks() {
            hooks.post_update(ctx, exec).await?;
        }
        total += rows;
    }
    Ok(total)
}

/// Delete every record in order, returning the total number of rows removed
pub(crate) async fn delete(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    records: &mut [&mut dyn Record],
) -> Result<i64> {
    let mut total = 0;
    for record in records.iter_mut() {
        let record: &mut dyn Record = &mut **record;
        ctx.check()?;

        if let Some(hooks) = record.hooks() {
            hooks.pre_delete(ctx, exec).await?;
        }

        let table = dbmap.table_for_record(record)?;
        let plan = table.delete_plan(dbmap.dialect())?;
        let version = current_version(table, record)?;
        let args = plan.bind_args(record, version)?;

        let rows = exec.execute(ctx, &plan.query, &args).await?.rows_affected as i64;

        if rows == 0 && version.is_some() {
            tracing::debug!(
                table = %table.table_name(),
                "delete matched no row at the expected version"
            );
            return Err(DatabaseError::OptimisticLock);
        }

        if let Some(hooks) = record.hooks() {
            hooks.post_delete(ctx, exec).await?;
        }
        total += rows;
    }
    Ok(total)
}

/// Load one record of type `T` by primary key
pub(crate) async fn get<T: Record + Default>(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    keys: &[DatabaseValue],
) -> Result<T> {
    ctx.check()?;
    let table = dbmap.table_for_type(TypeId::of::<T>(), std::any::type_name::<T>())?;
    let plan = table.get_plan(dbmap.dialect())?;
    if keys.len() != plan.args.len() {
        return Err(DatabaseError::configuration(format!(
            "table {} has {} key column(s) but {} key value(s) were given",
            table.table_name(),
            plan.args.len(),
            keys.len()
        )));
    }

    let row = exec.fetch_one(ctx, &plan.query, keys).await?;
    let mut record = T::default();
    bind_row(table, &mut record, row)?;
    if let Some(hooks) = record.hooks() {
        hooks.post_get(ctx, exec).await?;
    }
    Ok(record)
}

/// Run a query and bind every row into a new `T`
pub(crate) async fn select<T: Record + Default>(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    query: &str,
    args: &[DatabaseValue],
) -> Result<Vec<T>> {
    ctx.check()?;
    let rows = exec.fetch_all(ctx, query, args).await?;

    let derived;
    let table = match dbmap.find_table(TypeId::of::<T>()) {
        Some(table) => table,
        None => {
            derived = TableMap::derive::<T>(None);
            &derived
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = T::default();
        bind_row(table, &mut record, row)?;
        if let Some(hooks) = record.hooks() {
            hooks.post_get(ctx, exec).await?;
        }
        records.push(record);
    }
    Ok(records)
}

/// Run a query and bind its first row into a new `T`
pub(crate) async fn select_one<T: Record + Default>(
    ctx: &Context,
    dbmap: &DbMap,
    exec: &dyn SqlExecutor,
    query: &str,
    args: &[DatabaseValue],
) -> Result<T> {
    ctx.check()?;
    let row = exec.fetch_one(ctx, query, args).await?;

    let derived;
    let table = match dbmap.find_table(TypeId::of::<T>()) {
        Some(table) => table,
        None => {
            derived = TableMap::derive::<T>(None);
            &derived
        }
    };

    let mut record = T::default();
    bind_row(table, &mut record, row)?;
    if let Some(hooks) = record.hooks() {
        hooks.post_get(ctx, exec).await?;
    }
    Ok(record)
}

/// Copy a result row into a record, matching columns case-insensitively
///
/// Values for transient columns are dropped.
fn bind_row(table: &TableMap, record: &mut dyn Record, row: DatabaseRow) -> Result<()> {
    for (column, value) in row {
        let col = table.find_column(&column).ok_or_else(|| {
            DatabaseError::configuration(format!(
                "missing destination for column {} in {}",
                column,
                table.type_name()
            ))
        })?;
        if col.transient {
            continue;
        }
        record.set_field(col.field_name, value)?;
    }
    Ok(())
}

fn check_max_size(table: &TableMap, record: &dyn Record) -> Result<()> {
    for col in table
        .columns()
        .iter()
        .filter(|c| !c.transient && c.max_size > 0)
    {
        let size = record
            .get_field(col.field_name)
            .as_ref()
            .and_then(DatabaseValue::size);
        if let Some(actual) = size {
            if actual > col.max_size {
                return Err(DatabaseError::ValueTooLong {
                    column: col.column_name.clone(),
                    max: col.max_size,
                    actual,
                });
            }
        }
    }
    Ok(())
}

fn current_version(table: &TableMap, record: &dyn Record) -> Result<Option<i64>> {
    let Some(col) = table.version_col() else {
        return Ok(None);
    };
    let value = record.get_field(col.field_name).unwrap_or(DatabaseValue::Null);
    value
        .as_long()
        .map(Some)
        .ok_or_else(|| DatabaseError::type_mismatch("integer version", value.type_name()))
}
