//! Table and column mappings
//!
//! A [`TableMap`] is derived once from a record type's field list and then tuned
//! through mutating setters during setup. The statements the CRUD engine runs are
//! compiled into [`BindPlan`]s on first use and cached on the table mapping; any
//! mutable access to the mapping drops the cached plans.

use super::database_types::DatabaseType;
use super::dialect::{Dialect, KeyRetrieval};
use super::error::{DatabaseError, Result};
use super::record::{FieldDef, FieldKind, Record};
use super::value::DatabaseValue;
use serde::Serialize;
use std::any::TypeId;
use std::sync::OnceLock;

/// Mapping of one record field to one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    /// Column name in the database
    pub column_name: String,
    /// Field identifier on the record
    pub field_name: &'static str,
    /// Abstract column type
    pub kind: FieldKind,
    /// Whether the field accepts NULL
    pub nullable: bool,
    /// Part of the primary key
    pub is_key: bool,
    /// Generated by the database on insert
    pub is_auto_incr: bool,
    /// Excluded from every generated statement
    pub transient: bool,
    /// Carries a unique constraint
    pub unique: bool,
    /// Optimistic-locking version column
    pub is_version: bool,
    /// Maximum length for string and byte values, 0 when unset
    pub max_size: usize,
    /// Column definition used verbatim by `create table`
    pub sql_create: Option<String>,
}

impl ColumnMap {
    /// Build the default mapping for a declared field
    pub fn from_field(field: &FieldDef) -> Self {
        let column_name = match field.column {
            Some(column) => column.to_string(),
            None => field.name.to_lowercase(),
        };
        Self {
            is_version: field.name.eq_ignore_ascii_case("version"),
            column_name,
            field_name: field.name,
            kind: field.kind,
            nullable: field.nullable,
            is_key: false,
            is_auto_incr: false,
            transient: false,
            unique: false,
            max_size: 0,
            sql_create: None,
        }
    }

    /// Change the column name
    pub fn rename<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.column_name = name.into();
        self
    }

    /// Exclude the column from generated statements
    pub fn set_transient(&mut self, transient: bool) -> &mut Self {
        self.transient = transient;
        self
    }

    /// Add a unique constraint when the table is created
    pub fn set_unique(&mut self, unique: bool) -> &mut Self {
        self.unique = unique;
        self
    }

    /// Limit the length of string and byte values
    pub fn set_max_size(&mut self, size: usize) -> &mut Self {
        self.max_size = size;
        self
    }

    /// Use a custom column definition in `create table`
    pub fn set_sql_create<S: Into<String>>(&mut self, sql: S) -> &mut Self {
        self.sql_create = Some(sql.into());
        self
    }

    fn matches(&self, name: &str) -> bool {
        self.field_name.eq_ignore_ascii_case(name) || self.column_name.eq_ignore_ascii_case(name)
    }
}

/// Argument source of a compiled statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindArg {
    /// Current value of a record field
    Field(&'static str),
    /// Version value a new row starts with
    InitialVersion,
    /// Version value the row is expected to carry
    OldVersion,
    /// Version value the row moves to
    NewVersion,
}

/// A compiled statement and the order its arguments are read in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPlan {
    /// Statement text in the dialect's syntax
    pub query: String,
    /// Argument sources, in placeholder order
    pub args: Vec<BindArg>,
    /// Field receiving the generated key, for inserts into auto-increment tables
    pub key_field: Option<&'static str>,
    /// How the generated key is read back
    pub key_retrieval: Option<KeyRetrieval>,
}

impl BindPlan {
    /// Collect the argument values for `record`
    ///
    /// `version` is the record's current version when the table has a version
    /// column.
    pub fn bind_args(&self, record: &dyn Record, version: Option<i64>) -> Result<Vec<DatabaseValue>> {
        let current = version.unwrap_or(0);
        self.args
            .iter()
            .map(|arg| match arg {
                BindArg::Field(field) => record.get_field(field).ok_or_else(|| {
                    DatabaseError::configuration(format!(
                        "{} has no mapped field {}",
                        record.record_type_name(),
                        field
                    ))
                }),
                BindArg::InitialVersion => Ok(DatabaseValue::Long(1)),
                BindArg::OldVersion => Ok(DatabaseValue::Long(current)),
                BindArg::NewVersion => Ok(DatabaseValue::Long(current + 1)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct PlanSet {
    insert: OnceLock<BindPlan>,
    update: OnceLock<BindPlan>,
    delete: OnceLock<BindPlan>,
    get: OnceLock<BindPlan>,
}

/// Compiled plans, one set per database type
#[derive(Debug, Clone, Default)]
struct PlanCache {
    sets: [PlanSet; 4],
}

impl PlanCache {
    fn for_dialect(&self, dialect: &dyn Dialect) -> &PlanSet {
        let idx = match dialect.database_type() {
            DatabaseType::None => 0,
            DatabaseType::Postgres => 1,
            DatabaseType::Mysql => 2,
            DatabaseType::Sqlite => 3,
        };
        &self.sets[idx]
    }
}

/// Mapping of one record type to one table
#[derive(Debug, Clone, Serialize)]
pub struct TableMap {
    table_name: String,
    #[serde(skip)]
    type_id: TypeId,
    type_name: &'static str,
    columns: Vec<ColumnMap>,
    #[serde(skip)]
    plans: PlanCache,
}

impl TableMap {
    /// Derive the mapping for record type `T`
    ///
    /// The table name defaults to the lower-cased type name.
    pub fn derive<T: Record>(table_name: Option<String>) -> Self {
        let type_name = std::any::type_name::<T>();
        let table_name = table_name.unwrap_or_else(|| default_table_name(type_name));
        let columns = T::fields().iter().map(ColumnMap::from_field).collect();
        Self {
            table_name,
            type_id: TypeId::of::<T>(),
            type_name,
            columns,
            plans: PlanCache::default(),
        }
    }

    /// Table name in the database
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Change the table name
    pub fn set_table_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.plans = PlanCache::default();
        self.table_name = name.into();
        self
    }

    /// Identity of the mapped record type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the mapped record type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Column mappings in declaration order
    pub fn columns(&self) -> &[ColumnMap] {
        &self.columns
    }

    /// Primary key columns
    pub fn keys(&self) -> impl Iterator<Item = &ColumnMap> {
        self.columns.iter().filter(|c| c.is_key)
    }

    /// The version column, if the table has one
    pub fn version_col(&self) -> Option<&ColumnMap> {
        self.columns.iter().find(|c| c.is_version && !c.transient)
    }

    /// The single auto-increment key column, if any
    pub fn auto_incr_key(&self) -> Option<&ColumnMap> {
        let mut keys = self.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) if key.is_auto_incr => Some(key),
            _ => None,
        }
    }

    /// Find a column by field or column name, ignoring case
    pub fn find_column(&self, name: &str) -> Option<&ColumnMap> {
        self.columns.iter().find(|c| c.matches(name))
    }

    /// Mutable access to a column by field or column name, ignoring case
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when no column matches.
    pub fn try_col_map(&mut self, name: &str) -> Result<&mut ColumnMap> {
        self.plans = PlanCache::default();
        let table = &self.table_name;
        self.columns
            .iter_mut()
            .find(|c| c.matches(name))
            .ok_or_else(|| {
                DatabaseError::configuration(format!("no column {} in table {}", name, table))
            })
    }

    /// Mutable access to a column by field or column name, ignoring case
    ///
    /// # Panics
    ///
    /// Panics when no column matches. Use [`TableMap::try_col_map`] to handle the
    /// error instead.
    pub fn col_map(&mut self, name: &str) -> &mut ColumnMap {
        match self.try_col_map(name) {
            Ok(col) => col,
            Err(err) => panic!("{}", err),
        }
    }

    /// Set the primary key columns, replacing any previous key
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an unknown column, or when `auto_incr` is
    /// requested for a composite key.
    pub fn try_set_keys(&mut self, auto_incr: bool, names: &[&str]) -> Result<&mut Self> {
        if auto_incr && names.len() > 1 {
            return Err(DatabaseError::configuration(format!(
                "auto-increment requires a single key column in table {}",
                self.table_name
            )));
        }
        for col in self.columns.iter_mut() {
            col.is_key = false;
            col.is_auto_incr = false;
        }
        for name in names {
            let col = self.try_col_map(name)?;
            col.is_key = true;
            col.is_auto_incr = auto_incr;
        }
        Ok(self)
    }

    /// Set the primary key columns, replacing any previous key
    ///
    /// # Panics
    ///
    /// Panics on an unknown column or an auto-increment composite key.
    pub fn set_keys(&mut self, auto_incr: bool, names: &[&str]) -> &mut Self {
        if let Err(err) = self.try_set_keys(auto_incr, names) {
            panic!("{}", err);
        }
        self
    }

    /// Make `name` the table's only version column
    ///
    /// # Panics
    ///
    /// Panics when no column matches.
    pub fn set_version_col(&mut self, name: &str) -> &mut ColumnMap {
        if self.find_column(name).is_none() {
            panic!("no column {} in table {}", name, self.table_name);
        }
        for col in self.columns.iter_mut() {
            col.is_version = col.matches(name);
        }
        self.col_map(name)
    }

    fn validate(&self) -> Result<()> {
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i]
                .iter()
                .any(|other| other.column_name.eq_ignore_ascii_case(&col.column_name))
            {
                return Err(DatabaseError::configuration(format!(
                    "duplicate column {} in table {}",
                    col.column_name, self.table_name
                )));
            }
        }
        Ok(())
    }

    fn require_keys(&self, operation: &str) -> Result<()> {
        if self.keys().next().is_none() {
            return Err(DatabaseError::configuration(format!(
                "{} requires a primary key on table {}",
                operation, self.table_name
            )));
        }
        Ok(())
    }

    /// Compiled insert statement
    pub fn insert_plan(&self, dialect: &dyn Dialect) -> Result<&BindPlan> {
        let cached = &self.plans.for_dialect(dialect).insert;
        if let Some(plan) = cached.get() {
            return Ok(plan);
        }
        self.validate()?;

        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut args = Vec::new();
        let mut key_field = None;
        let mut suffix = String::new();

        for col in self.columns.iter().filter(|c| !c.transient) {
            columns.push(dialect.quote_field(&col.column_name));
            if col.is_auto_incr {
                values.push(dialect.auto_incr_bind_value().to_string());
                key_field = Some(col.field_name);
                suffix = dialect.auto_incr_insert_suffix(col);
            } else {
                values.push(dialect.bind_var(args.len()));
                args.push(if col.is_version {
                    BindArg::InitialVersion
                } else {
                    BindArg::Field(col.field_name)
                });
            }
        }

        let retrieval = key_field.map(|_| dialect.key_retrieval());
        if retrieval != Some(KeyRetrieval::Returning) {
            suffix.clear();
        }

        let query = format!(
            "insert into {} ({}) values ({}){};",
            dialect.quote_field(&self.table_name),
            columns.join(","),
            values.join(","),
            suffix
        );

        Ok(cached.get_or_init(|| BindPlan {
            query,
            args,
            key_field,
            key_retrieval: retrieval,
        }))
    }

    /// Compiled update statement
    pub fn update_plan(&self, dialect: &dyn Dialect) -> Result<&BindPlan> {
        let cached = &self.plans.for_dialect(dialect).update;
        if let Some(plan) = cached.get() {
            return Ok(plan);
        }
        self.validate()?;
        self.require_keys("update")?;

        let mut sets = Vec::new();
        let mut args = Vec::new();
        for col in self.columns.iter().filter(|c| !c.transient && !c.is_key) {
            sets.push(format!(
                "{} = {}",
                dialect.quote_field(&col.column_name),
                dialect.bind_var(args.len())
            ));
            args.push(if col.is_version {
                BindArg::NewVersion
            } else {
                BindArg::Field(col.field_name)
            });
        }
        let filter = self.where_clause(dialect, &mut args);

        let query = format!(
            "update {} set {} where {};",
            dialect.quote_field(&self.table_name),
            sets.join(", "),
            filter
        );

        Ok(cached.get_or_init(|| BindPlan {
            query,
            args,
            key_field: None,
            key_retrieval: None,
        }))
    }

    /// Compiled delete statement
    pub fn delete_plan(&self, dialect: &dyn Dialect) -> Result<&BindPlan> {
        let cached = &self.plans.for_dialect(dialect).delete;
        if let Some(plan) = cached.get() {
            return Ok(plan);
        }
        self.validate()?;
        self.require_keys("delete")?;

        let mut args = Vec::new();
        let filter = self.where_clause(dialect, &mut args);
        let query = format!(
            "delete from {} where {};",
            dialect.quote_field(&self.table_name),
            filter
        );

        Ok(cached.get_or_init(|| BindPlan {
            query,
            args,
            key_field: None,
            key_retrieval: None,
        }))
    }

    /// Compiled select-by-key statement
    ///
    /// Its arguments are the key values in key order; `args` lists the key fields.
    pub fn get_plan(&self, dialect: &dyn Dialect) -> Result<&BindPlan> {
        let cached = &self.plans.for_dialect(dialect).get;
        if let Some(plan) = cached.get() {
            return Ok(plan);
        }
        self.validate()?;
        self.require_keys("get")?;

        let columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !c.transient)
            .map(|c| dialect.quote_field(&c.column_name))
            .collect();

        let mut args = Vec::new();
        let mut filters = Vec::new();
        for key in self.keys() {
            filters.push(format!(
                "{} = {}",
                dialect.quote_field(&key.column_name),
                dialect.bind_var(args.len())
            ));
            args.push(BindArg::Field(key.field_name));
        }

        let query = format!(
            "select {} from {} where {};",
            columns.join(","),
            dialect.quote_field(&self.table_name),
            filters.join(" and ")
        );

        Ok(cached.get_or_init(|| BindPlan {
            query,
            args,
            key_field: None,
            key_retrieval: None,
        }))
    }

    fn where_clause(&self, dialect: &dyn Dialect, args: &mut Vec<BindArg>) -> String {
        let mut filters = Vec::new();
        for key in self.keys() {
            filters.push(format!(
                "{} = {}",
                dialect.quote_field(&key.column_name),
                dialect.bind_var(args.len())
            ));
            args.push(BindArg::Field(key.field_name));
        }
        if let Some(version) = self.version_col() {
            filters.push(format!(
                "{} = {}",
                dialect.quote_field(&version.column_name),
                dialect.bind_var(args.len())
            ));
            args.push(BindArg::OldVersion);
        }
        filters.join(" and ")
    }
}

fn default_table_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}
