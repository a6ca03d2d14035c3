//! SQL dialects
//!
//! A dialect is a stateless strategy for the SQL differences between engines:
//! placeholder syntax, identifier quoting, column types, generated keys and
//! table truncation. The mapper asks the dialect for every literal it emits.

use super::database_types::DatabaseType;
use super::mapping::ColumnMap;
use super::record::FieldKind;
use serde::{Deserialize, Serialize};

/// How the mapper reads a generated key back after an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRetrieval {
    /// Read the driver's last-insert-id after executing the statement
    LastInsertId,
    /// Append the dialect's insert suffix and read the key from the returned row
    Returning,
}

/// SQL dialect strategy
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Engine this dialect targets
    fn database_type(&self) -> DatabaseType;

    /// Column type used in `create table` for the given column
    fn to_sql_type(&self, col: &ColumnMap) -> String;

    /// Keyword appended to an auto-increment column definition
    fn auto_incr_str(&self) -> &'static str;

    /// Literal bound in place of an auto-increment column on insert
    fn auto_incr_bind_value(&self) -> &'static str;

    /// Text appended to an insert so it returns the generated key
    fn auto_incr_insert_suffix(&self, col: &ColumnMap) -> String;

    /// Strategy for reading generated keys
    fn key_retrieval(&self) -> KeyRetrieval;

    /// Text appended after the closing parenthesis of `create table`
    fn create_table_suffix(&self) -> String;

    /// Placeholder for the `i`th argument (0-based)
    fn bind_var(&self, i: usize) -> String;

    /// Quote an identifier
    fn quote_field(&self, field: &str) -> String;

    /// Statements that empty a table, optionally restarting its key sequence
    fn truncate_statements(&self, table: &str, restart_identity: bool) -> Vec<String>;
}

/// SQLite dialect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn to_sql_type(&self, col: &ColumnMap) -> String {
        match col.kind {
            FieldKind::Bool | FieldKind::SmallInt | FieldKind::Int | FieldKind::BigInt => {
                "integer".to_string()
            }
            FieldKind::Float | FieldKind::Double => "real".to_string(),
            FieldKind::Text => varchar(col.max_size),
            FieldKind::Bytes => "blob".to_string(),
            FieldKind::Timestamp => "datetime".to_string(),
        }
    }

    fn auto_incr_str(&self) -> &'static str {
        "autoincrement"
    }

    fn auto_incr_bind_value(&self) -> &'static str {
        "null"
    }

    fn auto_incr_insert_suffix(&self, _col: &ColumnMap) -> String {
        String::new()
    }

    fn key_retrieval(&self) -> KeyRetrieval {
        KeyRetrieval::LastInsertId
    }

    fn create_table_suffix(&self) -> String {
        ";".to_string()
    }

    fn bind_var(&self, _i: usize) -> String {
        "?".to_string()
    }

    fn quote_field(&self, field: &str) -> String {
        format!("\"{}\"", field)
    }

    fn truncate_statements(&self, table: &str, restart_identity: bool) -> Vec<String> {
        let mut statements = vec![format!("delete from {}", self.quote_field(table))];
        if restart_identity {
            statements.push(format!(
                "delete from sqlite_sequence where name = '{}'",
                table.replace('\'', "''")
            ));
        }
        statements
    }
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn to_sql_type(&self, col: &ColumnMap) -> String {
        match col.kind {
            FieldKind::Bool => "boolean".to_string(),
            FieldKind::SmallInt | FieldKind::Int if col.is_auto_incr => "serial".to_string(),
            FieldKind::BigInt if col.is_auto_incr => "bigserial".to_string(),
            FieldKind::SmallInt => "smallint".to_string(),
            FieldKind::Int => "integer".to_string(),
            FieldKind::BigInt => "bigint".to_string(),
            FieldKind::Float => "real".to_string(),
            FieldKind::Double => "double precision".to_string(),
            FieldKind::Text => varchar(col.max_size),
            FieldKind::Bytes => "bytea".to_string(),
            FieldKind::Timestamp => "timestamp with time zone".to_string(),
        }
    }

    fn auto_incr_str(&self) -> &'static str {
        ""
    }

    fn auto_incr_bind_value(&self) -> &'static str {
        "default"
    }

    fn auto_incr_insert_suffix(&self, col: &ColumnMap) -> String {
        format!(" returning {}", self.quote_field(&col.column_name))
    }

    fn key_retrieval(&self) -> KeyRetrieval {
        KeyRetrieval::Returning
    }

    fn create_table_suffix(&self) -> String {
        ";".to_string()
    }

    fn bind_var(&self, i: usize) -> String {
        format!("${}", i + 1)
    }

    fn quote_field(&self, field: &str) -> String {
        format!("\"{}\"", field.to_lowercase())
    }

    fn truncate_statements(&self, table: &str, restart_identity: bool) -> Vec<String> {
        let mut statement = format!("truncate {}", self.quote_field(table));
        if restart_identity {
            statement.push_str(" restart identity");
        }
        vec![statement]
    }
}

/// MySQL dialect
///
/// `engine` and `encoding` end up in the `create table` suffix, for example
/// `MySqlDialect::new("InnoDB", "UTF8")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MySqlDialect {
    /// Storage engine
    pub engine: String,
    /// Default character set
    pub encoding: String,
}

impl MySqlDialect {
    /// Create a MySQL dialect for the given storage engine and charset
    pub fn new<E: Into<String>, C: Into<String>>(engine: E, encoding: C) -> Self {
        Self {
            engine: engine.into(),
            encoding: encoding.into(),
        }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new("InnoDB", "UTF8")
    }
}

impl Dialect for MySqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    fn to_sql_type(&self, col: &ColumnMap) -> String {
        match col.kind {
            FieldKind::Bool => "boolean".to_string(),
            FieldKind::SmallInt => "smallint".to_string(),
            FieldKind::Int => "int".to_string(),
            FieldKind::BigInt => "bigint".to_string(),
            FieldKind::Float => "float".to_string(),
            FieldKind::Double => "double".to_string(),
            FieldKind::Text => varchar(col.max_size),
            FieldKind::Bytes => "mediumblob".to_string(),
            FieldKind::Timestamp => "datetime(6)".to_string(),
        }
    }

    fn auto_incr_str(&self) -> &'static str {
        "auto_increment"
    }

    fn auto_incr_bind_value(&self) -> &'static str {
        "null"
    }

    fn auto_incr_insert_suffix(&self, _col: &ColumnMap) -> String {
        String::new()
    }

    fn key_retrieval(&self) -> KeyRetrieval {
        KeyRetrieval::LastInsertId
    }

    fn create_table_suffix(&self) -> String {
        format!(" engine={} charset={};", self.engine, self.encoding)
    }

    fn bind_var(&self, _i: usize) -> String {
        "?".to_string()
    }

    fn quote_field(&self, field: &str) -> String {
        format!("`{}`", field)
    }

    fn truncate_statements(&self, table: &str, restart_identity: bool) -> Vec<String> {
        let quoted = self.quote_field(table);
        let mut statements = vec![format!("truncate {}", quoted)];
        if restart_identity {
            statements.push(format!("alter table {} auto_increment = 1", quoted));
        }
        statements
    }
}

fn varchar(max_size: usize) -> String {
    let size = if max_size == 0 { 255 } else { max_size };
    format!("varchar({})", size)
}

/// Default dialect for a database type
///
/// Returns `None` for [`DatabaseType::None`].
pub fn dialect_for(db_type: DatabaseType) -> Option<Box<dyn Dialect>> {
    match db_type {
        DatabaseType::Sqlite => Some(Box::new(SqliteDialect)),
        DatabaseType::Postgres => Some(Box::new(PostgresDialect)),
        DatabaseType::Mysql => Some(Box::new(MySqlDialect::default())),
        DatabaseType::None => None,
    }
}

/// Rewrite `?` placeholders into the dialect's placeholder syntax
///
/// Question marks inside single- or double-quoted literals are left alone.
pub fn rebind(query: &str, dialect: &dyn Dialect) -> String {
    let mut out = String::with_capacity(query.len() + 8);
    let mut quote: Option<char> = None;
    let mut index = 0;

    for ch in query.chars() {
        match (quote, ch) {
            (Some(open), c) if c == open => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, '?') => {
                out.push_str(&dialect.bind_var(index));
                index += 1;
            }
            (None, c) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::FieldDef;

    fn column(kind: FieldKind) -> ColumnMap {
        let mut def = FieldDef::of::<i64>("id", None);
        def.kind = kind;
        ColumnMap::from_field(&def)
    }

    #[test]
    fn test_bind_vars() {
        assert_eq!(SqliteDialect.bind_var(3), "?");
        assert_eq!(PostgresDialect.bind_var(0), "$1");
        assert_eq!(PostgresDialect.bind_var(4), "$5");
        assert_eq!(MySqlDialect::default().bind_var(1), "?");
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(SqliteDialect.quote_field("person_test"), "\"person_test\"");
        assert_eq!(PostgresDialect.quote_field("FName"), "\"fname\"");
        assert_eq!(MySqlDialect::default().quote_field("memo"), "`memo`");
    }

    #[test]
    fn test_sql_types() {
        let mut id = column(FieldKind::BigInt);
        assert_eq!(PostgresDialect.to_sql_type(&id), "bigint");
        id.is_key = true;
        id.is_auto_incr = true;
        assert_eq!(PostgresDialect.to_sql_type(&id), "bigserial");
        assert_eq!(SqliteDialect.to_sql_type(&id), "integer");

        let mut memo = column(FieldKind::Text);
        assert_eq!(SqliteDialect.to_sql_type(&memo), "varchar(255)");
        memo.set_max_size(10);
        assert_eq!(MySqlDialect::default().to_sql_type(&memo), "varchar(10)");

        let created = column(FieldKind::Timestamp);
        assert_eq!(
            PostgresDialect.to_sql_type(&created),
            "timestamp with time zone"
        );
    }

    #[test]
    fn test_auto_increment() {
        let id = column(FieldKind::BigInt);
        assert_eq!(SqliteDialect.key_retrieval(), KeyRetrieval::LastInsertId);
        assert_eq!(SqliteDialect.auto_incr_insert_suffix(&id), "");
        assert_eq!(PostgresDialect.key_retrieval(), KeyRetrieval::Returning);
        assert_eq!(
            PostgresDialect.auto_incr_insert_suffix(&id),
            " returning \"id\""
        );
        assert_eq!(PostgresDialect.auto_incr_bind_value(), "default");
    }

    #[test]
    fn test_mysql_suffix() {
        let dialect = MySqlDialect::new("InnoDB", "UTF8");
        assert_eq!(dialect.create_table_suffix(), " engine=InnoDB charset=UTF8;");
    }

    #[test]
    fn test_truncate_statements() {
        assert_eq!(
            SqliteDialect.truncate_statements("person_test", true),
            vec![
                "delete from \"person_test\"".to_string(),
                "delete from sqlite_sequence where name = 'person_test'".to_string(),
            ]
        );
        assert_eq!(
            PostgresDialect.truncate_statements("person_test", true),
            vec!["truncate \"person_test\" restart identity".to_string()]
        );
        assert_eq!(
            MySqlDialect::default().truncate_statements("t", false),
            vec!["truncate `t`".to_string()]
        );
    }

    #[test]
    fn test_rebind() {
        let query = "select * from t where a = ? and b = '?' and c = ?";
        assert_eq!(
            rebind(query, &PostgresDialect),
            "select * from t where a = $1 and b = '?' and c = $2"
        );
        assert_eq!(rebind(query, &SqliteDialect), query);
    }

    #[test]
    fn test_dialect_for() {
        let dialect = dialect_for(DatabaseType::Postgres).unwrap();
        assert_eq!(dialect.database_type(), DatabaseType::Postgres);
        assert!(dialect_for(DatabaseType::None).is_none());
    }
}
