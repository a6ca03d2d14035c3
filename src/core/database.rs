//! Executor capability and connection management
//!
//! This module defines the minimal statement-execution capability the mapper
//! consumes. Plain connections and open transactions implement it identically,
//! which lets the CRUD engine run unchanged against either one.

use super::context::Context;
use super::database_types::DatabaseType;
use super::error::Result;
use super::value::{DatabaseResult, DatabaseRow, DatabaseValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows the statement changed
    pub rows_affected: u64,
    /// Key generated by the last insert, when the driver reports one
    pub last_insert_id: Option<i64>,
}

/// Statement execution capability shared by connections and transactions
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a parameterized statement that doesn't return rows
    ///
    /// # Errors
    ///
    /// Returns the driver's error unchanged, or `Cancelled`/`QueryTimeout` when
    /// `ctx` ends first.
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult>;

    /// Fetch the first row of a query
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoRows` when the query produces no rows.
    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow>;

    /// Fetch every row of a query
    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult>;
}

/// An open transaction
///
/// `commit` and `rollback` are terminal. Calling either a second time, or one
/// after the other, returns a transaction error.
#[async_trait]
pub trait TransactionExecutor: SqlExecutor {
    /// Commit the transaction
    async fn commit(&self) -> Result<()>;

    /// Roll the transaction back
    async fn rollback(&self) -> Result<()>;
}

/// A connection that can also start transactions
#[async_trait]
pub trait Connection: SqlExecutor {
    /// Get the database type
    fn database_type(&self) -> DatabaseType;

    /// Begin a new transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot start a transaction.
    async fn begin(&self, ctx: &Context) -> Result<Box<dyn TransactionExecutor>>;

    /// Close the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Connection string builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionBuilder {
    db_type: DatabaseType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: std::collections::BTreeMap<String, String>,
}

impl ConnectionBuilder {
    /// Create a new connection builder
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            options: std::collections::BTreeMap::new(),
        }
    }

    /// Database type this builder targets
    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Set the host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (or file path for SQLite)
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add an extra driver option
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Build the connection string
    pub fn build_connection_string(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => self
                .database
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
            DatabaseType::Postgres => {
                let mut parts = Vec::new();
                if let Some(host) = &self.host {
                    parts.push(format!("host={}", host));
                }
                if let Some(port) = self.port {
                    parts.push(format!("port={}", port));
                }
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", database));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", username));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", password));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, value));
                }
                parts.join(" ")
            }
            DatabaseType::Mysql => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let port = self.port.unwrap_or(3306);
                let database = self.database.as_deref().unwrap_or("");
                let username = self.username.as_deref().unwrap_or("root");
                let password = self.password.as_deref().unwrap_or("");
                let mut url = format!(
                    "mysql://{}:{}@{}:{}/{}",
                    username, password, host, port, database
                );
                if !self.options.is_empty() {
                    let query: Vec<String> = self
                        .options
                        .iter()
                        .map(|(key, value)| format!("{}={}", key, value))
                        .collect();
                    url.push('?');
                    url.push_str(&query.join("&"));
                }
                url
            }
            DatabaseType::None => String::new(),
        }
    }
}
