//! Database backend implementations
//!
//! This module contains concrete implementations of the executor traits for
//! each supported database system. Each backend sits behind its own feature.

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::{MysqlDatabase, MysqlTransaction};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDatabase, PostgresTransaction};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteTransaction};

use crate::core::database::{Connection, ConnectionBuilder};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};

/// Open a connection described by `builder`
///
/// # Errors
///
/// Returns `Configuration` when the builder names a database whose backend
/// feature is not enabled.
pub async fn connect(builder: &ConnectionBuilder) -> Result<Box<dyn Connection>> {
    let connection_string = builder.build_connection_string();
    tracing::debug!(database = %builder.database_type(), "opening connection");

    match builder.database_type() {
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => Ok(Box::new(SqliteDatabase::connect(&connection_string).await?)),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => {
            Ok(Box::new(PostgresDatabase::connect(&connection_string).await?))
        }
        #[cfg(feature = "mysql")]
        DatabaseType::Mysql => Ok(Box::new(MysqlDatabase::connect(&connection_string).await?)),
        other => Err(DatabaseError::configuration(format!(
            "no backend enabled for database type {}",
            other
        ))),
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::core::context::Context;
    use crate::core::database::SqlExecutor;

    #[tokio::test]
    async fn test_connect_sqlite_from_builder() {
        let ctx = Context::background();
        let conn = connect(&ConnectionBuilder::new(DatabaseType::Sqlite))
            .await
            .unwrap();
        assert_eq!(conn.database_type(), DatabaseType::Sqlite);

        let row = conn.fetch_one(&ctx, "select 1 as one", &[]).await.unwrap();
        assert_eq!(row.get("one").and_then(|v| v.as_long()), Some(1));
    }

    #[tokio::test]
    async fn test_connect_without_type_fails() {
        let result = connect(&ConnectionBuilder::new(DatabaseType::None)).await;
        assert!(matches!(result, Err(DatabaseError::Configuration(_))));
    }
}
