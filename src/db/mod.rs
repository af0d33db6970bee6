use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub enum DatabasePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DatabasePool {
    pub async fn new(config: &Config) -> AppResult<Self> {
        Self::connect(&config.database.url, config.database.max_connections).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await?;

            Ok(DatabasePool::Postgres(pool))
        } else if database_url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .foreign_keys(true);

            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?;

            Ok(DatabasePool::Sqlite(pool))
        } else {
            Err(AppError::ConfigError(config::ConfigError::Message(
                "Invalid database URL. Must start with postgres:// or sqlite:".to_string(),
            )))
        }
    }

    pub async fn migrate(&self) -> AppResult<()> {
        match self {
            DatabasePool::Postgres(pool) => {
                Migrator::new(std::path::Path::new("./migrations/postgres"))
                    .await?
                    .run(pool)
                    .await?;
            }
            DatabasePool::Sqlite(pool) => {
                Migrator::new(std::path::Path::new("./migrations/sqlite"))
                    .await?
                    .run(pool)
                    .await?;
            }
        }
        Ok(())
    }
}

// SQLite keeps ids and money as text; these read them back into typed values.

pub fn sqlite_uuid(row: &SqliteRow, column: &str) -> AppResult<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw)
        .map_err(|e| AppError::InternalServerError(format!("bad uuid in {}: {}", column, e)))
}

pub fn sqlite_decimal(row: &SqliteRow, column: &str) -> AppResult<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| AppError::InternalServerError(format!("bad amount in {}: {}", column, e)))
}

/// Opens a single-connection in-memory SQLite database with the schema applied.
/// One connection, because every `:memory:` connection is a separate database.
#[cfg(test)]
pub async fn test_pool() -> DatabasePool {
    let pool = DatabasePool::connect("sqlite::memory:", 1).await.unwrap();
    pool.migrate().await.unwrap();
    pool
}
