//! Database module for mapping persistence.

use anyhow::{Context, Result, bail};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::mapping::{MappingStore, PgMappingRepository, SqliteMappingRepository};

/// Database connection pool for one of the supported backends.
#[derive(Debug, Clone)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Database {
    /// Connect to the database named by `url` and apply migrations.
    ///
    /// `postgres://` and `postgresql://` URLs select PostgreSQL, `sqlite:`
    /// URLs select SQLite (the file is created if missing).
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let db = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await
                .context("connecting to postgres database")?;
            Self::Postgres(pool)
        } else if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)
                .context("parsing database URL")?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30));

            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await
                .context("connecting to sqlite database")?;
            Self::Sqlite(pool)
        } else {
            bail!("unsupported database URL scheme (expected postgres:// or sqlite:)");
        };

        db.run_migrations().await?;
        info!("Connected to {} database", db.backend_name());

        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database URL")?;

        // A second connection would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("connecting to in-memory database")?;

        let db = Self::Sqlite(pool);
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        match self {
            Self::Postgres(pool) => sqlx::migrate!("./migrations/postgres")
                .run(pool)
                .await
                .context("running postgres migrations")?,
            Self::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite")
                .run(pool)
                .await
                .context("running sqlite migrations")?,
        }
        Ok(())
    }

    /// Mapping store sharing this database's pool.
    pub fn mapping_store(&self) -> Arc<dyn MappingStore> {
        match self {
            Self::Postgres(pool) => Arc::new(PgMappingRepository::new(pool.clone())),
            Self::Sqlite(pool) => Arc::new(SqliteMappingRepository::new(pool.clone())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}
