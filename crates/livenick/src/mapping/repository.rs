//! Mapping repositories for the supported database backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, SqlitePool};
use tracing::{debug, instrument};

use super::MappingStore;
use super::models::{MemberKey, UserMapping};

/// Repository backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgMappingRepository {
    pool: PgPool,
}

impl PgMappingRepository {
    /// Create a new Postgres mapping repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for PgMappingRepository {
    #[instrument(skip(self))]
    async fn get(&self, key: MemberKey) -> Result<Option<UserMapping>> {
        let mapping = sqlx::query_as::<_, UserMapping>(
            r#"
            SELECT guild_id, user_id, twitch_username, original_nickname
            FROM user_mapping
            WHERE guild_id = $1 AND user_id = $2
            "#,
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user mapping")?;

        Ok(mapping)
    }

    #[instrument(skip(self))]
    async fn upsert(
        &self,
        key: MemberKey,
        twitch_username: &str,
        original_nickname: Option<&str>,
    ) -> Result<()> {
        debug!("Upserting user mapping for {}", key);

        sqlx::query(
            r#"
            INSERT INTO user_mapping (guild_id, user_id, twitch_username, original_nickname)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (guild_id, user_id)
            DO UPDATE SET twitch_username = EXCLUDED.twitch_username,
                          original_nickname = EXCLUDED.original_nickname
            "#,
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .bind(twitch_username)
        .bind(original_nickname)
        .execute(&self.pool)
        .await
        .context("Failed to upsert user mapping")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_original(&self, key: MemberKey, nickname: &str) -> Result<()> {
        sqlx::query(
            "UPDATE user_mapping SET original_nickname = $3 WHERE guild_id = $1 AND user_id = $2",
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .bind(nickname)
        .execute(&self.pool)
        .await
        .context("Failed to store original nickname")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_original(&self, key: MemberKey) -> Result<()> {
        sqlx::query(
            "UPDATE user_mapping SET original_nickname = NULL WHERE guild_id = $1 AND user_id = $2",
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to clear original nickname")?;

        Ok(())
    }
}

/// Repository backed by SQLite, used for local runs and tests.
#[derive(Debug, Clone)]
pub struct SqliteMappingRepository {
    pool: SqlitePool,
}

impl SqliteMappingRepository {
    /// Create a new SQLite mapping repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for SqliteMappingRepository {
    #[instrument(skip(self))]
    async fn get(&self, key: MemberKey) -> Result<Option<UserMapping>> {
        let mapping = sqlx::query_as::<_, UserMapping>(
            r#"
            SELECT guild_id, user_id, twitch_username, original_nickname
            FROM user_mapping
            WHERE guild_id = ? AND user_id = ?
            "#,
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user mapping")?;

        Ok(mapping)
    }

    #[instrument(skip(self))]
    async fn upsert(
        &self,
        key: MemberKey,
        twitch_username: &str,
        original_nickname: Option<&str>,
    ) -> Result<()> {
        debug!("Upserting user mapping for {}", key);

        sqlx::query(
            r#"
            INSERT INTO user_mapping (guild_id, user_id, twitch_username, original_nickname)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (guild_id, user_id)
            DO UPDATE SET twitch_username = excluded.twitch_username,
                          original_nickname = excluded.original_nickname
            "#,
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .bind(twitch_username)
        .bind(original_nickname)
        .execute(&self.pool)
        .await
        .context("Failed to upsert user mapping")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_original(&self, key: MemberKey, nickname: &str) -> Result<()> {
        sqlx::query(
            "UPDATE user_mapping SET original_nickname = ? WHERE guild_id = ? AND user_id = ?",
        )
        .bind(nickname)
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to store original nickname")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_original(&self, key: MemberKey) -> Result<()> {
        sqlx::query(
            "UPDATE user_mapping SET original_nickname = NULL WHERE guild_id = ? AND user_id = ?",
        )
        .bind(key.guild_id.to_string())
        .bind(key.user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to clear original nickname")?;

        Ok(())
    }
}
