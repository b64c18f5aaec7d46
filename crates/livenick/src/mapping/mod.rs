//! Member mapping module.
//!
//! Persists the Twitch login each member registered together with the
//! nickname to restore once they stop streaming.

mod models;
mod repository;

use anyhow::Result;
use async_trait::async_trait;

pub use models::{MemberKey, UserMapping};
pub use repository::{PgMappingRepository, SqliteMappingRepository};

/// Point reads and writes on the `user_mapping` table.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Fetch the mapping for a member, if any.
    async fn get(&self, key: MemberKey) -> Result<Option<UserMapping>>;

    /// Insert a mapping or overwrite both mutable columns on conflict.
    ///
    /// Callers re-registering a member must pass the currently stored
    /// original nickname to keep the restore point.
    async fn upsert(
        &self,
        key: MemberKey,
        twitch_username: &str,
        original_nickname: Option<&str>,
    ) -> Result<()>;

    /// Record the nickname to restore later.
    async fn set_original(&self, key: MemberKey, nickname: &str) -> Result<()>;

    /// Forget the restore point.
    async fn clear_original(&self, key: MemberKey) -> Result<()>;
}
