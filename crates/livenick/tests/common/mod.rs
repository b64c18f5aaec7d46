//! Test utilities and common setup.

#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use livenick::chat::{ChatError, ChatPlatform, ChatResult, GuildMember};
use livenick::commands::CommandHandler;
use livenick::db::Database;
use livenick::mapping::{MappingStore, MemberKey, UserMapping};
use livenick::sync::{Reconciler, ReconcilerConfig, Scheduler, SchedulerConfig};
use livenick::twitch::{StatusOracle, StreamStatus};

pub const GUILD: u64 = 1000;

pub fn member(user_id: u64, display_name: &str) -> GuildMember {
    GuildMember {
        guild_id: GUILD,
        user_id,
        tag: format!("user{user_id}"),
        display_name: display_name.to_string(),
        is_bot: false,
    }
}

pub fn bot(user_id: u64, display_name: &str) -> GuildMember {
    GuildMember {
        is_bot: true,
        ..member(user_id, display_name)
    }
}

/// In-memory chat platform that applies nickname changes to its members.
#[derive(Default)]
pub struct FakePlatform {
    members: Mutex<HashMap<(u64, u64), GuildMember>>,
    forbidden: Mutex<HashSet<u64>>,
    list_fails: AtomicBool,
    nickname_calls: AtomicUsize,
    nickname_delay: Mutex<Option<Duration>>,
}

impl FakePlatform {
    pub fn add(&self, member: GuildMember) {
        self.members
            .lock()
            .unwrap()
            .insert((member.guild_id, member.user_id), member);
    }

    pub fn member(&self, user_id: u64) -> GuildMember {
        self.members
            .lock()
            .unwrap()
            .get(&(GUILD, user_id))
            .cloned()
            .expect("member exists")
    }

    pub fn display_name(&self, user_id: u64) -> String {
        self.member(user_id).display_name
    }

    pub fn rename(&self, user_id: u64, name: &str) {
        if let Some(member) = self.members.lock().unwrap().get_mut(&(GUILD, user_id)) {
            member.display_name = name.to_string();
        }
    }

    /// Reject nickname changes for `user_id` as a permission error.
    pub fn forbid(&self, user_id: u64) {
        self.forbidden.lock().unwrap().insert(user_id);
    }

    pub fn allow(&self, user_id: u64) {
        self.forbidden.lock().unwrap().remove(&user_id);
    }

    /// Stall every nickname change by `delay`.
    pub fn set_nickname_delay(&self, delay: Duration) {
        *self.nickname_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.list_fails.store(fail, Ordering::SeqCst);
    }

    pub fn nickname_calls(&self) -> usize {
        self.nickname_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn list_members(&self, guild_id: u64) -> ChatResult<Vec<GuildMember>> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(ChatError::Api("gateway unavailable".to_string()));
        }
        let mut members: Vec<GuildMember> = self
            .members
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.guild_id == guild_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.user_id);
        Ok(members)
    }

    async fn get_member(&self, guild_id: u64, user_id: u64) -> ChatResult<GuildMember> {
        self.members
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("member {user_id}")))
    }

    async fn set_nickname(&self, guild_id: u64, user_id: u64, nickname: &str) -> ChatResult<()> {
        self.nickname_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.nickname_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.forbidden.lock().unwrap().contains(&user_id) {
            return Err(ChatError::Forbidden("missing permissions".to_string()));
        }
        match self.members.lock().unwrap().get_mut(&(guild_id, user_id)) {
            Some(member) => {
                member.display_name = nickname.to_string();
                Ok(())
            }
            None => Err(ChatError::NotFound(format!("member {user_id}"))),
        }
    }
}

/// Status oracle with scripted answers. Unscripted logins are offline.
#[derive(Default)]
pub struct FakeOracle {
    statuses: Mutex<HashMap<String, StreamStatus>>,
    queries: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeOracle {
    pub fn set(&self, login: &str, status: StreamStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(login.to_string(), status);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusOracle for FakeOracle {
    async fn query(&self, login: &str) -> StreamStatus {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.statuses
            .lock()
            .unwrap()
            .get(login)
            .copied()
            .unwrap_or(StreamStatus::NotLive)
    }
}

/// Store wrapper whose reads fail for one member.
pub struct BrokenStore {
    pub inner: Arc<dyn MappingStore>,
    pub broken_user: u64,
}

#[async_trait]
impl MappingStore for BrokenStore {
    async fn get(&self, key: MemberKey) -> Result<Option<UserMapping>> {
        if key.user_id == self.broken_user {
            bail!("connection reset");
        }
        self.inner.get(key).await
    }

    async fn upsert(
        &self,
        key: MemberKey,
        twitch_username: &str,
        original_nickname: Option<&str>,
    ) -> Result<()> {
        self.inner.upsert(key, twitch_username, original_nickname).await
    }

    async fn set_original(&self, key: MemberKey, nickname: &str) -> Result<()> {
        self.inner.set_original(key, nickname).await
    }

    async fn clear_original(&self, key: MemberKey) -> Result<()> {
        self.inner.clear_original(key).await
    }
}

/// Fully wired engine over fakes and an in-memory database.
pub struct Harness {
    pub db: Database,
    pub store: Arc<dyn MappingStore>,
    pub platform: Arc<FakePlatform>,
    pub oracle: Arc<FakeOracle>,
    pub reconciler: Reconciler,
    pub scheduler: Scheduler,
    pub commands: CommandHandler,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Database::in_memory().await.unwrap();
        let store = db.mapping_store();
        Self::with_store(db, store)
    }

    pub async fn with_config(config: ReconcilerConfig) -> Self {
        let db = Database::in_memory().await.unwrap();
        let store = db.mapping_store();
        Self::build(db, store, config)
    }

    pub fn with_store(db: Database, store: Arc<dyn MappingStore>) -> Self {
        Self::build(db, store, ReconcilerConfig::default())
    }

    fn build(db: Database, store: Arc<dyn MappingStore>, config: ReconcilerConfig) -> Self {
        let platform = Arc::new(FakePlatform::default());
        let oracle = Arc::new(FakeOracle::default());
        let reconciler = Reconciler::new(
            store.clone(),
            oracle.clone(),
            platform.clone(),
            config,
        );
        let scheduler = Scheduler::new(
            reconciler.clone(),
            SchedulerConfig {
                interval: Duration::from_secs(3600),
                concurrency: 4,
            },
        );
        let commands = CommandHandler::new(store.clone(), platform.clone());

        Self {
            db,
            store,
            platform,
            oracle,
            reconciler,
            scheduler,
            commands,
        }
    }

    pub async fn mapping(&self, user_id: u64) -> Option<UserMapping> {
        self.store.get(MemberKey::new(GUILD, user_id)).await.unwrap()
    }

    pub async fn register(&self, user_id: u64, login: &str, original: Option<&str>) {
        self.store
            .upsert(MemberKey::new(GUILD, user_id), login, original)
            .await
            .unwrap();
    }

    /// Reconcile the member as currently seen by the platform.
    pub async fn reconcile(&self, user_id: u64) -> livenick::sync::ReconcileOutcome {
        let member = self.platform.member(user_id);
        self.reconciler.reconcile(&member).await.unwrap()
    }
}
