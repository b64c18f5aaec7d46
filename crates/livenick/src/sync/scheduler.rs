//! Periodic per-guild reconciliation.

use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::chat::GuildMember;
use crate::mapping::MemberKey;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between passes over a guild.
    pub interval: Duration,
    /// Members reconciled at once within a pass.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            concurrency: 8,
        }
    }
}

/// Tally of one pass over a guild.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub guild_id: u64,
    /// Human members visited.
    pub members: usize,
    pub outcomes: HashMap<ReconcileOutcome, usize>,
    /// Members whose pass returned an error.
    pub failures: usize,
}

impl PassSummary {
    pub fn count(&self, outcome: ReconcileOutcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Nicknames changed during the pass.
    pub fn changed(&self) -> usize {
        self.count(ReconcileOutcome::Marked) + self.count(ReconcileOutcome::Unmarked)
    }
}

/// Drives [`Reconciler`] over every guild the bot is in.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    reconciler: Reconciler,
    config: SchedulerConfig,
    in_flight: DashMap<MemberKey, Arc<Mutex<()>>>,
    loops: DashMap<u64, CancellationToken>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                reconciler,
                config,
                in_flight: DashMap::new(),
                loops: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Guilds with a running loop.
    pub fn guilds(&self) -> Vec<u64> {
        self.inner.loops.iter().map(|entry| *entry.key()).collect()
    }

    /// Start the periodic loop for a guild.
    ///
    /// The loop's first tick is immediate. If the guild already has a loop
    /// (gateway reconnect), one extra pass is run instead. Returns whether a
    /// new loop was spawned.
    pub fn start_guild(&self, guild_id: u64) -> bool {
        if self.inner.shutdown.is_cancelled() {
            return false;
        }

        let token = match self.inner.loops.entry(guild_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let token = self.inner.shutdown.child_token();
                entry.insert(token.clone());
                Some(token)
            }
        };

        let Some(token) = token else {
            self.trigger_pass(guild_id);
            return false;
        };

        info!(guild_id, "Starting sync loop");
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.inner.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => scheduler.run_logged_pass(guild_id).await,
                }
            }
            debug!(guild_id, "Sync loop stopped");
        });
        true
    }

    /// Stop the loop for a guild the bot left.
    pub fn stop_guild(&self, guild_id: u64) {
        if let Some((_, token)) = self.inner.loops.remove(&guild_id) {
            token.cancel();
            info!(guild_id, "Stopped sync loop");
        }
    }

    /// Run an immediate pass in the background.
    pub fn trigger_pass(&self, guild_id: u64) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_logged_pass(guild_id).await;
        });
    }

    /// Run an immediate pass for every guild with a loop.
    pub fn trigger_all(&self) {
        for guild_id in self.guilds() {
            self.trigger_pass(guild_id);
        }
    }

    /// Stop every loop.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.loops.clear();
    }

    /// Reconcile every human member of a guild.
    ///
    /// Member listing is fetched fresh each time. A failing member is
    /// counted and logged without affecting the others.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, guild_id: u64) -> Result<PassSummary> {
        let members = self
            .inner
            .reconciler
            .platform()
            .list_members(guild_id)
            .await
            .with_context(|| format!("listing members of guild {guild_id}"))?;

        let humans: Vec<GuildMember> = members.into_iter().filter(|m| !m.is_bot).collect();
        let mut summary = PassSummary {
            guild_id,
            members: humans.len(),
            ..PassSummary::default()
        };

        let concurrency = self.inner.config.concurrency.max(1);
        let scheduler = self.clone();
        let results: Vec<(GuildMember, Result<ReconcileOutcome>)> = stream::iter(humans)
            .map(move |member| {
                let scheduler = scheduler.clone();
                async move {
                    let outcome = scheduler.reconcile_member(&member).await;
                    (member, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (member, result) in results {
            match result {
                Ok(outcome) => *summary.outcomes.entry(outcome).or_insert(0) += 1,
                Err(e) => {
                    summary.failures += 1;
                    warn!(
                        guild_id,
                        user_id = member.user_id,
                        "Reconciliation failed for {}: {:#}",
                        member.tag,
                        e
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Reconcile one member unless a pass for them is already running.
    pub async fn reconcile_member(&self, member: &GuildMember) -> Result<ReconcileOutcome> {
        let key = member.key();
        let Ok(lock) = self.member_lock(key).try_lock_owned() else {
            debug!(
                guild_id = member.guild_id,
                user_id = member.user_id,
                "Pass already in flight, skipping"
            );
            return Ok(ReconcileOutcome::Skipped);
        };
        let _guard = InFlightGuard::new(&self.inner.in_flight, key, lock);
        self.inner.reconciler.reconcile(member).await
    }

    /// Reconcile one member after their mapping changed.
    ///
    /// Waits for a pass already running for the member, since it may have
    /// read the mapping before the change, then re-reads the member.
    pub async fn reconcile_member_now(&self, member: &GuildMember) -> Result<ReconcileOutcome> {
        let key = member.key();
        let lock = self.member_lock(key).lock_owned().await;
        let _guard = InFlightGuard::new(&self.inner.in_flight, key, lock);
        let current = self
            .inner
            .reconciler
            .platform()
            .get_member(member.guild_id, member.user_id)
            .await
            .with_context(|| format!("re-reading member {}", member.tag))?;
        self.inner.reconciler.reconcile(&current).await
    }

    fn member_lock(&self, key: MemberKey) -> Arc<Mutex<()>> {
        self.inner.in_flight.entry(key).or_default().clone()
    }

    async fn run_logged_pass(&self, guild_id: u64) {
        match self.run_pass(guild_id).await {
            Ok(summary) => debug!(
                guild_id,
                members = summary.members,
                changed = summary.changed(),
                failures = summary.failures,
                "Sync pass complete"
            ),
            Err(e) => warn!(guild_id, "Sync pass failed: {:#}", e),
        }
    }
}

/// Holds a member's pass lock; drops the map entry once nobody else wants it.
struct InFlightGuard<'a> {
    locks: &'a DashMap<MemberKey, Arc<Mutex<()>>>,
    key: MemberKey,
    lock: Option<OwnedMutexGuard<()>>,
}

impl<'a> InFlightGuard<'a> {
    fn new(
        locks: &'a DashMap<MemberKey, Arc<Mutex<()>>>,
        key: MemberKey,
        lock: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            locks,
            key,
            lock: Some(lock),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.lock.take());
        // Waiters hold their own clone and keep the entry alive.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_releases_entry() {
        let locks: DashMap<MemberKey, Arc<Mutex<()>>> = DashMap::new();
        let key = MemberKey::new(1, 2);

        let lock = locks.entry(key).or_default().clone();
        let guard = InFlightGuard::new(&locks, key, lock.try_lock_owned().unwrap());
        let held = locks.get(&key).map(|entry| entry.clone()).unwrap();
        assert!(held.clone().try_lock_owned().is_err());
        drop(held);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_in_flight_guard_keeps_entry_for_waiters() {
        let locks: DashMap<MemberKey, Arc<Mutex<()>>> = DashMap::new();
        let key = MemberKey::new(1, 2);

        let lock = locks.entry(key).or_default().clone();
        let guard = InFlightGuard::new(&locks, key, lock.try_lock_owned().unwrap());
        let waiter = locks.get(&key).map(|entry| entry.clone()).unwrap();

        drop(guard);
        assert!(locks.contains_key(&key));
        assert!(waiter.try_lock_owned().is_ok());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = PassSummary::default();
        summary.outcomes.insert(ReconcileOutcome::Marked, 2);
        summary.outcomes.insert(ReconcileOutcome::Unmarked, 1);
        summary.outcomes.insert(ReconcileOutcome::NotRegistered, 5);
        assert_eq!(summary.changed(), 3);
        assert_eq!(summary.count(ReconcileOutcome::StatusUnknown), 0);
    }
}
