//! Per-member nickname reconciliation.
//!
//! A member is *marked* when the stored mapping carries an original
//! nickname and *unmarked* when it does not. Each pass reads the mapping
//! fresh, asks the status oracle, and moves the member between the two
//! states. Every transition is idempotent, so overlapping passes for the
//! same member converge on the same nickname and row.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::marker::Marker;
use crate::chat::{ChatPlatform, GuildMember};
use crate::mapping::{MappingStore, UserMapping};
use crate::twitch::{StatusOracle, StreamStatus};

/// What a reconciliation pass did for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
    /// No mapping, or the mapping has no Twitch login.
    NotRegistered,
    /// Status lookup failed; nothing was changed.
    StatusUnknown,
    AlreadyMarked,
    AlreadyUnmarked,
    Marked,
    Unmarked,
    /// The nickname change was rejected or timed out.
    MutationFailed,
    /// Another pass for the same member was already running.
    Skipped,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::StatusUnknown => "status_unknown",
            Self::AlreadyMarked => "already_marked",
            Self::AlreadyUnmarked => "already_unmarked",
            Self::Marked => "marked",
            Self::Unmarked => "unmarked",
            Self::MutationFailed => "mutation_failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether the member's nickname was changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Marked | Self::Unmarked)
    }
}

/// Planned transition for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Leave nickname and mapping as they are.
    Hold(ReconcileOutcome),
    /// Record `original`, then rename to `nickname`.
    Mark { original: String, nickname: String },
    /// Rename to `nickname`, then forget the original.
    Unmark { nickname: String },
}

/// Decide the transition for a registered member.
///
/// `display_name` is the member's current nickname (or account name).
pub fn plan_transition(
    mapping: &UserMapping,
    display_name: &str,
    status: StreamStatus,
    marker: &Marker,
) -> Transition {
    match status {
        StreamStatus::Unknown => Transition::Hold(ReconcileOutcome::StatusUnknown),
        StreamStatus::Live => {
            // A marked name is never captured as the original, even when the
            // store lost the restore point.
            if marker.is_applied(display_name) {
                Transition::Hold(ReconcileOutcome::AlreadyMarked)
            } else {
                Transition::Mark {
                    original: display_name.to_string(),
                    nickname: marker.apply(display_name),
                }
            }
        }
        StreamStatus::NotLive => {
            if !marker.is_applied(display_name) {
                return Transition::Hold(ReconcileOutcome::AlreadyUnmarked);
            }
            let nickname = match mapping.restore_point() {
                Some(original) => original.to_string(),
                None => marker.strip(display_name),
            };
            Transition::Unmark { nickname }
        }
    }
}

/// Tunables for [`Reconciler`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub marker: Marker,
    /// Upper bound on a status lookup; expiry counts as unknown status.
    pub status_timeout: Duration,
    /// Upper bound on a nickname change; expiry counts as a failed change.
    pub mutation_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            marker: Marker::default(),
            status_timeout: Duration::from_secs(15),
            mutation_timeout: Duration::from_secs(10),
        }
    }
}

/// Applies the live marker state machine to single members.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn MappingStore>,
    oracle: Arc<dyn StatusOracle>,
    platform: Arc<dyn ChatPlatform>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MappingStore>,
        oracle: Arc<dyn StatusOracle>,
        platform: Arc<dyn ChatPlatform>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            platform,
            config,
        }
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Bring one member's nickname in line with their live status.
    ///
    /// Nickname failures are logged and reported as
    /// [`ReconcileOutcome::MutationFailed`]; store failures are returned.
    #[instrument(skip(self, member), fields(guild_id = member.guild_id, user_id = member.user_id))]
    pub async fn reconcile(&self, member: &GuildMember) -> Result<ReconcileOutcome> {
        let key = member.key();
        let Some(mapping) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::NotRegistered);
        };
        let Some(login) = mapping.twitch_login() else {
            return Ok(ReconcileOutcome::NotRegistered);
        };

        let status = match tokio::time::timeout(self.config.status_timeout, self.oracle.query(login))
            .await
        {
            Ok(status) => status,
            Err(_) => {
                warn!(twitch = %login, "Twitch status lookup timed out");
                StreamStatus::Unknown
            }
        };

        match plan_transition(&mapping, &member.display_name, status, &self.config.marker) {
            Transition::Hold(outcome) => Ok(outcome),
            Transition::Mark { original, nickname } => {
                // Capture first: a crash before the rename leaves the name
                // unmarked and the next pass recaptures the same value.
                self.store.set_original(key, &original).await?;
                if !self.set_nickname(member, &nickname).await {
                    // The name is still unmarked, so the row goes back to
                    // what it held before this pass.
                    match mapping.original_nickname.as_deref() {
                        Some(previous) => self.store.set_original(key, previous).await?,
                        None => self.store.clear_original(key).await?,
                    }
                    return Ok(ReconcileOutcome::MutationFailed);
                }
                info!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    twitch = %login,
                    "{} started streaming",
                    member.tag
                );
                Ok(ReconcileOutcome::Marked)
            }
            Transition::Unmark { nickname } => {
                if !self.set_nickname(member, &nickname).await {
                    return Ok(ReconcileOutcome::MutationFailed);
                }
                self.store.clear_original(key).await?;
                info!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    twitch = %login,
                    "{} stopped streaming",
                    member.tag
                );
                Ok(ReconcileOutcome::Unmarked)
            }
        }
    }

    async fn set_nickname(&self, member: &GuildMember, nickname: &str) -> bool {
        let change = self
            .platform
            .set_nickname(member.guild_id, member.user_id, nickname);
        match tokio::time::timeout(self.config.mutation_timeout, change).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    "Failed to set nickname for {}: {}",
                    member.tag,
                    e
                );
                false
            }
            Err(_) => {
                warn!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    "Timed out setting nickname for {}",
                    member.tag
                );
                false
            }
        }
    }
}
