//! Static composition of the bot core.
//!
//! [`Bot`] wires the store, the archival pipeline, the scan orchestrator,
//! the poll engine and the self-reaction monitor at startup, and exposes
//! the entry points the platform adapter binds events and commands to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use crate::archive::{ArchiveOutcome, ArchivePipeline};
use crate::config::{ArchiveSettings, Config};
use crate::db::{
    self, ArchiveStats, ArchivedRecord, ChannelId, Database, LeaderboardEntry, MessageId, UserId,
};
use crate::events::SelfReactionMonitor;
use crate::gateway::{AuthorRef, ChatGateway, GatewayError, MessageSnapshot};
use crate::poll::{OpenPoll, PollEngine, PollError, PollId, Settlement, VoteOutcome};
use crate::scan::{ScanConfig, ScanError, ScanOrchestrator, ScanProgress, ScanSummary, SweepSummary};

/// Failures of a single command invocation, scoped to the referenced
/// message or channel so the adapter can render them without leaking
/// storage internals.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("message {0} not found")]
    MessageNotFound(MessageId),
    #[error("access to channel {0} denied")]
    AccessDenied(ChannelId),
    #[error("storage failure")]
    Storage(#[from] anyhow::Error),
}

impl From<GatewayError> for CommandError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(message_id) => Self::MessageNotFound(message_id),
            GatewayError::AccessDenied(channel_id) => Self::AccessDenied(channel_id),
            GatewayError::Other(e) => Self::Storage(e),
        }
    }
}

/// What the adapter should do after a live reaction event.
#[derive(Debug, Clone)]
pub struct ReactionResponse {
    /// Set when the event pushed the message over the threshold.
    pub outcome: Option<ArchiveOutcome>,
    /// The reactor reacted to their own message and deserves a callout.
    pub self_reaction: bool,
}

/// The composed bot core. One instance per process.
pub struct Bot {
    db: Database,
    gateway: Arc<dyn ChatGateway>,
    settings: Arc<ArchiveSettings>,
    pipeline: ArchivePipeline,
    scanner: ScanOrchestrator,
    polls: PollEngine,
    self_reactions: SelfReactionMonitor,
    contention_retries: u32,
    contention_backoff: Duration,
}

impl Bot {
    /// Open the store and wire every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn new(config: &Config, gateway: Arc<dyn ChatGateway>) -> Result<Self> {
        let db = Database::new(&config.database_path).await?;
        let settings = Arc::new(ArchiveSettings::new(config.reaction_threshold));
        let pipeline = ArchivePipeline::new(db.clone(), Arc::clone(&settings));
        let scanner = ScanOrchestrator::new(
            Arc::clone(&gateway),
            db.clone(),
            pipeline.clone(),
            ScanConfig::from(config),
        );
        let polls = PollEngine::new(db.clone(), config.poll_timeout);
        let self_reactions = SelfReactionMonitor::new(config.self_react_cooldown);

        Ok(Self {
            db,
            gateway,
            settings,
            pipeline,
            scanner,
            polls,
            self_reactions,
            contention_retries: config.scan_contention_retries,
            contention_backoff: config.scan_contention_backoff,
        })
    }

    // ========== Live Events ==========

    /// Handle a reaction-added event.
    ///
    /// Reactions from bots are ignored entirely. Otherwise the message is
    /// run through the archival pipeline (idempotent, so repeated events on
    /// the same message are no-ops) and self-reactions are flagged.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn handle_reaction_added(
        &self,
        message: &MessageSnapshot,
        reactor: &AuthorRef,
    ) -> Result<ReactionResponse> {
        if reactor.is_bot {
            return Ok(ReactionResponse {
                outcome: None,
                self_reaction: false,
            });
        }

        let self_reaction = self.self_reactions.observe(message.author.id, reactor.id);

        let outcome = self
            .pipeline
            .try_archive_with_retry(message, self.contention_retries, self.contention_backoff)
            .await?;

        Ok(ReactionResponse {
            outcome: Some(outcome),
            self_reaction,
        })
    }

    // ========== Archive Commands ==========

    /// Manually archive a message by id.
    pub async fn archive_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<ArchiveOutcome, CommandError> {
        let message = self.gateway.fetch_message(channel_id, message_id).await?;

        Ok(self.pipeline.try_archive(&message).await?)
    }

    /// Remove a message from the archive. Returns whether it was archived.
    pub async fn unarchive_message(&self, message_id: MessageId) -> Result<bool> {
        self.pipeline.unarchive(message_id).await
    }

    /// Look up an archived record for anonymized display.
    pub async fn show_archived(&self, message_id: MessageId) -> Result<Option<ArchivedRecord>> {
        db::get_archived(self.db.pool(), message_id).await
    }

    /// A uniformly random archived record for anonymized display.
    pub async fn random_archived(&self) -> Result<Option<ArchivedRecord>> {
        db::sample_random(self.db.pool()).await
    }

    /// Aggregate archive statistics.
    pub async fn stats(&self) -> Result<ArchiveStats> {
        db::get_archive_stats(self.db.pool()).await
    }

    // ========== Configuration ==========

    /// Change the reaction threshold for subsequent evaluations. The
    /// adapter is responsible for checking operator permissions first.
    pub fn set_reaction_threshold(&self, threshold: u32) {
        self.settings.set_threshold(threshold);
    }

    #[must_use]
    pub fn reaction_threshold(&self) -> u32 {
        self.settings.threshold()
    }

    // ========== Scans ==========

    /// Bounded incremental scan of one channel.
    pub async fn scan_channel(
        &self,
        channel_id: ChannelId,
        limit: usize,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanSummary, ScanError> {
        self.scanner.scan_channel(channel_id, limit, on_progress).await
    }

    /// Bounded scan across many channels.
    pub async fn scan_all(
        &self,
        channels: &[ChannelId],
        limit_per_channel: usize,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<SweepSummary, ScanError> {
        self.scanner
            .scan_all(channels, limit_per_channel, on_progress)
            .await
    }

    /// Exhaustive backward backfill of one channel.
    pub async fn scan_full(
        &self,
        channel_id: ChannelId,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanSummary, ScanError> {
        self.scanner.scan_full(channel_id, on_progress).await
    }

    // ========== Polls ==========

    /// Open an author-guessing poll.
    pub async fn open_poll(&self, timeout: Option<Duration>) -> Result<OpenPoll, PollError> {
        self.polls.open_poll(timeout).await
    }

    /// Record a participant's vote.
    pub async fn submit_vote(
        &self,
        poll_id: PollId,
        user_id: UserId,
        choice: &str,
    ) -> VoteOutcome {
        self.polls.submit_vote(poll_id, user_id, choice).await
    }

    /// Wait out the voting window, then settle. The adapter typically
    /// spawns this right after opening the poll and renders the returned
    /// settlement over the widget.
    pub async fn run_poll(&self, poll_id: PollId) -> Option<Settlement> {
        self.polls.run_to_settlement(poll_id).await
    }

    // ========== Leaderboard ==========

    /// Top poll scorers, descending.
    pub async fn leaderboard(&self, n: i64) -> Result<Vec<LeaderboardEntry>> {
        db::top_points(self.db.pool(), n).await
    }

    /// One user's score.
    pub async fn user_points(&self, user_id: UserId) -> Result<i64> {
        db::get_points(self.db.pool(), user_id).await
    }

    /// Wipe all scores.
    pub async fn reset_leaderboard(&self) -> Result<()> {
        db::reset_leaderboard(self.db.pool()).await
    }
}
