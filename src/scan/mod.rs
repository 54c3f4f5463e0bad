//! Channel history scans.
//!
//! Two modes: a bounded, forward, cursor-resumable scan per channel (with
//! an all-channels sweep built on top) and an exhaustive backward backfill
//! over a channel's entire history. Both feed every retrieved message
//! through the archival pipeline; the store's UNIQUE constraint makes
//! re-scanning safe.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::ArchivePipeline;
use crate::config::Config;
use crate::db::{get_scan_cursor, set_scan_cursor, ChannelId, Database, MessageId};
use crate::gateway::{ChatGateway, GatewayError, HistoryQuery};

/// Consecutive empty history pages required before a full backfill declares
/// end-of-history. A single empty page can be a transient pagination quirk.
const EMPTY_PAGE_TOLERANCE: u32 = 2;

/// Tuning knobs for history scans.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Messages per history page during a full backfill.
    pub page_size: usize,
    /// Messages between cooperative pacing pauses.
    pub pace_every: u64,
    /// Length of each pacing pause.
    pub pace_delay: Duration,
    /// Messages between progress callbacks.
    pub progress_every: u64,
    /// Messages between cursor flushes during a full backfill.
    pub cursor_flush_every: u64,
    /// Retry budget for transient storage contention on a single message.
    pub contention_retries: u32,
    /// Backoff between contention retries.
    pub contention_backoff: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            pace_every: 500,
            pace_delay: Duration::from_secs(2),
            progress_every: 1000,
            cursor_flush_every: 100,
            contention_retries: 3,
            contention_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for ScanConfig {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.scan_page_size,
            pace_every: config.scan_pace_every,
            pace_delay: config.scan_pace_delay,
            progress_every: config.scan_progress_every,
            cursor_flush_every: config.scan_cursor_flush_every,
            contention_retries: config.scan_contention_retries,
            contention_backoff: config.scan_contention_backoff,
        }
    }
}

/// Periodic progress notification for long scans.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub channel_id: ChannelId,
    pub scanned: u64,
    pub archived: u64,
}

/// Result of one channel's scan.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub channel_id: ChannelId,
    pub scanned: u64,
    pub archived: u64,
    /// Last message examined, `None` when the channel had nothing new.
    pub last_message_id: Option<MessageId>,
}

/// Result of an all-channels sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub channels: Vec<ScanSummary>,
    /// Channels skipped because the platform denied access.
    pub denied_channels: Vec<ChannelId>,
}

impl SweepSummary {
    #[must_use]
    pub fn total_scanned(&self) -> u64 {
        self.channels.iter().map(|c| c.scanned).sum()
    }

    #[must_use]
    pub fn total_archived(&self) -> u64 {
        self.channels.iter().map(|c| c.archived).sum()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("access to channel {0} denied")]
    AccessDenied(ChannelId),
    #[error("scan aborted after {scanned} messages")]
    Fatal {
        scanned: u64,
        #[source]
        source: anyhow::Error,
    },
}

fn map_gateway_error(err: GatewayError, scanned: u64) -> ScanError {
    match err {
        GatewayError::AccessDenied(channel_id) => ScanError::AccessDenied(channel_id),
        GatewayError::NotFound(_) | GatewayError::Other(_) => ScanError::Fatal {
            scanned,
            source: anyhow::Error::new(err),
        },
    }
}

/// Drives history retrieval through the archival pipeline and persists
/// per-channel watermarks.
pub struct ScanOrchestrator {
    gateway: Arc<dyn ChatGateway>,
    db: Database,
    pipeline: ArchivePipeline,
    config: ScanConfig,
}

impl ScanOrchestrator {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        db: Database,
        pipeline: ArchivePipeline,
        config: ScanConfig,
    ) -> Self {
        Self {
            gateway,
            db,
            pipeline,
            config,
        }
    }

    /// Bounded incremental scan of one channel.
    ///
    /// Fetches up to `limit` messages newer than the stored cursor (or the
    /// newest `limit` messages when the channel has never been scanned) and
    /// evaluates each. The cursor is persisted after every message
    /// examined, archived or not, so the scan is resumable and never
    /// revisits history older than the watermark.
    ///
    /// # Errors
    ///
    /// [`ScanError::AccessDenied`] if the platform refuses the channel,
    /// [`ScanError::Fatal`] on unexpected gateway or storage failure.
    pub async fn scan_channel(
        &self,
        channel_id: ChannelId,
        limit: usize,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanSummary, ScanError> {
        let cursor = get_scan_cursor(self.db.pool(), channel_id)
            .await
            .map_err(|e| ScanError::Fatal {
                scanned: 0,
                source: e,
            })?;

        let query = HistoryQuery {
            limit,
            before: None,
            after: cursor,
        };

        let mut messages = self
            .gateway
            .fetch_history(channel_id, query)
            .await
            .map_err(|e| map_gateway_error(e, 0))?;

        // A first-ever scan retrieves the newest window, which arrives
        // newest first. Process it in chronological order so the persisted
        // cursor always lands on the newest examined message and only moves
        // forward across invocations.
        if cursor.is_none() {
            messages.reverse();
        }

        let mut summary = ScanSummary {
            channel_id,
            scanned: 0,
            archived: 0,
            last_message_id: None,
        };

        for message in &messages {
            summary.scanned += 1;

            match self
                .pipeline
                .try_archive_with_retry(
                    message,
                    self.config.contention_retries,
                    self.config.contention_backoff,
                )
                .await
            {
                Ok(outcome) => {
                    if outcome.is_archived() {
                        summary.archived += 1;
                    }
                }
                // Per-message failures are isolated; the watermark still
                // advances past the message so the scan stays resumable.
                Err(e) => {
                    warn!(
                        channel_id,
                        message_id = message.message_id,
                        "Failed to archive during scan: {e:#}"
                    );
                }
            }

            set_scan_cursor(self.db.pool(), channel_id, message.message_id)
                .await
                .map_err(|e| ScanError::Fatal {
                    scanned: summary.scanned,
                    source: e,
                })?;
            summary.last_message_id = Some(message.message_id);

            self.pace_and_report(channel_id, &summary, on_progress).await;
        }

        info!(
            channel_id,
            scanned = summary.scanned,
            archived = summary.archived,
            "Channel scan complete"
        );

        Ok(summary)
    }

    /// Bounded scan across many channels.
    ///
    /// A channel the platform refuses is recorded as denied and the sweep
    /// continues; any other failure aborts the sweep.
    ///
    /// # Errors
    ///
    /// [`ScanError::Fatal`] on unexpected gateway or storage failure.
    pub async fn scan_all(
        &self,
        channels: &[ChannelId],
        limit_per_channel: usize,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<SweepSummary, ScanError> {
        let mut sweep = SweepSummary::default();

        for &channel_id in channels {
            match self
                .scan_channel(channel_id, limit_per_channel, on_progress)
                .await
            {
                Ok(summary) => sweep.channels.push(summary),
                Err(ScanError::AccessDenied(denied)) => {
                    warn!(channel_id = denied, "No access to channel, skipping");
                    sweep.denied_channels.push(denied);
                }
                Err(fatal) => return Err(fatal),
            }
        }

        info!(
            channels = sweep.channels.len(),
            denied = sweep.denied_channels.len(),
            scanned = sweep.total_scanned(),
            archived = sweep.total_archived(),
            "Sweep complete"
        );

        Ok(sweep)
    }

    /// Exhaustive backward backfill over a channel's entire history.
    ///
    /// Paginates newest to oldest in fixed-size pages, starting from the
    /// stored cursor when resuming. The cursor is a resume hint only; the
    /// store's UNIQUE constraint is what prevents duplicate records when a
    /// resumed run revisits messages. End-of-history is declared only after
    /// two consecutive empty pages. The cursor is flushed periodically and
    /// unconditionally on loop exit, including error exits.
    ///
    /// # Errors
    ///
    /// [`ScanError::AccessDenied`] if the platform refuses the channel,
    /// [`ScanError::Fatal`] on unexpected gateway failure (the persisted
    /// cursor reflects the last flushed watermark).
    pub async fn scan_full(
        &self,
        channel_id: ChannelId,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanSummary, ScanError> {
        let resume_hint = get_scan_cursor(self.db.pool(), channel_id)
            .await
            .map_err(|e| ScanError::Fatal {
                scanned: 0,
                source: e,
            })?;

        if let Some(cursor) = resume_hint {
            info!(channel_id, cursor, "Resuming full backfill from stored cursor");
        }

        let mut before = resume_hint;
        let mut summary = ScanSummary {
            channel_id,
            scanned: 0,
            archived: 0,
            last_message_id: None,
        };
        let mut consecutive_empty: u32 = 0;
        let mut unflushed: u64 = 0;

        let result = loop {
            let query = HistoryQuery {
                limit: self.config.page_size,
                before,
                after: None,
            };

            let page = match self.gateway.fetch_history(channel_id, query).await {
                Ok(page) => page,
                Err(e) => break Err(map_gateway_error(e, summary.scanned)),
            };

            if page.is_empty() {
                consecutive_empty += 1;
                debug!(channel_id, consecutive_empty, "Empty history page");
                if consecutive_empty >= EMPTY_PAGE_TOLERANCE {
                    break Ok(());
                }
                continue;
            }
            consecutive_empty = 0;

            for message in &page {
                summary.scanned += 1;
                before = Some(message.message_id);
                summary.last_message_id = Some(message.message_id);

                match self
                    .pipeline
                    .try_archive_with_retry(
                        message,
                        self.config.contention_retries,
                        self.config.contention_backoff,
                    )
                    .await
                {
                    Ok(outcome) => {
                        if outcome.is_archived() {
                            summary.archived += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            channel_id,
                            message_id = message.message_id,
                            "Failed to archive during backfill: {e:#}"
                        );
                    }
                }

                unflushed += 1;
                if unflushed >= self.config.cursor_flush_every {
                    self.flush_cursor(channel_id, message.message_id).await;
                    unflushed = 0;
                }

                self.pace_and_report(channel_id, &summary, on_progress).await;
            }
        };

        // Unconditional flush at loop exit so a resumed run starts from the
        // last examined message even after a fatal error.
        if let Some(watermark) = summary.last_message_id {
            self.flush_cursor(channel_id, watermark).await;
        }

        match result {
            Ok(()) => {
                info!(
                    channel_id,
                    scanned = summary.scanned,
                    archived = summary.archived,
                    "Full backfill complete"
                );
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort cursor write; failures are logged, not fatal, because
    /// the UNIQUE constraint already guarantees correctness on re-scan.
    async fn flush_cursor(&self, channel_id: ChannelId, message_id: MessageId) {
        if let Err(e) = set_scan_cursor(self.db.pool(), channel_id, message_id).await {
            warn!(channel_id, message_id, "Failed to flush scan cursor: {e:#}");
        }
    }

    async fn pace_and_report(
        &self,
        channel_id: ChannelId,
        summary: &ScanSummary,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) {
        if summary.scanned > 0 && summary.scanned % self.config.progress_every == 0 {
            let progress = ScanProgress {
                channel_id,
                scanned: summary.scanned,
                archived: summary.archived,
            };
            info!(
                channel_id,
                scanned = progress.scanned,
                archived = progress.archived,
                "Scan progress"
            );
            on_progress(&progress);
        }

        // Cooperative pause so long scans don't hammer the platform gateway
        if summary.scanned > 0 && summary.scanned % self.config.pace_every == 0 {
            tokio::time::sleep(self.config.pace_delay).await;
        }
    }
}
