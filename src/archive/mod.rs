//! The archival pipeline: policy evaluation plus idempotent persistence.

pub mod policy;

pub use policy::RejectReason;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ArchiveSettings;
use crate::db::{
    self, delete_archived, insert_archived_if_absent, is_archived, Database, MessageId,
    NewArchivedRecord,
};
use crate::gateway::MessageSnapshot;

/// Outcome of one archival attempt. Rejections are no-ops, not errors.
#[derive(Debug, Clone)]
pub enum ArchiveOutcome {
    /// A new record was created with these fields.
    Archived(NewArchivedRecord),
    Rejected(RejectReason),
}

impl ArchiveOutcome {
    /// Whether this attempt created a new record.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        matches!(self, Self::Archived(_))
    }
}

/// Evaluates candidates against the archival policy and persists accepted
/// records. Shared by the live reaction handler, the manual archive
/// command, and the scan orchestrator; the store's UNIQUE constraint keeps
/// those paths from duplicating each other's work.
#[derive(Clone)]
pub struct ArchivePipeline {
    db: Database,
    settings: Arc<ArchiveSettings>,
}

impl ArchivePipeline {
    #[must_use]
    pub fn new(db: Database, settings: Arc<ArchiveSettings>) -> Self {
        Self { db, settings }
    }

    /// Evaluate a message and archive it if it qualifies.
    ///
    /// Rejection checks run in order: bot author, empty content, already
    /// archived, below threshold. The final insert is insert-or-ignore, so
    /// a concurrent archival of the same message between the duplicate
    /// check and the insert collapses to a rejection rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub async fn try_archive(&self, message: &MessageSnapshot) -> Result<ArchiveOutcome> {
        if let Some(reason) = policy::screen(message) {
            return Ok(ArchiveOutcome::Rejected(reason));
        }

        if is_archived(self.db.pool(), message.message_id).await? {
            return Ok(ArchiveOutcome::Rejected(RejectReason::AlreadyArchived));
        }

        let record = match policy::build_record(message, self.settings.threshold()) {
            Ok(record) => record,
            Err(reason) => return Ok(ArchiveOutcome::Rejected(reason)),
        };

        let created = insert_archived_if_absent(self.db.pool(), &record).await?;
        if !created {
            // Lost the race against a concurrent archival of the same message
            return Ok(ArchiveOutcome::Rejected(RejectReason::AlreadyArchived));
        }

        info!(
            message_id = record.message_id,
            channel_id = record.channel_id,
            author = %record.author_name,
            reactions = record.reactions,
            "Archived message"
        );

        Ok(ArchiveOutcome::Archived(record))
    }

    /// [`Self::try_archive`] with bounded retries on transient storage
    /// contention. Non-contention errors propagate immediately.
    pub async fn try_archive_with_retry(
        &self,
        message: &MessageSnapshot,
        retries: u32,
        backoff: Duration,
    ) -> Result<ArchiveOutcome> {
        let mut attempt = 0;
        loop {
            match self.try_archive(message).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if db::is_storage_contention(&e) && attempt < retries => {
                    attempt += 1;
                    warn!(
                        message_id = message.message_id,
                        attempt,
                        "Storage contention while archiving, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a message from the archive. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn unarchive(&self, message_id: MessageId) -> Result<bool> {
        let removed = delete_archived(self.db.pool(), message_id).await?;
        if removed {
            info!(message_id, "Unarchived message");
        }
        Ok(removed)
    }

    /// The settings object backing this pipeline's threshold checks.
    #[must_use]
    pub fn settings(&self) -> &Arc<ArchiveSettings> {
        &self.settings
    }
}
