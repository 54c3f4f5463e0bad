//! Anonymized "guess the author" polls over archived records.
//!
//! A session is `Open -> Settled`, nothing else: votes are accepted until
//! the timeout fires, settlement is single-shot, and a settled session is
//! destroyed so late clicks resolve to [`VoteOutcome::Closed`]. The
//! embedding adapter binds widget clicks to [`PollEngine::submit_vote`] and
//! renders the [`Settlement`] when the timer resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::{
    add_points, distinct_authors_excluding, increment_times_polled, sample_least_polled,
    ArchivedRecord, Database, UserId,
};

/// Voting window bounds; requested timeouts are clamped into this range.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(1800);

/// Decoy authors fetched per poll: at least 2 (else the poll is pointless),
/// at most 3 (so the widget shows 3-4 choices).
const MAX_DECOYS: i64 = 3;
const MIN_DECOYS: usize = 2;

const PREVIEW_CHARS: usize = 200;

pub type PollId = u64;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("no archived messages to poll")]
    NoArchivedMessages,
    #[error("not enough distinct archived authors for a poll")]
    NotEnoughAuthors,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Outcome of a vote submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    /// The participant already voted; the tally is unchanged.
    AlreadyVoted,
    /// The choice is not part of this poll.
    UnknownChoice,
    /// The poll does not exist or has already settled.
    Closed,
}

/// What the adapter renders into the choice widget when a poll opens.
#[derive(Debug, Clone)]
pub struct OpenPoll {
    pub id: PollId,
    /// Truncated content with the author withheld.
    pub anonymized_content: String,
    /// Shuffled author choices, true author included.
    pub choices: Vec<String>,
    pub image_url: Option<String>,
    pub reaction_emoji: Option<String>,
    /// Clamped voting window.
    pub timeout: Duration,
}

/// Frozen results of a settled poll.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub content: String,
    /// Per-choice vote counts in widget display order.
    pub tally: Vec<(String, u64)>,
    pub true_author: String,
    pub message_url: String,
    /// Participants whose vote matched the true author.
    pub winners: Vec<UserId>,
    /// Winners whose point award actually landed.
    pub scored: Vec<UserId>,
    pub participants: usize,
}

#[derive(Debug)]
struct PollSession {
    record: ArchivedRecord,
    choices: Vec<String>,
    votes: HashMap<String, u64>,
    voted_users: HashMap<UserId, String>,
    timeout: Duration,
}

/// Runs timed author-guessing polls and settles them against the
/// leaderboard.
pub struct PollEngine {
    db: Database,
    default_timeout: Duration,
    sessions: Mutex<HashMap<PollId, PollSession>>,
    next_id: AtomicU64,
}

impl PollEngine {
    #[must_use]
    pub fn new(db: Database, default_timeout: Duration) -> Self {
        Self {
            db,
            default_timeout,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a poll over a weighted-random archived record.
    ///
    /// The candidate is sampled preferring least-polled records, its
    /// rotation counter is bumped, and 2-3 decoy authors are drawn from the
    /// store. The returned choice list is shuffled and includes the true
    /// author.
    ///
    /// # Errors
    ///
    /// [`PollError::NoArchivedMessages`] on an empty archive,
    /// [`PollError::NotEnoughAuthors`] when fewer than two other authors
    /// exist, [`PollError::Storage`] on storage failure.
    pub async fn open_poll(&self, timeout: Option<Duration>) -> Result<OpenPoll, PollError> {
        let record = sample_least_polled(self.db.pool())
            .await?
            .ok_or(PollError::NoArchivedMessages)?;

        let decoys =
            distinct_authors_excluding(self.db.pool(), &record.author_name, MAX_DECOYS).await?;
        if decoys.len() < MIN_DECOYS {
            return Err(PollError::NotEnoughAuthors);
        }

        increment_times_polled(self.db.pool(), record.message_id).await?;

        let mut choices = decoys;
        choices.push(record.author_name.clone());
        choices.shuffle(&mut rand::thread_rng());

        let timeout = timeout
            .unwrap_or(self.default_timeout)
            .clamp(MIN_TIMEOUT, MAX_TIMEOUT);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let open = OpenPoll {
            id,
            anonymized_content: anonymized_preview(&record.content),
            choices: choices.clone(),
            image_url: record.image_url.clone(),
            reaction_emoji: record.reaction_emoji.clone(),
            timeout,
        };

        let session = PollSession {
            votes: choices.iter().map(|c| (c.clone(), 0)).collect(),
            choices,
            voted_users: HashMap::new(),
            timeout,
            record,
        };
        self.sessions.lock().await.insert(id, session);

        info!(
            poll_id = id,
            timeout_secs = timeout.as_secs(),
            "Opened author-guessing poll"
        );

        Ok(open)
    }

    /// Record one participant's vote. At most one vote per participant is
    /// accepted; repeats are rejected without touching the tally.
    pub async fn submit_vote(&self, poll_id: PollId, user_id: UserId, choice: &str) -> VoteOutcome {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&poll_id) else {
            return VoteOutcome::Closed;
        };

        if session.voted_users.contains_key(&user_id) {
            return VoteOutcome::AlreadyVoted;
        }

        let Some(count) = session.votes.get_mut(choice) else {
            return VoteOutcome::UnknownChoice;
        };

        *count += 1;
        session.voted_users.insert(user_id, choice.to_string());
        VoteOutcome::Accepted
    }

    /// Suspend for the poll's voting window, then settle it.
    ///
    /// Returns `None` if the poll is unknown or was already settled.
    pub async fn run_to_settlement(&self, poll_id: PollId) -> Option<Settlement> {
        let timeout = {
            let sessions = self.sessions.lock().await;
            sessions.get(&poll_id)?.timeout
        };

        tokio::time::sleep(timeout).await;
        self.settle(poll_id).await
    }

    /// Settle a poll: freeze tallies, compute winners, award points.
    ///
    /// Single-shot: the session is removed first, so a concurrent or
    /// repeated settle returns `None` and late votes see
    /// [`VoteOutcome::Closed`]. Points are only awarded when at least two
    /// distinct participants voted (a lone voter cannot score off their own
    /// poll), one point per winner; a failed award for one winner does not
    /// block the others.
    pub async fn settle(&self, poll_id: PollId) -> Option<Settlement> {
        let session = self.sessions.lock().await.remove(&poll_id)?;

        let true_author = session.record.author_name.clone();
        let participants = session.voted_users.len();

        let winners: Vec<UserId> = session
            .voted_users
            .iter()
            .filter(|(_, choice)| **choice == true_author)
            .map(|(&user_id, _)| user_id)
            .collect();

        let mut scored = Vec::new();
        if participants >= 2 {
            for &user_id in &winners {
                match add_points(self.db.pool(), user_id, 1).await {
                    Ok(()) => scored.push(user_id),
                    Err(e) => {
                        warn!(poll_id, user_id, "Failed to award poll point: {e:#}");
                    }
                }
            }
        }

        let tally = session
            .choices
            .iter()
            .map(|choice| {
                let count = session.votes.get(choice).copied().unwrap_or(0);
                (choice.clone(), count)
            })
            .collect();

        info!(
            poll_id,
            participants,
            winners = winners.len(),
            scored = scored.len(),
            "Poll settled"
        );

        Some(Settlement {
            content: session.record.content.clone(),
            tally,
            true_author,
            message_url: session.record.message_url.clone(),
            winners,
            scored,
            participants,
        })
    }

    /// Number of currently open polls.
    pub async fn open_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Truncate content for anonymized display, preserving char boundaries.
#[must_use]
pub fn anonymized_preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymized_preview_short_content_untouched() {
        assert_eq!(anonymized_preview("hello"), "hello");
    }

    #[test]
    fn test_anonymized_preview_truncates_long_content() {
        let long = "x".repeat(300);
        let preview = anonymized_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_anonymized_preview_multibyte_boundary() {
        let long = "é".repeat(250);
        let preview = anonymized_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
