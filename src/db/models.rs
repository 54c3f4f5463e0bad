use serde::{Deserialize, Serialize};

/// Platform identifiers are snowflake-style integers.
pub type MessageId = i64;
pub type ChannelId = i64;
pub type ServerId = i64;
pub type UserId = i64;

/// A message archived after crossing the reaction threshold.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArchivedRecord {
    pub id: i64,
    pub message_id: MessageId,
    pub content: String,
    /// Maximum reaction count observed across all reaction types at archive time.
    pub reactions: i64,
    pub channel_id: ChannelId,
    pub server_id: ServerId,
    /// Display-name snapshot; the author may later rename or leave.
    pub author_name: String,
    pub message_url: String,
    pub image_url: Option<String>,
    /// Emoji of the reaction that first satisfied the threshold.
    pub reaction_emoji: Option<String>,
    pub archived_at: String,
    /// How many times this record has been used by the poll engine.
    pub times_polled: i64,
}

/// Fields for a new archive row. `archived_at` and `times_polled` are
/// assigned by the database at insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArchivedRecord {
    pub message_id: MessageId,
    pub content: String,
    pub reactions: i64,
    pub channel_id: ChannelId,
    pub server_id: ServerId,
    pub author_name: String,
    pub message_url: String,
    pub image_url: Option<String>,
    pub reaction_emoji: Option<String>,
}

/// A user's accumulated poll score.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub points: i64,
}

/// Aggregate statistics over the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total_archived: i64,
    /// Most-archived authors, descending, at most 10.
    pub top_authors: Vec<(String, i64)>,
    /// Most frequent trigger emojis, descending, at most 10.
    pub top_emojis: Vec<(String, i64)>,
}
