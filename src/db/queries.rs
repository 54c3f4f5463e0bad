use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{
    ArchiveStats, ArchivedRecord, ChannelId, LeaderboardEntry, MessageId, NewArchivedRecord, UserId,
};

// ========== Archived Messages ==========

/// Insert an archive row unless one already exists for the message.
///
/// Uses INSERT OR IGNORE against the UNIQUE constraint on `message_id` so
/// concurrent callers (live reaction handler plus a running scan) cannot
/// produce duplicates. Returns `true` when a new row was created; `false`
/// means the message was already archived and the existing row is untouched.
pub async fn insert_archived_if_absent(
    pool: &SqlitePool,
    record: &NewArchivedRecord,
) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT OR IGNORE INTO archived_messages
            (message_id, content, reactions, channel_id, server_id,
             author_name, message_url, image_url, reaction_emoji)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(record.message_id)
    .bind(&record.content)
    .bind(record.reactions)
    .bind(record.channel_id)
    .bind(record.server_id)
    .bind(&record.author_name)
    .bind(&record.message_url)
    .bind(&record.image_url)
    .bind(&record.reaction_emoji)
    .execute(pool)
    .await
    .context("Failed to insert archived message")?;

    Ok(result.rows_affected() > 0)
}

/// Check whether a message has already been archived.
pub async fn is_archived(pool: &SqlitePool, message_id: MessageId) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM archived_messages WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(pool)
            .await
            .context("Failed to check archived message")?;

    Ok(row.is_some())
}

/// Get an archived record by its platform message id.
pub async fn get_archived(
    pool: &SqlitePool,
    message_id: MessageId,
) -> Result<Option<ArchivedRecord>> {
    sqlx::query_as("SELECT * FROM archived_messages WHERE message_id = ?")
        .bind(message_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch archived message")
}

/// Get a uniformly random archived record, or `None` on an empty archive.
pub async fn sample_random(pool: &SqlitePool) -> Result<Option<ArchivedRecord>> {
    sqlx::query_as("SELECT * FROM archived_messages ORDER BY RANDOM() LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to sample random archived message")
}

/// Get a random archived record weighted toward fair poll rotation.
///
/// Records with the lowest `times_polled` are preferred; ties are broken
/// randomly.
pub async fn sample_least_polled(pool: &SqlitePool) -> Result<Option<ArchivedRecord>> {
    sqlx::query_as("SELECT * FROM archived_messages ORDER BY times_polled ASC, RANDOM() LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to sample least-polled archived message")
}

/// Atomically bump the poll rotation counter for a record.
pub async fn increment_times_polled(pool: &SqlitePool, message_id: MessageId) -> Result<()> {
    sqlx::query("UPDATE archived_messages SET times_polled = times_polled + 1 WHERE message_id = ?")
        .bind(message_id)
        .execute(pool)
        .await
        .context("Failed to increment poll counter")?;

    Ok(())
}

/// Delete an archived record (unarchive). Returns whether a row existed.
pub async fn delete_archived(pool: &SqlitePool, message_id: MessageId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM archived_messages WHERE message_id = ?")
        .bind(message_id)
        .execute(pool)
        .await
        .context("Failed to delete archived message")?;

    Ok(result.rows_affected() > 0)
}

/// Get up to `limit` distinct author names, excluding one, in random order.
///
/// Backs decoy selection for author-guessing polls.
pub async fn distinct_authors_excluding(
    pool: &SqlitePool,
    exclude: &str,
    limit: i64,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r"
        SELECT DISTINCT author_name FROM archived_messages
        WHERE author_name != ?
        ORDER BY RANDOM()
        LIMIT ?
        ",
    )
    .bind(exclude)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch decoy authors")?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

// ========== Scan Progress ==========

/// Get the stored scan watermark for a channel.
pub async fn get_scan_cursor(pool: &SqlitePool, channel_id: ChannelId) -> Result<Option<MessageId>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT last_message_id FROM scan_progress WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch scan cursor")?;

    Ok(row.map(|(id,)| id))
}

/// Store (replace) the scan watermark for a channel.
pub async fn set_scan_cursor(
    pool: &SqlitePool,
    channel_id: ChannelId,
    last_message_id: MessageId,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO scan_progress (channel_id, last_message_id)
        VALUES (?, ?)
        ON CONFLICT(channel_id) DO UPDATE SET last_message_id = excluded.last_message_id
        ",
    )
    .bind(channel_id)
    .bind(last_message_id)
    .execute(pool)
    .await
    .context("Failed to store scan cursor")?;

    Ok(())
}

// ========== Leaderboard ==========

/// Add points to a user, creating the row on first score.
pub async fn add_points(pool: &SqlitePool, user_id: UserId, delta: i64) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO leaderboard (user_id, points)
        VALUES (?, ?)
        ON CONFLICT(user_id) DO UPDATE SET points = points + excluded.points
        ",
    )
    .bind(user_id)
    .bind(delta)
    .execute(pool)
    .await
    .context("Failed to add leaderboard points")?;

    Ok(())
}

/// Get a user's points (0 if they never scored).
pub async fn get_points(pool: &SqlitePool, user_id: UserId) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT points FROM leaderboard WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch leaderboard points")?;

    Ok(row.map_or(0, |(points,)| points))
}

/// Get the top `n` scorers, descending.
pub async fn top_points(pool: &SqlitePool, n: i64) -> Result<Vec<LeaderboardEntry>> {
    sqlx::query_as("SELECT user_id, points FROM leaderboard ORDER BY points DESC LIMIT ?")
        .bind(n)
        .fetch_all(pool)
        .await
        .context("Failed to fetch leaderboard")
}

/// Wipe all scores.
pub async fn reset_leaderboard(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM leaderboard")
        .execute(pool)
        .await
        .context("Failed to reset leaderboard")?;

    Ok(())
}

// ========== Stats ==========

/// Count archived messages.
pub async fn count_archived(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM archived_messages")
        .fetch_one(pool)
        .await
        .context("Failed to count archived messages")?;

    Ok(count)
}

/// Most-archived authors, descending.
pub async fn top_archived_authors(pool: &SqlitePool, n: i64) -> Result<Vec<(String, i64)>> {
    sqlx::query_as(
        r"
        SELECT author_name, COUNT(*) as count FROM archived_messages
        GROUP BY author_name ORDER BY count DESC LIMIT ?
        ",
    )
    .bind(n)
    .fetch_all(pool)
    .await
    .context("Failed to fetch top authors")
}

/// Most frequent trigger emojis, descending.
pub async fn top_reaction_emojis(pool: &SqlitePool, n: i64) -> Result<Vec<(String, i64)>> {
    sqlx::query_as(
        r"
        SELECT reaction_emoji, COUNT(*) as count FROM archived_messages
        WHERE reaction_emoji IS NOT NULL
        GROUP BY reaction_emoji ORDER BY count DESC LIMIT ?
        ",
    )
    .bind(n)
    .fetch_all(pool)
    .await
    .context("Failed to fetch top emojis")
}

/// Aggregate archive statistics for the stats command.
pub async fn get_archive_stats(pool: &SqlitePool) -> Result<ArchiveStats> {
    Ok(ArchiveStats {
        total_archived: count_archived(pool).await?,
        top_authors: top_archived_authors(pool, 10).await?,
        top_emojis: top_reaction_emojis(pool, 10).await?,
    })
}
