use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    if current_version < 3 {
        debug!("Running migration v3");
        run_migration_v3(pool).await?;
        set_schema_version(pool, 3).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Archived messages table. message_id is the external platform identifier
    // and carries the UNIQUE constraint that backs the insert-or-ignore
    // idempotence contract.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS archived_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER UNIQUE NOT NULL,
            content TEXT NOT NULL,
            reactions INTEGER NOT NULL DEFAULT 0,
            channel_id INTEGER NOT NULL,
            server_id INTEGER NOT NULL,
            author_name TEXT NOT NULL,
            message_url TEXT NOT NULL,
            image_url TEXT,
            reaction_emoji TEXT,
            archived_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create archived_messages table")?;

    // Per-channel scan watermarks
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS scan_progress (
            channel_id INTEGER PRIMARY KEY,
            last_message_id INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create scan_progress table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: adding poll rotation counter");

    sqlx::query(
        "ALTER TABLE archived_messages ADD COLUMN times_polled INTEGER NOT NULL DEFAULT 0",
    )
    .execute(pool)
    .await
    .context("Failed to add times_polled column")?;

    Ok(())
}

async fn run_migration_v3(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v3: creating leaderboard table");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS leaderboard (
            user_id INTEGER PRIMARY KEY,
            points INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create leaderboard table")?;

    // Author lookups back the poll decoy queries and the stats command
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_archived_messages_author ON archived_messages(author_name)",
    )
    .execute(pool)
    .await
    .context("Failed to create author index")?;

    Ok(())
}
