//! Integration tests for database operations.

use reaction_archiver::db::{
    add_points, count_archived, delete_archived, distinct_authors_excluding, get_archive_stats,
    get_archived, get_points, get_scan_cursor, increment_times_polled, insert_archived_if_absent,
    is_archived, reset_leaderboard, sample_least_polled, sample_random, set_scan_cursor,
    top_points, Database, NewArchivedRecord,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn record(message_id: i64, author: &str) -> NewArchivedRecord {
    NewArchivedRecord {
        message_id,
        content: format!("message {message_id}"),
        reactions: 5,
        channel_id: 10,
        server_id: 1,
        author_name: author.to_string(),
        message_url: format!("https://discord.com/channels/1/10/{message_id}"),
        image_url: None,
        reaction_emoji: Some("👍".to_string()),
    }
}

#[tokio::test]
async fn test_insert_if_absent_is_idempotent() {
    let (db, _temp_dir) = setup_db().await;

    let created = insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .expect("Failed to insert");
    assert!(created);

    // Second attempt with different field values must be a no-op
    let mut conflicting = record(100, "mallory");
    conflicting.reactions = 99;
    let created = insert_archived_if_absent(db.pool(), &conflicting)
        .await
        .expect("Failed to re-insert");
    assert!(!created);

    let stored = get_archived(db.pool(), 100)
        .await
        .expect("Failed to fetch")
        .expect("Record not found");
    assert_eq!(stored.author_name, "alice");
    assert_eq!(stored.reactions, 5);
}

#[tokio::test]
async fn test_is_archived_and_get() {
    let (db, _temp_dir) = setup_db().await;

    assert!(!is_archived(db.pool(), 100).await.unwrap());
    assert!(get_archived(db.pool(), 100).await.unwrap().is_none());

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();

    assert!(is_archived(db.pool(), 100).await.unwrap());
    let stored = get_archived(db.pool(), 100).await.unwrap().unwrap();
    assert_eq!(stored.message_id, 100);
    assert_eq!(stored.times_polled, 0);
    assert!(!stored.archived_at.is_empty());
}

#[tokio::test]
async fn test_sample_random_empty_then_single() {
    let (db, _temp_dir) = setup_db().await;

    assert!(sample_random(db.pool()).await.unwrap().is_none());

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();

    let sampled = sample_random(db.pool())
        .await
        .unwrap()
        .expect("Should sample the only record");
    assert_eq!(sampled.message_id, 100);
}

#[tokio::test]
async fn test_sample_least_polled_prefers_fresh_records() {
    let (db, _temp_dir) = setup_db().await;

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(200, "bob"))
        .await
        .unwrap();

    for _ in 0..3 {
        increment_times_polled(db.pool(), 100).await.unwrap();
    }

    // The never-polled record always wins the weighted sample
    for _ in 0..10 {
        let sampled = sample_least_polled(db.pool()).await.unwrap().unwrap();
        assert_eq!(sampled.message_id, 200);
    }

    let polled = get_archived(db.pool(), 100).await.unwrap().unwrap();
    assert_eq!(polled.times_polled, 3);
}

#[tokio::test]
async fn test_delete_archived_reports_existence() {
    let (db, _temp_dir) = setup_db().await;

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();

    assert!(delete_archived(db.pool(), 100).await.unwrap());
    assert!(!is_archived(db.pool(), 100).await.unwrap());

    // Deleting again reports that nothing existed
    assert!(!delete_archived(db.pool(), 100).await.unwrap());
}

#[tokio::test]
async fn test_scan_cursor_replace_semantics() {
    let (db, _temp_dir) = setup_db().await;

    assert!(get_scan_cursor(db.pool(), 10).await.unwrap().is_none());

    set_scan_cursor(db.pool(), 10, 100).await.unwrap();
    assert_eq!(get_scan_cursor(db.pool(), 10).await.unwrap(), Some(100));

    set_scan_cursor(db.pool(), 10, 250).await.unwrap();
    assert_eq!(get_scan_cursor(db.pool(), 10).await.unwrap(), Some(250));

    // Cursors are per channel
    assert!(get_scan_cursor(db.pool(), 11).await.unwrap().is_none());
}

#[tokio::test]
async fn test_leaderboard_accumulates_and_resets() {
    let (db, _temp_dir) = setup_db().await;

    assert_eq!(get_points(db.pool(), 42).await.unwrap(), 0);

    add_points(db.pool(), 42, 1).await.unwrap();
    add_points(db.pool(), 42, 1).await.unwrap();
    add_points(db.pool(), 7, 1).await.unwrap();

    assert_eq!(get_points(db.pool(), 42).await.unwrap(), 2);
    assert_eq!(get_points(db.pool(), 7).await.unwrap(), 1);

    let top = top_points(db.pool(), 10).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].user_id, 42);
    assert_eq!(top[0].points, 2);

    reset_leaderboard(db.pool()).await.unwrap();
    assert_eq!(get_points(db.pool(), 42).await.unwrap(), 0);
    assert!(top_points(db.pool(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_distinct_authors_excluding() {
    let (db, _temp_dir) = setup_db().await;

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(200, "bob"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(300, "bob"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(400, "carol"))
        .await
        .unwrap();

    let decoys = distinct_authors_excluding(db.pool(), "alice", 3).await.unwrap();
    assert_eq!(decoys.len(), 2);
    assert!(!decoys.contains(&"alice".to_string()));
    assert!(decoys.contains(&"bob".to_string()));
    assert!(decoys.contains(&"carol".to_string()));
}

#[tokio::test]
async fn test_archive_stats() {
    let (db, _temp_dir) = setup_db().await;

    assert_eq!(count_archived(db.pool()).await.unwrap(), 0);

    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(200, "alice"))
        .await
        .unwrap();
    let mut heart = record(300, "bob");
    heart.reaction_emoji = Some("❤️".to_string());
    insert_archived_if_absent(db.pool(), &heart).await.unwrap();

    let stats = get_archive_stats(db.pool()).await.unwrap();
    assert_eq!(stats.total_archived, 3);
    assert_eq!(stats.top_authors[0], ("alice".to_string(), 2));
    assert_eq!(stats.top_emojis[0], ("👍".to_string(), 2));
    assert_eq!(stats.top_emojis[1], ("❤️".to_string(), 1));
}
