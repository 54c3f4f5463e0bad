//! Integration tests for the poll engine.

use std::time::Duration;

use reaction_archiver::db::{
    get_archived, get_points, insert_archived_if_absent, Database, NewArchivedRecord,
};
use reaction_archiver::poll::{PollEngine, PollError, VoteOutcome, MAX_TIMEOUT, MIN_TIMEOUT};
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
        content: format!("something {author} once said"),
        reactions: 5,
        channel_id: 10,
        server_id: 1,
        author_name: author.to_string(),
        message_url: format!("https://discord.com/channels/1/10/{message_id}"),
        image_url: None,
        reaction_emoji: Some("👍".to_string()),
    }
}

/// Three authors so every poll can draw its two decoys.
async fn seed_authors(db: &Database) {
    for (id, author) in [(100, "alice"), (200, "bob"), (300, "carol")] {
        insert_archived_if_absent(db.pool(), &record(id, author))
            .await
            .expect("Failed to seed record");
    }
}

#[tokio::test]
async fn test_open_poll_empty_store() {
    let (db, _temp_dir) = setup_db().await;
    let engine = PollEngine::new(db, Duration::from_secs(30));

    let err = engine.open_poll(None).await.expect_err("Expected failure");
    assert!(matches!(err, PollError::NoArchivedMessages));
}

#[tokio::test]
async fn test_open_poll_needs_enough_authors() {
    let (db, _temp_dir) = setup_db().await;
    insert_archived_if_absent(db.pool(), &record(100, "alice"))
        .await
        .unwrap();
    insert_archived_if_absent(db.pool(), &record(200, "bob"))
        .await
        .unwrap();

    let engine = PollEngine::new(db, Duration::from_secs(30));
    let err = engine.open_poll(None).await.expect_err("Expected failure");
    assert!(matches!(err, PollError::NotEnoughAuthors));
}

#[tokio::test]
async fn test_open_poll_shape_and_rotation_counter() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db.clone(), Duration::from_secs(30));
    let poll = engine.open_poll(None).await.expect("Failed to open poll");

    assert_eq!(poll.choices.len(), 3);
    assert!(!poll.anonymized_content.is_empty());
    assert_eq!(engine.open_count().await, 1);

    // The sampled record's rotation counter was bumped; settle to find out
    // which record was drawn.
    let settlement = engine.settle(poll.id).await.expect("Failed to settle");
    assert!(poll.choices.contains(&settlement.true_author));

    let polled: Vec<i64> = {
        let mut out = Vec::new();
        for id in [100, 200, 300] {
            out.push(get_archived(db.pool(), id).await.unwrap().unwrap().times_polled);
        }
        out
    };
    assert_eq!(polled.iter().sum::<i64>(), 1);
}

#[tokio::test]
async fn test_vote_exclusivity() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db, Duration::from_secs(30));
    let poll = engine.open_poll(None).await.unwrap();
    let first_choice = poll.choices[0].clone();
    let second_choice = poll.choices[1].clone();

    assert_eq!(
        engine.submit_vote(poll.id, 7, &first_choice).await,
        VoteOutcome::Accepted
    );
    // Repeat votes are rejected, even for a different choice
    assert_eq!(
        engine.submit_vote(poll.id, 7, &first_choice).await,
        VoteOutcome::AlreadyVoted
    );
    assert_eq!(
        engine.submit_vote(poll.id, 7, &second_choice).await,
        VoteOutcome::AlreadyVoted
    );

    let settlement = engine.settle(poll.id).await.unwrap();
    let total_votes: u64 = settlement.tally.iter().map(|(_, count)| count).sum();
    assert_eq!(total_votes, 1);
    assert_eq!(settlement.participants, 1);
}

#[tokio::test]
async fn test_unknown_choice_rejected() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db, Duration::from_secs(30));
    let poll = engine.open_poll(None).await.unwrap();

    assert_eq!(
        engine.submit_vote(poll.id, 7, "nobody").await,
        VoteOutcome::UnknownChoice
    );

    let settlement = engine.settle(poll.id).await.unwrap();
    assert_eq!(settlement.participants, 0);
}

#[tokio::test]
async fn test_single_voter_cannot_score() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db.clone(), Duration::from_secs(30));
    let poll = engine.open_poll(None).await.unwrap();

    // One vote, correct or not, must never score
    let choice = poll.choices[0].clone();
    assert_eq!(
        engine.submit_vote(poll.id, 7, &choice).await,
        VoteOutcome::Accepted
    );

    let settlement = engine.settle(poll.id).await.unwrap();
    assert_eq!(settlement.participants, 1);
    // Whether or not the lone vote was correct, nobody scores
    assert!(settlement.scored.is_empty());
    assert_eq!(get_points(db.pool(), 7).await.unwrap(), 0);
}

#[tokio::test]
async fn test_two_participants_one_correct_scores_one_point() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db.clone(), Duration::from_secs(30));
    let poll = engine.open_poll(None).await.unwrap();

    // Learn the true author without settling: it is the author of the
    // record whose counter was bumped.
    let mut true_author = String::new();
    for id in [100, 200, 300] {
        let stored = get_archived(db.pool(), id).await.unwrap().unwrap();
        if stored.times_polled == 1 {
            true_author = stored.author_name;
        }
    }
    assert!(!true_author.is_empty());
    let wrong = poll
        .choices
        .iter()
        .find(|c| **c != true_author)
        .expect("Expected a decoy choice")
        .clone();

    assert_eq!(
        engine.submit_vote(poll.id, 7, &true_author).await,
        VoteOutcome::Accepted
    );
    assert_eq!(
        engine.submit_vote(poll.id, 8, &wrong).await,
        VoteOutcome::Accepted
    );

    let settlement = engine.settle(poll.id).await.unwrap();
    assert_eq!(settlement.participants, 2);
    assert_eq!(settlement.winners, vec![7]);
    assert_eq!(settlement.scored, vec![7]);
    assert_eq!(get_points(db.pool(), 7).await.unwrap(), 1);
    assert_eq!(get_points(db.pool(), 8).await.unwrap(), 0);
}

#[tokio::test]
async fn test_settlement_is_single_shot_and_closes_votes() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db, Duration::from_secs(30));
    let poll = engine.open_poll(None).await.unwrap();
    let choice = poll.choices[0].clone();

    assert!(engine.settle(poll.id).await.is_some());
    assert!(engine.settle(poll.id).await.is_none());
    assert_eq!(engine.open_count().await, 0);

    // Late clicks resolve to Closed
    assert_eq!(
        engine.submit_vote(poll.id, 7, &choice).await,
        VoteOutcome::Closed
    );
}

#[tokio::test]
async fn test_timeout_clamped_to_bounds() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db, Duration::from_secs(30));

    let poll = engine
        .open_poll(Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(poll.timeout, MIN_TIMEOUT);
    let _ = engine.settle(poll.id).await;

    let poll = engine
        .open_poll(Some(Duration::from_secs(86400)))
        .await
        .unwrap();
    assert_eq!(poll.timeout, MAX_TIMEOUT);
    let _ = engine.settle(poll.id).await;
}

#[tokio::test]
async fn test_run_to_settlement_fires_on_timeout() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = std::sync::Arc::new(PollEngine::new(db, Duration::from_secs(30)));
    let poll = engine.open_poll(None).await.unwrap();
    let choice = poll.choices[0].clone();

    assert_eq!(
        engine.submit_vote(poll.id, 7, &choice).await,
        VoteOutcome::Accepted
    );

    // The voting window elapses, then the poll settles exactly once
    let settlement = engine
        .run_to_settlement(poll.id)
        .await
        .expect("Poll should settle on timeout");
    assert_eq!(settlement.participants, 1);
    assert_eq!(engine.open_count().await, 0);
}

#[tokio::test]
async fn test_rotation_prefers_least_polled_records() {
    let (db, _temp_dir) = setup_db().await;
    seed_authors(&db).await;

    let engine = PollEngine::new(db.clone(), Duration::from_secs(30));

    // Three polls in a row must each draw a different record
    for _ in 0..3 {
        let poll = engine.open_poll(None).await.unwrap();
        let _ = engine.settle(poll.id).await;
    }

    for id in [100, 200, 300] {
        let stored = get_archived(db.pool(), id).await.unwrap().unwrap();
        assert_eq!(stored.times_polled, 1, "record {id} polled unevenly");
    }
}
