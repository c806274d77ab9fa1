use std::time::Duration;

use orbit::AppError;
use orbit::conversations::store;
use orbit::db;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

async fn test_pool() -> SqlitePool {
    // One connection so every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_schema(&pool).await.unwrap();
    pool
}

fn users(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn conversation_creation_is_idempotent_and_order_independent() {
    let pool = test_pool().await;

    let (first, created) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();
    assert!(created);

    let (second, created) = store::find_or_create_conversation(&pool, &users(&["u2", "u1"]))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn duplicate_participants_collapse_to_one_set() {
    let pool = test_pool().await;

    let (conv, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u2", "u1"]))
        .await
        .unwrap();
    assert_eq!(conv.participants, users(&["u1", "u2"]));

    let err = store::find_or_create_conversation(&pool, &users(&["u1", "u1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn find_or_create_restores_missing_participant_rows() {
    let pool = test_pool().await;

    // A conversation row whose participant rows never landed, as a writer
    // without the creation transaction could leave behind.
    sqlx::query(
        "INSERT INTO conversations (id,participants_key,last_message,created_at,updated_at)
         VALUES ('stranded','u1,u2',NULL,0,0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let (conv, created) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(conv.id, "stranded");
    assert_eq!(conv.participants, users(&["u1", "u2"]));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // The record is visible to its members again.
    let listed = store::list_conversations(&pool, "u1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "stranded");
}

#[tokio::test]
async fn creation_commits_conversation_and_participants_together() {
    let pool = test_pool().await;

    let (conv, created) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();
    assert!(created);
    assert_eq!(conv.participants.len(), 2);

    let (participant_rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM conversation_participants WHERE conversation_id=?")
            .bind(&conv.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(participant_rows, 2);
}

#[tokio::test]
async fn message_requires_text_or_file() {
    let pool = test_pool().await;
    let (conv, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();

    let err = store::append_message(&pool, &conv.id, "u1", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = store::append_message(&pool, &conv.id, "u1", Some(String::new()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // An empty attachment reference is as absent as empty text.
    let err = store::append_message(&pool, &conv.id, "u1", None, Some(String::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = store::append_message(
        &pool,
        &conv.id,
        "u1",
        Some(String::new()),
        Some(String::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn attachment_only_message_is_stored_and_retrievable() {
    let pool = test_pool().await;
    let (conv, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();

    let sent = store::append_message(
        &pool,
        &conv.id,
        "u1",
        None,
        Some("https://cdn.example/orbit-messages/report.pdf".to_owned()),
    )
    .await
    .unwrap();
    assert!(!sent.seen);

    let messages = store::list_messages(&pool, &conv.id).await.unwrap();
    assert_eq!(messages, vec![sent]);

    let listed = store::list_conversations(&pool, "u2").await.unwrap();
    assert_eq!(listed[0].last_message.as_deref(), Some("report.pdf"));
}

#[tokio::test]
async fn append_to_unknown_conversation_is_not_found() {
    let pool = test_pool().await;

    let err = store::append_message(&pool, "no-such-conversation", "u1", Some("hi".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn messages_come_back_in_append_order() {
    let pool = test_pool().await;
    let (conv_a, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();
    let (conv_b, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u3"]))
        .await
        .unwrap();

    // Interleave appends across two conversations.
    let mut expected_a = Vec::new();
    for i in 0..5 {
        expected_a.push(
            store::append_message(&pool, &conv_a.id, "u1", Some(format!("a{i}")), None)
                .await
                .unwrap()
                .id,
        );
        store::append_message(&pool, &conv_b.id, "u3", Some(format!("b{i}")), None)
            .await
            .unwrap();
    }

    let ids: Vec<String> = store::list_messages(&pool, &conv_a.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, expected_a);

    let texts: Vec<Option<String>> = store::list_messages(&pool, &conv_b.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(
        texts,
        (0..5).map(|i| Some(format!("b{i}"))).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn new_message_bumps_conversation_recency() {
    let pool = test_pool().await;
    let (conv_a, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u2"]))
        .await
        .unwrap();
    let (conv_b, _) = store::find_or_create_conversation(&pool, &users(&["u1", "u3"]))
        .await
        .unwrap();

    // Millisecond timestamps; keep the two appends in distinct ticks.
    store::append_message(&pool, &conv_b.id, "u3", Some("first".into()), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let last = store::append_message(&pool, &conv_a.id, "u1", Some("second".into()), None)
        .await
        .unwrap();

    let listed = store::list_conversations(&pool, "u1").await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![conv_a.id.as_str(), conv_b.id.as_str()]);
    assert_eq!(listed[0].last_message.as_deref(), Some("second"));
    assert_eq!(listed[0].updated_at, last.created_at);

    // u2 only sees the conversation it belongs to.
    let for_u2 = store::list_conversations(&pool, "u2").await.unwrap();
    assert_eq!(for_u2.len(), 1);
    assert_eq!(for_u2[0].id, conv_a.id);
}
