use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult, db};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub last_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub text: Option<String>,
    pub file: Option<String>,
    pub seen: bool,
    pub created_at: i64,
}

/// Two conversations are the same conversation iff their participant sets are
/// equal as sets. Sorting and deduping gives every set one canonical key,
/// which the UNIQUE column turns into idempotent creation.
fn participants_key(participants: &[String]) -> AppResult<(Vec<String>, String)> {
    let mut normalized: Vec<String> = participants.to_vec();
    normalized.sort();
    normalized.dedup();

    if normalized.len() < 2 {
        return Err(AppError::Validation(
            "At least 2 participants required".to_owned(),
        ));
    }

    let key = normalized.join(",");
    Ok((normalized, key))
}

pub async fn find_or_create_conversation(
    pool: &SqlitePool,
    participants: &[String],
) -> AppResult<(Conversation, bool)> {
    let (normalized, key) = participants_key(participants)?;

    let id = Uuid::now_v7().to_string();
    let now = db::now_millis();

    // One transaction covers the conversation row and its participant rows,
    // so no failure can commit a conversation without its participant set.
    // A concurrent creator may win the unique key; DO NOTHING and re-select
    // so both callers end up with the same record.
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO conversations (id,participants_key,last_message,created_at,updated_at)
         VALUES (?,?,NULL,?,?) ON CONFLICT (participants_key) DO NOTHING",
    )
    .bind(&id)
    .bind(&key)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let (conversation_id,): (String,) =
        sqlx::query_as("SELECT id FROM conversations WHERE participants_key=?")
            .bind(&key)
            .fetch_one(&mut *tx)
            .await?;

    // A no-op for an existing conversation; also restores the participant
    // rows of a record an older, pre-transactional writer left stranded.
    for user_id in &normalized {
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id,user_id)
             VALUES (?,?) ON CONFLICT (conversation_id,user_id) DO NOTHING",
        )
        .bind(&conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let conversation = conversation_by_key(pool, &key)
        .await?
        .ok_or(AppError::NotFound("Conversation not found".to_owned()))?;
    Ok((conversation, inserted.rows_affected() > 0))
}

pub async fn list_conversations(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Conversation>> {
    let rows: Vec<(String, Option<String>, i64, i64)> = sqlx::query_as(
        "SELECT c.id,c.last_message,c.created_at,c.updated_at
         FROM conversations c
         JOIN conversation_participants p ON p.conversation_id = c.id
         WHERE p.user_id = ?
         ORDER BY c.updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut conversations = Vec::with_capacity(rows.len());
    for (id, last_message, created_at, updated_at) in rows {
        let participants = participants_of(pool, &id).await?;
        conversations.push(Conversation {
            id,
            participants,
            last_message,
            created_at,
            updated_at,
        });
    }
    Ok(conversations)
}

pub async fn append_message(
    pool: &SqlitePool,
    conversation_id: &str,
    sender: &str,
    text: Option<String>,
    file: Option<String>,
) -> AppResult<Message> {
    let text = text.filter(|t| !t.is_empty());
    let file = file.filter(|f| !f.is_empty());
    if text.is_none() && file.is_none() {
        return Err(AppError::Validation(
            "Message must have text or a file".to_owned(),
        ));
    }

    if sqlx::query_as::<_, (i64,)>("SELECT 1 FROM conversations WHERE id=?")
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Conversation not found".to_owned()));
    }

    let message = Message {
        id: Uuid::now_v7().to_string(),
        conversation_id: conversation_id.to_owned(),
        sender: sender.to_owned(),
        text,
        file,
        seen: false,
        created_at: db::now_millis(),
    };

    sqlx::query(
        "INSERT INTO messages (id,conversation_id,sender,text,file,seen,created_at)
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(&message.sender)
    .bind(&message.text)
    .bind(&message.file)
    .bind(message.seen)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE conversations SET last_message=?, updated_at=? WHERE id=?")
        .bind(preview(&message))
        .bind(message.created_at)
        .bind(conversation_id)
        .execute(pool)
        .await?;

    Ok(message)
}

pub async fn list_messages(pool: &SqlitePool, conversation_id: &str) -> AppResult<Vec<Message>> {
    // rowid breaks same-millisecond ties, so retrieval order is append order.
    let messages = sqlx::query_as(
        "SELECT id,conversation_id,sender,text,file,seen,created_at
         FROM messages WHERE conversation_id=?
         ORDER BY created_at ASC, rowid ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

/// Last-message preview shown in conversation lists: the text, or the
/// attachment's file name for attachment-only messages.
fn preview(message: &Message) -> Option<String> {
    if message.text.is_some() {
        return message.text.clone();
    }
    let file = message.file.as_deref()?;
    Some(file.rsplit('/').next().unwrap_or(file).to_owned())
}

async fn conversation_by_key(pool: &SqlitePool, key: &str) -> AppResult<Option<Conversation>> {
    let row: Option<(String, Option<String>, i64, i64)> = sqlx::query_as(
        "SELECT id,last_message,created_at,updated_at FROM conversations WHERE participants_key=?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    let Some((id, last_message, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let participants = participants_of(pool, &id).await?;
    Ok(Some(Conversation {
        id,
        participants,
        last_message,
        created_at,
        updated_at,
    }))
}

async fn participants_of(pool: &SqlitePool, conversation_id: &str) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT user_id FROM conversation_participants WHERE conversation_id=? ORDER BY rowid",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
}
