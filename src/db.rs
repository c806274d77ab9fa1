use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use time::OffsetDateTime;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS conversations (
        id               TEXT PRIMARY KEY,
        participants_key TEXT NOT NULL UNIQUE,
        last_message     TEXT,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS conversation_participants (
        conversation_id TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        UNIQUE (conversation_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id              TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        sender          TEXT NOT NULL,
        text            TEXT,
        file            TEXT,
        seen            INTEGER NOT NULL DEFAULT 0,
        created_at      INTEGER NOT NULL
    )",
];

pub async fn connect(url: &str) -> sqlx::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(url)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Unix milliseconds, the timestamp unit used in storage and on the wire.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
