//! SQLite connection pool for the conversation store.

use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        creation_time TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(user_id),
        command TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS responses (
        response_id TEXT PRIMARY KEY,
        message_id TEXT NOT NULL UNIQUE REFERENCES messages(message_id),
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id)",
];

/// Open a pool for `database_url` and create the tables if missing.
///
/// Accepts `sqlite://path`, plain paths and `sqlite::memory:`. In-memory
/// databases live per connection, so they get a single connection that is
/// never recycled.
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    info!(database_url, "initializing SQLite pool");

    let in_memory = database_url.contains(":memory:");
    let base = if database_url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(database_url)?
    } else {
        SqliteConnectOptions::new().filename(database_url)
    };
    let options = base.create_if_missing(true).foreign_keys(true);

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&pool).await?;
    }
    info!("database tables created");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_tables_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_data.db");

        let pool = connect_pool(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["messages", "responses", "users"]);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn enforces_foreign_keys() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();

        let fk: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk.0, 1);

        let orphan = sqlx::query(
            "INSERT INTO messages (message_id, user_id, command, content, timestamp) VALUES ('m', 'nobody', '/ai', 'x', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err());
    }
}
