//! SQLite implementation of the conversation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info, warn};

use relay_core::{
    conversation::{ConversationRecord, NewConversation, RecordOutcome, User, UserSummary},
    errors::Error,
    ports::ConversationStore,
    Result,
};

use crate::pool::connect_pool;

const RECORD_COLUMNS: &str = "m.message_id, m.user_id, m.command, m.content, m.timestamp, \
     r.response_id, r.content AS response_content";

/// `ConversationStore` backed by a SQLite pool.
///
/// Every operation takes its own connection (and transaction for writes) from
/// the pool and hands it back before returning.
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Connect to `database_url`, creating the schema if needed.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = connect_pool(database_url).await.map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection. Pending operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("conversation store closed");
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Map an insert failure, turning unique-key violations into `Conflict`.
fn write_err(e: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() || db.message().contains("UNIQUE") {
            return Error::Conflict(what());
        }
    }
    db_err(e)
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("invalid datetime {s:?}: {e}")))
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let creation_time: String = row.try_get("creation_time").map_err(db_err)?;
    Ok(User {
        user_id: row.try_get("user_id").map_err(db_err)?,
        username: row.try_get("username").map_err(db_err)?,
        creation_time: parse_datetime(&creation_time)?,
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<UserSummary> {
    let creation_time: String = row.try_get("creation_time").map_err(db_err)?;
    Ok(UserSummary {
        user_id: row.try_get("user_id").map_err(db_err)?,
        username: row.try_get("username").map_err(db_err)?,
        creation_time: parse_datetime(&creation_time)?,
        message_count: row.try_get("message_count").map_err(db_err)?,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<ConversationRecord> {
    let timestamp: String = row.try_get("timestamp").map_err(db_err)?;
    Ok(ConversationRecord {
        message_id: row.try_get("message_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        command: row.try_get("command").map_err(db_err)?,
        content: row.try_get("content").map_err(db_err)?,
        timestamp: parse_datetime(&timestamp)?,
        response_id: row.try_get("response_id").map_err(db_err)?,
        response_content: row.try_get("response_content").map_err(db_err)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn record_conversation(&self, turn: &NewConversation) -> Result<RecordOutcome> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // First writer wins; a known user keeps its original username.
        let inserted = sqlx::query(
            "INSERT INTO users (user_id, username, creation_time) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(&turn.user_id)
        .bind(&turn.username)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let user_created = inserted.rows_affected() == 1;

        sqlx::query(
            "INSERT INTO messages (message_id, user_id, command, content, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.message_id)
        .bind(&turn.user_id)
        .bind(&turn.command)
        .bind(&turn.user_text)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_err(e, || {
                format!("message {} already exists", turn.message_id)
            })
        })?;

        sqlx::query(
            "INSERT INTO responses (response_id, message_id, content, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&turn.response_id)
        .bind(&turn.message_id)
        .bind(&turn.response_text)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_err(e, || {
                format!("response {} already exists", turn.response_id)
            })
        })?;

        tx.commit().await.map_err(db_err)?;

        if user_created {
            info!(user_id = %turn.user_id, username = %turn.username, "new user added");
        }
        info!(
            user_id = %turn.user_id,
            message_id = %turn.message_id,
            response_id = %turn.response_id,
            "conversation logged"
        );

        Ok(RecordOutcome { user_created })
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(
            "SELECT u.user_id, u.username, u.creation_time, COUNT(m.message_id) AS message_count
             FROM users u
             LEFT JOIN messages m ON m.user_id = u.user_id
             GROUP BY u.user_id, u.username, u.creation_time
             ORDER BY u.creation_time ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let users = rows.iter().map(row_to_summary).collect::<Result<Vec<_>>>()?;
        info!(count = users.len(), "retrieved users");
        Ok(users)
    }

    async fn list_messages_for_user(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        if !self.user_exists(user_id).await? {
            warn!(user_id, "user not found");
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM messages m
             LEFT JOIN responses r ON r.message_id = m.message_id
             WHERE m.user_id = ?
             ORDER BY m.timestamp ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
        info!(user_id, count = records.len(), "fetched conversations");
        Ok(records)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<ConversationRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM messages m
             LEFT JOIN responses r ON r.message_id = m.message_id
             WHERE m.message_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let record = row_to_record(&row)?;
                info!(message_id, "message retrieved");
                Ok(Some(record))
            }
            None => {
                warn!(message_id, "message not found");
                Ok(None)
            }
        }
    }

    async fn search_users_by_username(&self, query: &str) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(
            "SELECT user_id, username, creation_time FROM users
             WHERE username LIKE ? ESCAPE '\\'
             ORDER BY creation_time ASC",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        info!(query, count = users.len(), "searched users by username");
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
        assert_eq!(escape_like("ann"), "ann");
    }

    #[test]
    fn round_trips_timestamps() {
        let now = Utc::now();
        assert_eq!(parse_datetime(&format_datetime(&now)).unwrap(), now);
        assert!(parse_datetime("yesterday").is_err());
    }
}
