use uuid::Uuid;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::Message;

/// Default and maximum page sizes for message history; callers may not
/// request unbounded pages.
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

impl Store {
    /// Appends a message and returns the row with its server-assigned id.
    /// The `BIGSERIAL id` is the durable, monotonically increasing handle
    /// clients use both for pagination cursors and for detecting gaps after
    /// a reconnect.
    pub async fn append_message(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (channel_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, channel_id, user_id, content, created_at, edited_at
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn find_message(&self, id: i64) -> AppResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT id, channel_id, user_id, content, created_at, edited_at FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn require_message(&self, id: i64) -> AppResult<Message> {
        self.find_message(id)
            .await?
            .ok_or_else(|| AppError::NotFound("message".into()))
    }

    /// Pages through a channel's history on the integer `id` cursor.
    /// `before`/`after` are mutually exclusive; when both are absent the
    /// newest page is returned.
    pub async fn list_messages(
        &self,
        channel_id: Uuid,
        before: Option<i64>,
        after: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let messages = if let Some(after) = after {
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, channel_id, user_id, content, created_at, edited_at
                FROM messages
                WHERE channel_id = $1 AND id > $2
                ORDER BY id ASC
                LIMIT $3
                "#,
            )
            .bind(channel_id)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else if let Some(before) = before {
            let mut rows = sqlx::query_as::<_, Message>(
                r#"
                SELECT id, channel_id, user_id, content, created_at, edited_at
                FROM messages
                WHERE channel_id = $1 AND id < $2
                ORDER BY id DESC
                LIMIT $3
                "#,
            )
            .bind(channel_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            rows.reverse();
            rows
        } else {
            let mut rows = sqlx::query_as::<_, Message>(
                r#"
                SELECT id, channel_id, user_id, content, created_at, edited_at
                FROM messages
                WHERE channel_id = $1
                ORDER BY id DESC
                LIMIT $2
                "#,
            )
            .bind(channel_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            rows.reverse();
            rows
        };

        Ok(messages)
    }

    pub async fn edit_message(&self, id: i64, content: &str) -> AppResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET content = $2, edited_at = NOW()
            WHERE id = $1
            RETURNING id, channel_id, user_id, content, created_at, edited_at
            "#,
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("message".into()))?;

        Ok(message)
    }

    /// Hard-deletes a message. There are no threads or reactions that would
    /// need the row to persist as a tombstone, so a soft-delete flag would
    /// just be dead weight.
    pub async fn delete_message(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("message".into()));
        }

        Ok(())
    }
}
