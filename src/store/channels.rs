use uuid::Uuid;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::Channel;

impl Store {
    pub async fn create_channel(
        &self,
        server_id: Uuid,
        name: &str,
        kind: &str,
        description: Option<&str>,
    ) -> AppResult<Channel> {
        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (server_id, name, kind, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, server_id, name, kind, description, created_at
            "#,
        )
        .bind(server_id)
        .bind(name)
        .bind(kind)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(channel)
    }

    pub async fn list_channels(&self, server_id: Uuid) -> AppResult<Vec<Channel>> {
        let channels = sqlx::query_as::<_, Channel>(
            r#"
            SELECT id, server_id, name, kind, description, created_at
            FROM channels
            WHERE server_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }

    /// Every channel across every server, regardless of membership. Used
    /// only by the Text Hub handshake for staff accounts, which bypass
    /// per-server membership entirely.
    pub async fn list_all_channels(&self) -> AppResult<Vec<Channel>> {
        let channels = sqlx::query_as::<_, Channel>(
            r#"
            SELECT id, server_id, name, kind, description, created_at
            FROM channels
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(channels)
    }

    pub async fn find_channel(&self, id: Uuid) -> AppResult<Option<Channel>> {
        let channel = sqlx::query_as::<_, Channel>(
            "SELECT id, server_id, name, kind, description, created_at FROM channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(channel)
    }

    pub async fn require_channel(&self, id: Uuid) -> AppResult<Channel> {
        self.find_channel(id)
            .await?
            .ok_or_else(|| AppError::NotFound("channel".into()))
    }

    pub async fn delete_channel(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("channel".into()));
        }

        Ok(())
    }
}
