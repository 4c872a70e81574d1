use uuid::Uuid;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::Server;

impl Store {
    /// Creates a server and its owner membership row in one transaction, so
    /// a server with no owner membership never becomes visible to readers.
    pub async fn create_server(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Server> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let server = sqlx::query_as::<_, Server>(
            r#"
            INSERT INTO servers (name, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, owner_id, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO server_members (user_id, server_id, role)
            VALUES ($1, $2, 'owner')
            "#,
        )
        .bind(owner_id)
        .bind(server.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(AppError::from)?;

        Ok(server)
    }

    pub async fn find_server(&self, id: Uuid) -> AppResult<Option<Server>> {
        let server = sqlx::query_as::<_, Server>(
            "SELECT id, name, description, owner_id, created_at FROM servers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(server)
    }

    pub async fn require_server(&self, id: Uuid) -> AppResult<Server> {
        self.find_server(id)
            .await?
            .ok_or_else(|| AppError::NotFound("server".into()))
    }

    /// Lists servers the given user belongs to, ordered by join time (spec
    /// §4.1: "a user's server list").
    pub async fn list_servers_for_user(&self, user_id: Uuid) -> AppResult<Vec<Server>> {
        let servers = sqlx::query_as::<_, Server>(
            r#"
            SELECT s.id, s.name, s.description, s.owner_id, s.created_at
            FROM servers s
            JOIN server_members m ON m.server_id = s.id
            WHERE m.user_id = $1
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(servers)
    }

    pub async fn update_server(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> AppResult<Server> {
        let server = sqlx::query_as::<_, Server>(
            r#"
            UPDATE servers
            SET name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1
            RETURNING id, name, description, owner_id, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("server".into()))?;

        Ok(server)
    }

    /// Deletes a server; channels, memberships, and messages cascade via the
    /// `ON DELETE CASCADE` foreign keys down to `messages`.
    pub async fn delete_server(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("server".into()));
        }

        Ok(())
    }
}
