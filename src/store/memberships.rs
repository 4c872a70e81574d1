use uuid::Uuid;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::{MemberDto, Membership};

impl Store {
    pub async fn add_member(
        &self,
        user_id: Uuid,
        server_id: Uuid,
        role: &str,
    ) -> AppResult<Membership> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO server_members (user_id, server_id, role)
            VALUES ($1, $2, $3)
            RETURNING user_id, server_id, role, joined_at
            "#,
        )
        .bind(user_id)
        .bind(server_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(membership)
    }

    pub async fn find_membership(
        &self,
        user_id: Uuid,
        server_id: Uuid,
    ) -> AppResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT user_id, server_id, role, joined_at
            FROM server_members
            WHERE user_id = $1 AND server_id = $2
            "#,
        )
        .bind(user_id)
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    /// Used throughout authorization checks, which treat "not a member" and
    /// "server does not exist" the same way (404, not 403) to avoid leaking
    /// server existence to non-members.
    pub async fn require_membership(
        &self,
        user_id: Uuid,
        server_id: Uuid,
    ) -> AppResult<Membership> {
        self.find_membership(user_id, server_id)
            .await?
            .ok_or_else(|| AppError::NotFound("server".into()))
    }

    pub async fn remove_member(&self, user_id: Uuid, server_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "DELETE FROM server_members WHERE user_id = $1 AND server_id = $2",
        )
        .bind(user_id)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("membership".into()));
        }

        Ok(())
    }

    pub async fn list_members(&self, server_id: Uuid) -> AppResult<Vec<MemberDto>> {
        let members = sqlx::query_as::<_, MemberDto>(
            r#"
            SELECT m.user_id, u.handle, m.role, m.joined_at
            FROM server_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.server_id = $1
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

}
