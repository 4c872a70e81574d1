use uuid::Uuid;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::User;

impl Store {
    pub async fn create_user(
        &self,
        handle: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (handle, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, handle, email, password_hash, role, created_at
            "#,
        )
        .bind(handle)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_user_by_handle(&self, handle: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, handle, email, password_hash, role, created_at FROM users WHERE handle = $1",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, handle, email, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn require_user(&self, id: Uuid) -> AppResult<User> {
        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".into()))
    }

    /// Updates the global role of a user. Only callable by a super-admin at
    /// the handler layer.
    pub async fn set_user_role(&self, id: Uuid, role: &str) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET role = $2
            WHERE id = $1
            RETURNING id, handle, email, password_hash, role, created_at
            "#,
        )
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

        Ok(user)
    }

    pub async fn update_email(&self, id: Uuid, email: Option<&str>) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET email = $2
            WHERE id = $1
            RETURNING id, handle, email, password_hash, role, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

        Ok(user)
    }

    /// True once at least one user exists. Used by the setup handshake,
    /// whose first account is promoted to `super_admin`.
    pub async fn any_user_exists(&self) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }
}
