use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Error kinds surfaced at the core boundary. REST callers get a structured
/// `{"kind": ..., "error": ...}` body; WebSocket peers get the same `kind`
/// string in a close frame via [`CloseReason`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Expired token")]
    ExpiredToken,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Slow consumer")]
    SlowConsumer,

    #[error("Idle timeout")]
    IdleTimeout,

    #[error("Transient storage failure")]
    Transient(#[source] sqlx::Error),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// The stable kind string sent in REST error bodies and WS close frames.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid-input",
            AppError::InvalidCredentials => "invalid-credentials",
            AppError::InvalidToken => "invalid-token",
            AppError::ExpiredToken => "expired-token",
            AppError::NotAuthorized(_) => "not-authorized",
            AppError::NotFound(_) => "not-found",
            AppError::Conflict(_) => "conflict",
            AppError::SlowConsumer => "slow-consumer",
            AppError::IdleTimeout => "idle-timeout",
            AppError::Transient(_) => "transient",
            AppError::Internal => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SlowConsumer | AppError::IdleTimeout => StatusCode::BAD_REQUEST,
            AppError::Transient(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map sqlx errors to AppError, with special handling for unique-constraint
/// violations (PG error code 23505) so they surface as 409 Conflict rather
/// than an opaque transient failure.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                let message = match db_err.constraint() {
                    Some(c) if c.contains("handle") => "Handle already taken",
                    Some(c) if c.contains("channels_server_name") => {
                        "Channel name already used in this server"
                    }
                    Some(c) if c.contains("email") => "Email already registered",
                    _ => "Resource already exists",
                };
                return AppError::Conflict(message.into());
            }
            if db_err.code().as_deref() == Some("23503") {
                return AppError::InvalidInput("Referenced entity does not exist".into());
            }
        }
        tracing::error!(error = ?e, "Transient storage failure");
        AppError::Transient(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        if matches!(self, AppError::Internal | AppError::Transient(_)) {
            tracing::error!(kind, "{message}");
        }

        (status, Json(json!({ "kind": kind, "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// The payload carried in a WebSocket close frame on any connection
/// termination, so a disconnected client can tell a slow-consumer drop
/// apart from an idle timeout or a policy violation instead of just seeing
/// the socket vanish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    PolicyViolation,
    SlowConsumer,
    IdleTimeout,
    ServerShutdown,
    NotAuthorized,
    NotFound,
    InvalidInput,
    Normal,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::PolicyViolation => "policy-violation",
            CloseReason::SlowConsumer => "slow-consumer",
            CloseReason::IdleTimeout => "idle-timeout",
            CloseReason::ServerShutdown => "server-shutdown",
            CloseReason::NotAuthorized => "not-authorized",
            CloseReason::NotFound => "not-found",
            CloseReason::InvalidInput => "invalid-input",
            CloseReason::Normal => "normal",
        }
    }

    /// The numeric close code used on the wire. 4000-range per RFC 6455 §7.4.2
    /// (reserved for private use), one per close reason so a client can branch
    /// without parsing the reason string.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::PolicyViolation => 4001,
            CloseReason::SlowConsumer => 4002,
            CloseReason::IdleTimeout => 4003,
            CloseReason::ServerShutdown => 4004,
            CloseReason::NotAuthorized => 4005,
            CloseReason::NotFound => 4006,
            CloseReason::InvalidInput => 4007,
            CloseReason::Normal => 1000,
        }
    }

    /// Builds the `axum` close frame this reason should be sent as.
    pub fn close_frame(self) -> axum::extract::ws::CloseFrame {
        axum::extract::ws::CloseFrame {
            code: self.code(),
            reason: self.as_str().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_credentials_returns_401() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_input_returns_400() {
        let response = AppError::InvalidInput("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_found_returns_404_with_kind() {
        let response = AppError::NotFound("user".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["kind"], "not-found");
    }

    #[tokio::test]
    async fn conflict_returns_409() {
        let response = AppError::Conflict("taken".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn not_authorized_returns_403() {
        let response = AppError::NotAuthorized("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_returns_500() {
        let response = AppError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn transient_wraps_sqlx_row_not_found_as_500() {
        let response = AppError::Transient(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn close_reason_codes_are_distinct() {
        let reasons = [
            CloseReason::PolicyViolation,
            CloseReason::SlowConsumer,
            CloseReason::IdleTimeout,
            CloseReason::ServerShutdown,
            CloseReason::NotAuthorized,
            CloseReason::NotFound,
            CloseReason::InvalidInput,
            CloseReason::Normal,
        ];
        let mut codes: Vec<u16> = reasons.iter().map(|r| r.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());
    }
}
