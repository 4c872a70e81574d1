use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Role;
use crate::state::AppState;

/// Claims carried by the single bearer token this crate issues. There is no
/// access/refresh pair and no server-side session table — a token is
/// self-contained and stateless until it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub handle: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints a bearer token for `user_id` valid for `ttl` (24 hours nominal,
/// configurable via `Config`).
pub fn mint_token(
    user_id: Uuid,
    handle: &str,
    role: Role,
    secret: &str,
    ttl: std::time::Duration,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        handle: handle.to_string(),
        role: role.as_str().to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)))
            .timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal)
}

/// Validates and decodes a bearer token. There is no revocation list, so
/// expiry is the only bound on how long a token stays usable.
pub fn parse_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    // Default `Validation` grants a 60s leeway on `exp`, which would let a
    // just-expired token through; reject unconditionally instead.
    let mut validation = Validation::default();
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
        _ => AppError::InvalidToken,
    })?;

    Ok(data.claims)
}

/// Minimum password strength enforced at registration: at least nine code
/// points, at least one digit, at least one punctuation character.
pub fn check_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < 9 {
        return Err(AppError::InvalidInput(
            "Password must be at least 9 characters".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidInput(
            "Password must contain at least one digit".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_punctuation()) {
        return Err(AppError::InvalidInput(
            "Password must contain at least one punctuation character".into(),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| AppError::Internal)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    bcrypt::verify(password, hash).map_err(|_| AppError::Internal)
}

/// The identity of the caller behind an authenticated request, extracted
/// from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub handle: String,
    pub role: Role,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::InvalidToken)?;

        let claims = parse_token(bearer.token(), &state.config.jwt_secret)?;
        let role: Role = claims.role.parse().unwrap_or(Role::User);

        Ok(AuthUser {
            user_id: claims.sub,
            handle: claims.handle,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret";

    #[test]
    fn token_roundtrips() {
        let user_id = Uuid::new_v4();
        let token = mint_token(
            user_id,
            "alice",
            Role::User,
            SECRET,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();

        let claims = parse_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.handle, "alice");
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = mint_token(
            Uuid::new_v4(),
            "alice",
            Role::User,
            SECRET,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();

        let err = parse_token(&token, "wrong_secret").unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn token_rejects_malformed_string() {
        let err = parse_token("not.a.jwt", SECRET).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn token_rejects_expired() {
        let token = mint_token(
            Uuid::new_v4(),
            "alice",
            Role::User,
            SECRET,
            std::time::Duration::from_secs(0),
        )
        .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));
        let err = parse_token(&token, SECRET).unwrap_err();
        assert!(matches!(err, AppError::ExpiredToken));
    }

    #[test]
    fn password_strength_rejects_short() {
        assert!(check_password_strength("short1!").is_err());
    }

    #[test]
    fn password_strength_rejects_no_digit() {
        assert!(check_password_strength("nodigitshere!").is_err());
    }

    #[test]
    fn password_strength_rejects_no_punctuation() {
        assert!(check_password_strength("nopunctuation1").is_err());
    }

    #[test]
    fn password_strength_accepts_valid() {
        assert!(check_password_strength("good-password1").is_ok());
    }

    #[test]
    fn password_hash_roundtrips() {
        let hash = hash_password("good-password1").unwrap();
        assert!(verify_password("good-password1", &hash).unwrap());
        assert!(!verify_password("wrong-password1", &hash).unwrap());
    }
}
