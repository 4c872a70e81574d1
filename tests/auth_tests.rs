mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::valid_password;

#[tokio::test]
async fn register_success() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);
    let handle = common::unique_handle();

    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": valid_password() }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["handle"], handle.as_str());
    assert_eq!(body["user"]["role"], "user");
}

#[tokio::test]
async fn register_duplicate_handle() {
    let pool = common::test_pool().await;
    let handle = common::unique_handle();

    let app = common::create_test_app(pool.clone());
    let (status, _) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": valid_password() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let app = common::create_test_app(pool);
    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": valid_password() }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn register_rejects_short_password() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);
    let handle = common::unique_handle();

    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": "short1!" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");
}

#[tokio::test]
async fn register_rejects_password_without_digit() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);
    let handle = common::unique_handle();

    let (status, _) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": "no-digits-here" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_rejects_password_without_punctuation() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);
    let handle = common::unique_handle();

    let (status, _) = common::post_json(
        app,
        "/auth/register",
        json!({ "handle": handle, "password": "nopunctuation1" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_success() {
    let pool = common::test_pool().await;
    let handle = common::unique_handle();

    let app = common::create_test_app(pool.clone());
    common::register_user(app, &handle, valid_password()).await;

    let app = common::create_test_app(pool);
    let (status, body) = common::post_json(
        app,
        "/auth/login",
        json!({ "handle": handle, "password": valid_password() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let pool = common::test_pool().await;
    let handle = common::unique_handle();

    let app = common::create_test_app(pool.clone());
    common::register_user(app, &handle, valid_password()).await;

    let app = common::create_test_app(pool);
    let (status, body) = common::post_json(
        app,
        "/auth/login",
        json!({ "handle": handle, "password": "wrong-password-1!" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "invalid-credentials");
}

#[tokio::test]
async fn login_rejects_unknown_handle() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);

    let (status, _) = common::post_json(
        app,
        "/auth/login",
        json!({ "handle": "does-not-exist", "password": valid_password() }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);

    let (status, _) = common::get_no_auth(app, "/users/@me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_current_user() {
    let pool = common::test_pool().await;
    let handle = common::unique_handle();

    let app = common::create_test_app(pool.clone());
    let token = common::register_and_get_token(app, &handle, valid_password()).await;

    let app = common::create_test_app(pool);
    let (status, body) = common::get_authed(app, "/users/@me", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handle"], handle.as_str());
}

#[tokio::test]
async fn guest_login_disabled_by_default() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool);

    let (status, body) = common::post_json(app, "/auth/guest", json!({})).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "not-authorized");
}
