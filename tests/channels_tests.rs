mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::valid_password;

async fn setup_server(pool: sqlx::PgPool) -> (String, String) {
    let app = common::create_test_app(pool.clone());
    let token =
        common::register_and_get_token(app, &common::unique_handle(), valid_password()).await;

    let app = common::create_test_app(pool);
    let server = common::create_server(app, &token, "Channels Server").await;
    (token, server["id"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn owner_can_create_text_and_voice_channels() {
    let pool = common::test_pool().await;
    let (token, server_id) = setup_server(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    let text = common::create_channel(app, &token, &server_id, "general").await;
    assert_eq!(text["kind"], "text");

    let app = common::create_test_app(pool);
    let voice = common::create_voice_channel(app, &token, &server_id, "lounge").await;
    assert_eq!(voice["kind"], "voice");
}

#[tokio::test]
async fn create_channel_rejects_unknown_kind() {
    let pool = common::test_pool().await;
    let (token, server_id) = setup_server(pool.clone()).await;

    let app = common::create_test_app(pool);
    let (status, body) = common::post_json_authed(
        app,
        &format!("/servers/{server_id}/channels"),
        &token,
        json!({ "name": "weird", "kind": "video" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
}

#[tokio::test]
async fn non_manager_cannot_create_channel() {
    let pool = common::test_pool().await;
    let (owner_token, server_id) = setup_server(pool.clone()).await;

    let member_handle = common::unique_handle();
    let app = common::create_test_app(pool.clone());
    let member_token =
        common::register_and_get_token(app, &member_handle, valid_password()).await;

    let app = common::create_test_app(pool.clone());
    common::post_json_authed(
        app,
        &format!("/servers/{server_id}/members"),
        &owner_token,
        json!({ "handle": member_handle }),
    )
    .await;

    let app = common::create_test_app(pool);
    let (status, _) = common::post_json_authed(
        app,
        &format!("/servers/{server_id}/channels"),
        &member_token,
        json!({ "name": "secret", "kind": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn member_can_list_channels() {
    let pool = common::test_pool().await;
    let (token, server_id) = setup_server(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    common::create_channel(app, &token, &server_id, "general").await;

    let app = common::create_test_app(pool);
    let (status, body) = common::get_authed(
        app,
        &format!("/servers/{server_id}/channels"),
        &token,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn owner_can_delete_channel() {
    let pool = common::test_pool().await;
    let (token, server_id) = setup_server(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    let channel = common::create_channel(app, &token, &server_id, "temp").await;
    let channel_id = channel["id"].as_str().unwrap();

    let app = common::create_test_app(pool.clone());
    let (status, _) =
        common::delete_authed(app, &format!("/channels/{channel_id}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let app = common::create_test_app(pool);
    let (status, _) = common::get_authed(app, &format!("/channels/{channel_id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
