mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::valid_password;

async fn setup_channel(pool: sqlx::PgPool) -> (String, String, String) {
    let app = common::create_test_app(pool.clone());
    let token =
        common::register_and_get_token(app, &common::unique_handle(), valid_password()).await;

    let app = common::create_test_app(pool.clone());
    let server = common::create_server(app, &token, "Msg Server").await;
    let server_id = server["id"].as_str().unwrap().to_string();

    let app = common::create_test_app(pool);
    let channel = common::create_channel(app, &token, &server_id, "general").await;
    let channel_id = channel["id"].as_str().unwrap().to_string();

    (token, server_id, channel_id)
}

#[tokio::test]
async fn post_and_list_messages_in_order() {
    let pool = common::test_pool().await;
    let (token, _server_id, channel_id) = setup_channel(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    common::create_message(app, &token, &channel_id, "first").await;
    let app = common::create_test_app(pool.clone());
    common::create_message(app, &token, &channel_id, "second").await;

    let app = common::create_test_app(pool);
    let (status, body) =
        common::get_authed(app, &format!("/channels/{channel_id}/messages"), &token).await;

    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "first");
    assert_eq!(messages[1]["content"], "second");
    assert!(messages[0]["id"].as_i64().unwrap() < messages[1]["id"].as_i64().unwrap());
}

#[tokio::test]
async fn list_messages_respects_after_cursor() {
    let pool = common::test_pool().await;
    let (token, _server_id, channel_id) = setup_channel(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    let first = common::create_message(app, &token, &channel_id, "first").await;
    let app = common::create_test_app(pool.clone());
    common::create_message(app, &token, &channel_id, "second").await;

    let first_id = first["id"].as_i64().unwrap();

    let app = common::create_test_app(pool);
    let (status, body) = common::get_authed(
        app,
        &format!("/channels/{channel_id}/messages?after={first_id}"),
        &token,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "second");
}

#[tokio::test]
async fn message_content_length_is_validated() {
    let pool = common::test_pool().await;
    let (token, _server_id, channel_id) = setup_channel(pool.clone()).await;

    let app = common::create_test_app(pool);
    let (status, body) = common::post_json_authed(
        app,
        &format!("/channels/{channel_id}/messages"),
        &token,
        json!({ "content": "" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
}

#[tokio::test]
async fn non_member_cannot_post_message() {
    let pool = common::test_pool().await;
    let (_token, _server_id, channel_id) = setup_channel(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    let outsider_token =
        common::register_and_get_token(app, &common::unique_handle(), valid_password()).await;

    let app = common::create_test_app(pool);
    let (status, _) = common::post_json_authed(
        app,
        &format!("/channels/{channel_id}/messages"),
        &outsider_token,
        json!({ "content": "sneaky" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_author_can_edit_message() {
    let pool = common::test_pool().await;
    let (token, server_id, channel_id) = setup_channel(pool.clone()).await;

    let member_handle = common::unique_handle();
    let app = common::create_test_app(pool.clone());
    let member_token =
        common::register_and_get_token(app, &member_handle, valid_password()).await;

    let app = common::create_test_app(pool.clone());
    common::post_json_authed(
        app,
        &format!("/servers/{server_id}/members"),
        &token,
        json!({ "handle": member_handle }),
    )
    .await;

    let app = common::create_test_app(pool.clone());
    let message = common::create_message(app, &token, &channel_id, "original").await;
    let message_id = message["id"].as_i64().unwrap();

    let app = common::create_test_app(pool);
    let (status, _) = common::patch_json_authed(
        app,
        &format!("/messages/{message_id}"),
        &member_token,
        json!({ "content": "hijacked" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn author_can_edit_and_delete_own_message() {
    let pool = common::test_pool().await;
    let (token, _server_id, channel_id) = setup_channel(pool.clone()).await;

    let app = common::create_test_app(pool.clone());
    let message = common::create_message(app, &token, &channel_id, "original").await;
    let message_id = message["id"].as_i64().unwrap();

    let app = common::create_test_app(pool.clone());
    let (status, body) = common::patch_json_authed(
        app,
        &format!("/messages/{message_id}"),
        &token,
        json!({ "content": "edited" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "edited");
    assert!(!body["edited_at"].is_null());

    let app = common::create_test_app(pool);
    let (status, _) =
        common::delete_authed(app, &format!("/messages/{message_id}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn cannot_post_message_to_voice_channel() {
    let pool = common::test_pool().await;

    let app = common::create_test_app(pool.clone());
    let token =
        common::register_and_get_token(app, &common::unique_handle(), valid_password()).await;

    let app = common::create_test_app(pool.clone());
    let server = common::create_server(app, &token, "Voice Only").await;
    let server_id = server["id"].as_str().unwrap();

    let app = common::create_test_app(pool.clone());
    let channel = common::create_voice_channel(app, &token, server_id, "lounge").await;
    let channel_id = channel["id"].as_str().unwrap();

    let app = common::create_test_app(pool);
    let (status, _) = common::post_json_authed(
        app,
        &format!("/channels/{channel_id}/messages"),
        &token,
        json!({ "content": "hello?" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
