//! Integration tests for the `/api/torrents` surface.

mod common;

use common::TestApp;

#[tokio::test]
async fn test_list_torrents_starts_empty() {
    let app = TestApp::new().await;

    let response = app.server().get("/api/torrents").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_unknown_torrent_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .get("/api/torrents/0000000000000000000000000000000000000000")
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_delete_unknown_torrent_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .delete("/api/torrents/0000000000000000000000000000000000000000")
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_add_invalid_magnet_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/torrents")
        .json(&serde_json::json!({ "magnet_link": "not-a-magnet-link" }))
        .await;

    response.assert_status_bad_request();
}
