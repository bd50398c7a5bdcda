//! Integration tests for the `/stream` surface against torrents that are
//! not being managed — these exercise the error paths without needing a
//! live swarm or an encoder binary.

mod common;

use common::TestApp;

#[tokio::test]
async fn test_playlist_for_unknown_torrent_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .get("/stream/0000000000000000000000000000000000000000")
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_segment_for_unknown_torrent_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .get("/stream/0000000000000000000000000000000000000000/segment000.ts")
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_file_for_unknown_torrent_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .get("/stream/0000000000000000000000000000000000000000/file/0")
        .await;

    response.assert_status_not_found();
}
