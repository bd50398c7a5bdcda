//! Integration tests for the health endpoint.

mod common;

use common::TestApp;

#[tokio::test]
async fn test_health_check_endpoint() {
    let app = TestApp::new().await;
    let response = app.server().get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body.get("download_path").is_some());
    assert!(body.get("hls_path").is_some());
}
