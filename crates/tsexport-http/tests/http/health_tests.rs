use super::test_utilities::{TEST_APP, TestClient, TestServer};

#[tokio::test]
async fn test_health_check() {
    let mut server = TestServer::start().await;
    let helper = TestClient::new();

    let response = helper.health_check(&server).await.unwrap();
    assert_eq!(response.status(), 200);

    let health_data: serde_json::Value = response.json().await.unwrap();
    assert_eq!(health_data["status"], "healthy");
    assert_eq!(health_data["service"], TEST_APP);
    assert!(health_data["timestamp"].as_u64().is_some());

    server.stop().await;
}
