use std::time::Duration;

use httpmock::MockServer;
use reword_api_types::UsageStats;
use reword_sync::application::api::RewordApi;
use reword_sync::cache::FetchError;
use reword_sync::config::ApiSettings;
use reword_sync::infra::http::HttpApiClient;
use serde_json::json;
use url::Url;

fn client(server: &MockServer, token: Option<&str>) -> HttpApiClient {
    let settings = ApiSettings {
        base_url: Url::parse(&server.base_url()).expect("mock base url"),
        timeout: Duration::from_millis(500),
        token: token.map(str::to_string),
    };
    HttpApiClient::new(&settings).expect("client")
}

#[tokio::test]
async fn usage_stats_sends_bearer_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/api/v1/auth/usage-stats")
                .header("authorization", "Bearer secret");
            then.status(200).json_body(json!({
                "total_generations": 12,
                "recent_generations": 3,
                "rate_limit": -1,
                "remaining_requests": -1,
                "is_premium": true,
                "subscription_tier": "pro"
            }));
        })
        .await;

    let stats: UsageStats = client(&server, Some("secret"))
        .usage_stats()
        .await
        .expect("usage stats");

    mock.assert_async().await;
    assert!(stats.is_premium);
    assert_eq!(stats.rate_limit, -1);
    assert_eq!(stats.subscription_tier.as_deref(), Some("pro"));
}

#[tokio::test]
async fn null_saved_content_reads_as_empty() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/v1/content/saved");
            then.status(200)
                .header("content-type", "application/json")
                .body("null");
        })
        .await;

    let items = client(&server, None)
        .saved_content()
        .await
        .expect("saved content");

    assert!(items.is_empty());
}

#[tokio::test]
async fn templates_pass_category_filter() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/api/v1/public/templates")
                .query_param("category", "linkedin");
            then.status(200).json_body(json!([{
                "id": 4,
                "name": "Launch post",
                "description": null,
                "category": "linkedin",
                "content": "We just shipped {{feature}}",
                "tags": "launch",
                "is_public": true,
                "usage_count": 9,
                "is_favorite": false,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": null,
                "user_id": 2,
                "is_own_template": false
            }]));
        })
        .await;

    let templates = client(&server, None)
        .community_templates(Some("linkedin"))
        .await
        .expect("templates");

    mock.assert_async().await;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].usage_count, 9);
}

#[tokio::test]
async fn favorite_update_puts_flag() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("PUT")
                .path("/api/v1/content/saved/7")
                .json_body(json!({ "is_favorite": true }));
            then.status(200).json_body(json!({ "id": 7 }));
        })
        .await;

    client(&server, Some("secret"))
        .set_favorite(7, true)
        .await
        .expect("favorite update");

    mock.assert_async().await;
}

#[tokio::test]
async fn delete_saved_content_sends_delete() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("DELETE")
                .path("/api/v1/content/saved/7")
                .header("authorization", "Bearer secret");
            then.status(200).json_body(json!({ "message": "deleted" }));
        })
        .await;

    client(&server, Some("secret"))
        .delete_saved_content(7)
        .await
        .expect("delete");

    mock.assert_async().await;
}

#[tokio::test]
async fn missing_saved_content_maps_to_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("DELETE").path("/api/v1/content/saved/8");
            then.status(404);
        })
        .await;

    let err = client(&server, None)
        .delete_saved_content(8)
        .await
        .expect_err("not found");

    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn template_use_is_posted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST").path("/api/v1/templates/4/use");
            then.status(204);
        })
        .await;

    client(&server, None)
        .record_template_use(4)
        .await
        .expect("template use");

    mock.assert_async().await;
}

#[tokio::test]
async fn forbidden_maps_to_non_retryable_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/v1/auth/feature-limits");
            then.status(403).body("forbidden");
        })
        .await;

    let err = client(&server, None)
        .feature_limits()
        .await
        .expect_err("forbidden");

    assert_eq!(err.status_code(), Some(403));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn malformed_body_maps_to_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/v1/content/history");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let err = client(&server, None)
        .content_history()
        .await
        .expect_err("not json");

    assert!(matches!(err, FetchError::Decode { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn slow_response_maps_to_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/v1/auth/usage-stats");
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(json!({}));
        })
        .await;

    let err = client(&server, None)
        .usage_stats()
        .await
        .expect_err("timed out");

    assert!(matches!(err, FetchError::Timeout { .. }));
}
