//! Integration tests using wiremock to simulate HTTP servers.

use callwire::{
    ChallengeRetryInterceptor, Client, ErrorKind, HeaderInterceptor, RetryInterceptor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_successful_get_request() {
    init_tracing();
    let mock_server = MockServer::start().await;

    let response_data = TestData {
        id: 1,
        name: "Test".to_string(),
    };

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .get(format!("{}/test", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(response.message(), "OK");
    assert!(response.is_ok());
    assert_eq!(response.json::<TestData>().unwrap(), response_data);
    assert!(response
        .header("content-type")
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_successful_post_request() {
    init_tracing();
    let mock_server = MockServer::start().await;

    let request_data = TestData {
        id: 0,
        name: "New".to_string(),
    };

    let response_data = TestData {
        id: 1,
        name: "New".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/test"))
        .and(body_json(&request_data))
        .respond_with(ResponseTemplate::new(201).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .post(format!("{}/test", mock_server.uri()))
        .json(&request_data)
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 201);
    assert_eq!(response.json::<TestData>().unwrap(), response_data);
}

#[tokio::test]
async fn test_http_error_is_a_response() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .interceptor(RetryInterceptor::new(3, Duration::from_millis(10)))
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/missing", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 404);
    assert!(response.is_successful());
    assert!(!response.is_ok());
    assert_eq!(response.body(), Some("Not Found"));

    // non-2xx responses are never retried
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_empty_body_is_absent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .delete(format!("{}/items/1", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 204);
    assert!(response.body().is_none());
}

#[tokio::test]
async fn test_repeated_response_headers_are_joined() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vary"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Vary", "Accept")
                .append_header("Vary", "Origin"),
        )
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let response = client
        .get(format!("{}/vary", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.header("vary"), Some("Accept, Origin"));
}

#[tokio::test]
async fn test_default_and_interceptor_headers_are_sent() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .and(header("user-agent", "callwire-test"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .default_header("User-Agent", "callwire-test")
        .interceptor(HeaderInterceptor::new("X-Trace", "abc"))
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/headers", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 200);
}

#[tokio::test]
async fn test_redirects_can_be_disabled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/new"),
        )
        .mount(&mock_server)
        .await;

    let client = Client::builder().follow_redirects(false).build().unwrap();
    let response = client
        .get(format!("{}/old", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 302);
    assert_eq!(response.header("location"), Some("/new"));
}

#[tokio::test]
async fn test_challenge_page_is_retried() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_string("<html><title>Just a moment...</title></html>"),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("content"))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .interceptor(ChallengeRetryInterceptor::new(3, Duration::from_millis(20)))
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/guarded", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(response.body(), Some("content"));
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn test_challenge_retries_are_bounded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(403).insert_header("cf-mitigated", "challenge"))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .interceptor(ChallengeRetryInterceptor::new(2, Duration::from_millis(10)))
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/guarded", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap();

    assert_eq!(response.code(), 403);
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn test_blocking_execute() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string("sync"))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let call = client
        .get(format!("{}/sync", mock_server.uri()))
        .build()
        .unwrap()
        .new_call();

    let response = tokio::task::spawn_blocking(move || call.execute())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.body(), Some("sync"));
}

#[tokio::test]
async fn test_read_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .read_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let err = client
        .get(format!("{}/slow", mock_server.uri()))
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReadTimeout);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unresolvable_host_is_network_unavailable() {
    let client = Client::builder().build().unwrap();
    let err = client
        .get("http://nonexistent.invalid/")
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkUnavailable);
    assert_eq!(err.url(), Some("http://nonexistent.invalid/"));
}

#[tokio::test]
async fn test_refused_connection() {
    let client = Client::builder().build().unwrap();
    let err = client
        .get("http://localhost:1/")
        .build()
        .unwrap()
        .new_call()
        .execute_async()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    assert!(std::error::Error::source(&err).is_some());
}
