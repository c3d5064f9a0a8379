//! Recording Resolver Integration Tests
//!
//! Twilio recordings listing against a local HTTP responder.

mod common;

use callharvest::adapters::{AccountCredentials, RecordingSource, ResolveError, TwilioClient};
use common::{Route, TestServer};
use serde_json::json;

const LIST_PATH: &str = "/2010-04-01/Accounts/AC1/Recordings.json";

fn client(server: &TestServer) -> TwilioClient {
    TwilioClient::with_api_base(AccountCredentials::new("AC1", "token"), server.base_url())
}

#[tokio::test]
async fn test_lists_media_urls_in_api_order() {
    let server = TestServer::start(vec![(
        LIST_PATH,
        Route::json(
            200,
            json!({
                "recordings": [
                    {"sid": "RE1", "call_sid": "CA1", "uri": "/2010-04-01/Accounts/AC1/Recordings/RE1.json"},
                    {"sid": "RE2", "call_sid": "CA1", "uri": "/2010-04-01/Accounts/AC1/Recordings/RE2.json"}
                ]
            }),
        ),
    )])
    .await;

    let urls = client(&server).list_recordings("CA1", 20).await.unwrap();

    assert_eq!(
        urls,
        vec![
            server.url("/2010-04-01/Accounts/AC1/Recordings/RE1"),
            server.url("/2010-04-01/Accounts/AC1/Recordings/RE2"),
        ]
    );
    assert_eq!(server.hits(), vec![format!("{}?CallSid=CA1&PageSize=20", LIST_PATH)]);
}

#[tokio::test]
async fn test_page_limit_caps_results() {
    let recordings: Vec<_> = (0..5)
        .map(|i| json!({"sid": format!("RE{}", i), "media_url": format!("https://media.test/RE{}", i)}))
        .collect();
    let server = TestServer::start(vec![(
        LIST_PATH,
        Route::json(200, json!({ "recordings": recordings })),
    )])
    .await;

    let urls = client(&server).list_recordings("CA1", 3).await.unwrap();
    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "https://media.test/RE0");
}

#[tokio::test]
async fn test_no_recordings_is_empty_not_error() {
    let server = TestServer::start(vec![(
        LIST_PATH,
        Route::json(200, json!({"recordings": [], "page": 0})),
    )])
    .await;

    let urls = client(&server).list_recordings("CA2", 20).await.unwrap();
    assert!(urls.is_empty());
}

#[tokio::test]
async fn test_api_error_carries_vendor_message() {
    let server = TestServer::start(vec![(
        LIST_PATH,
        Route::json(
            401,
            json!({"code": 20003, "message": "Authenticate", "status": 401}),
        ),
    )])
    .await;

    let err = client(&server).list_recordings("CA3", 20).await.unwrap_err();
    match err {
        ResolveError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("Authenticate"));
            assert!(message.contains("20003"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_api_is_http_error() {
    let client = TwilioClient::with_api_base(AccountCredentials::new("AC1", "t"), "http://127.0.0.1:1");
    let err = client.list_recordings("CA4", 20).await.unwrap_err();
    assert!(matches!(err, ResolveError::Http(_)));
}
