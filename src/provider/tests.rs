use super::*;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> WhatsAppConfig {
    WhatsAppConfig {
        api_base_url: server.uri(),
        phone_number_id: "1029384756".into(),
        access_token: "EAAG-token".into(),
        ..WhatsAppConfig::default()
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
    }
}

#[test]
fn test_endpoint_format() {
    let config = WhatsAppConfig {
        api_base_url: "https://graph.facebook.com/".into(),
        phone_number_id: "123".into(),
        ..WhatsAppConfig::default()
    };
    let client = MetaWhatsAppClient::new(&config);
    assert_eq!(
        client.endpoint(),
        "https://graph.facebook.com/v18.0/123/messages"
    );
}

#[test]
fn test_retry_delay_is_bounded_exponential() {
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_delay_ms: 100,
        max_delay_ms: 350,
        backoff_multiplier: 2.0,
    };
    assert_eq!(policy.delay(0), Duration::from_millis(100));
    assert_eq!(policy.delay(1), Duration::from_millis(200));
    assert_eq!(policy.delay(2), Duration::from_millis(350));
}

#[tokio::test]
async fn test_send_text_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v18.0/1029384756/messages"))
        .and(header("authorization", "Bearer EAAG-token"))
        .and(body_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": "5551234",
            "type": "text",
            "text": {"body": "hello"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "contacts": [{"input": "5551234", "wa_id": "5551234"}],
            "messages": [{"id": "wamid.BBB"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server));
    let receipt = client.send_text("5551234", "hello").await.unwrap();
    assert_eq!(receipt.provider_message_id, "wamid.BBB");
    assert_eq!(client.name(), "whatsapp");
}

#[tokio::test]
async fn test_send_text_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "(#131030) Recipient phone number not in allowed list",
                "type": "OAuthException",
                "code": 131030
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server)).with_retry(fast_retry(3));
    let err = client.send_text("5551234", "hello").await.unwrap_err();
    match err {
        RelayError::Provider {
            message,
            code,
            retryable,
        } => {
            assert!(message.contains("not in allowed list"));
            assert_eq!(code, Some(131_030));
            assert!(!retryable);
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_text_server_error_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server)).with_retry(fast_retry(3));
    let err = client.send_text("5551234", "hello").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_retry_policy_taken_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let config = WhatsAppConfig {
        max_attempts: 2,
        retry_base_delay_ms: 1,
        ..config_for(&server)
    };
    let client = MetaWhatsAppClient::new(&config);
    assert!(client.send_text("5551234", "hello").await.is_err());
}

#[tokio::test]
async fn test_send_text_default_policy_makes_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server));
    assert!(client.send_text("5551234", "hello").await.is_err());
}

#[tokio::test]
async fn test_send_text_recovers_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"message": "rate limited", "type": "OAuthException", "code": 130_429}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"messages": [{"id": "wamid.RETRY"}]})),
        )
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server)).with_retry(fast_retry(2));
    let receipt = client.send_text("5551234", "hello").await.unwrap();
    assert_eq!(receipt.provider_message_id, "wamid.RETRY");
}

#[tokio::test]
async fn test_success_without_message_id_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"messages": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = MetaWhatsAppClient::new(&config_for(&server)).with_retry(fast_retry(3));
    let err = client.send_text("5551234", "hello").await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("no message id"));
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let config = WhatsAppConfig {
        api_base_url: "http://127.0.0.1:1".into(),
        phone_number_id: "1".into(),
        timeout_secs: 2,
        ..WhatsAppConfig::default()
    };
    let client = MetaWhatsAppClient::new(&config);
    let err = client.send_text("5551234", "hello").await.unwrap_err();
    assert!(err.is_retryable());
}

#[test]
fn test_parse_api_error_plain_body() {
    let err = parse_api_error(StatusCode::BAD_GATEWAY, b"upstream down");
    assert!(err.is_retryable());
    assert!(err.to_string().contains("upstream down"));

    let err = parse_api_error(StatusCode::UNAUTHORIZED, b"");
    assert!(!err.is_retryable());
}
