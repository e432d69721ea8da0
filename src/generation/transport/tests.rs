use super::*;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lines(items: &[&str]) -> LineStream {
    let owned: Vec<Result<String>> = items.iter().map(|s| Ok((*s).to_string())).collect();
    Box::pin(stream::iter(owned))
}

fn payload() -> GeneratePayload {
    GeneratePayload {
        model: "test-model".to_string(),
        prompt: "Say hello".to_string(),
        stream: true,
        num_predict: 16,
        temperature: 0.3,
        options: SamplingOptions {
            num_predict: 16,
            temperature: 0.3,
        },
    }
}

#[tokio::test]
async fn aggregates_fragments_in_order() {
    let stream = lines(&[
        r#"{"response":"Hello","done":false}"#,
        r#"{"response":", ","done":false}"#,
        r#"{"response":"world","done":false}"#,
        r#"{"response":"","done":true}"#,
    ]);

    let text = aggregate_stream(stream).await.expect("should aggregate");
    assert_eq!(text, "Hello, world");
}

#[tokio::test]
async fn skips_malformed_and_blank_lines() {
    let stream = lines(&[
        r#"{"response":"Hello"}"#,
        "",
        "{not json",
        "   ",
        r#"{"response":" there"}"#,
    ]);

    let text = aggregate_stream(stream).await.expect("should aggregate");
    assert_eq!(text, "Hello there");
}

#[tokio::test]
async fn empty_result_is_failure() {
    let stream = lines(&[r#"{"response":"   "}"#, r#"{"done":true}"#]);
    assert!(matches!(
        aggregate_stream(stream).await,
        Err(RagError::BackendUnavailable(_))
    ));

    assert!(aggregate_stream(lines(&[])).await.is_err());
}

#[tokio::test]
async fn error_fragment_is_failure() {
    let stream = lines(&[
        r#"{"response":"partial"}"#,
        r#"{"error":"model 'x' not found"}"#,
    ]);

    match aggregate_stream(stream).await {
        Err(RagError::BackendUnavailable(message)) => assert!(message.contains("not found")),
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn transport_error_mid_stream_is_failure() {
    let items: Vec<Result<String>> = vec![
        Ok(r#"{"response":"partial"}"#.to_string()),
        Err(RagError::Network("connection reset".to_string())),
    ];
    let stream: LineStream = Box::pin(stream::iter(items));

    assert!(matches!(
        aggregate_stream(stream).await,
        Err(RagError::Network(_))
    ));
}

#[test]
fn payload_serialization() {
    let json = serde_json::to_value(payload()).expect("should serialize");
    assert_eq!(json["model"], "test-model");
    assert_eq!(json["stream"], true);
    assert_eq!(json["num_predict"], 16);
    assert_eq!(json["options"]["num_predict"], 16);
}

#[tokio::test]
async fn streams_ndjson_from_ollama() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"model":"test-model","response":"Hi","done":false}"#,
        "\n",
        r#"{"model":"test-model","response":" there","done":false}"#,
        "\n",
        r#"{"model":"test-model","response":"","done":true}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).expect("mock uri");
    let transport = OllamaTransport::new(&base, Duration::from_secs(5)).expect("transport");
    assert!(!transport.is_connected().await);

    let stream = transport.open_stream(&payload()).await.expect("should open");
    let text = aggregate_stream(stream).await.expect("should aggregate");

    assert_eq!(text, "Hi there");
    assert!(transport.is_connected().await);
}

#[tokio::test]
async fn error_status_is_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).expect("mock uri");
    let transport = OllamaTransport::new(&base, Duration::from_secs(5)).expect("transport");

    assert!(matches!(
        transport.open_stream(&payload()).await,
        Err(RagError::BackendUnavailable(_))
    ));
}

#[tokio::test]
async fn shutdown_is_safe_without_connection() {
    let base = Url::parse("http://127.0.0.1:9").expect("url");
    let transport = OllamaTransport::new(&base, Duration::from_secs(1)).expect("transport");

    transport.shutdown().await;
    transport.shutdown().await;
    assert!(!transport.is_connected().await);
}

#[tokio::test]
async fn connection_is_reused_and_released() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"response\":\"ok\"}\n"))
        .expect(2)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).expect("mock uri");
    let transport = OllamaTransport::new(&base, Duration::from_secs(5)).expect("transport");

    for _ in 0..2 {
        let stream = transport.open_stream(&payload()).await.expect("should open");
        assert_eq!(aggregate_stream(stream).await.expect("aggregate"), "ok");
    }
    assert!(transport.is_connected().await);

    transport.shutdown().await;
    assert!(!transport.is_connected().await);
}
