//! HTTP client tests against a mock OpenAI-compatible server

use nyx_llm::{ChatCompletion, ChatMessage, Client, ClientConfig, LlmError, ToolDefinition};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::new(format!("{}/v1", server.uri()), "test-model")
        .with_api_key("secret")
        .with_embedding_model("test-embed");
    Client::new(config).unwrap()
}

#[tokio::test]
async fn test_chat_completion_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .chat_completion(&[ChatMessage::user("Hi")])
        .await
        .unwrap();

    assert_eq!(response.content, "Hello there");
    assert!(!response.has_tool_calls());
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_chat_completion_parses_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "search_memories",
                            "arguments": "{\"query\":\"refund policy\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let tools = vec![ToolDefinition::function(
        "search_memories",
        "Search memories",
        json!({"type": "object"}),
    )];
    let response = client_for(&server)
        .chat_completion_with_tools(&[ChatMessage::user("what was the refund policy?")], Some(&tools))
        .await
        .unwrap();

    assert_eq!(response.content, "");
    let calls = response.tool_calls.unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].function.name, "search_memories");
}

#[tokio::test]
async fn test_chat_completion_surfaces_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .chat_completion(&[ChatMessage::user("Hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_chat_completion_without_choices_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .chat_completion(&[ChatMessage::user("Hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Parse { .. }));
}

#[tokio::test]
async fn test_embeddings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"model": "test-embed", "input": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
        })))
        .mount(&server)
        .await;

    let vector = client_for(&server).embeddings("hello").await.unwrap();

    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}
