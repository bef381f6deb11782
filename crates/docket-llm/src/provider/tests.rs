use super::*;

#[test]
fn test_message_constructors() {
    assert_eq!(Message::system("a").role, MessageRole::System);
    assert_eq!(Message::user("b").role, MessageRole::User);
    assert_eq!(Message::assistant("c").role.as_str(), "assistant");
}

#[test]
fn test_request_builder() {
    let request = CompletionRequest::new("yandexgpt-lite")
        .with_message(Message::system("You are a paralegal."))
        .with_message(Message::user("Classify this."))
        .with_max_tokens(500)
        .with_temperature(0.2)
        .json_output();

    assert_eq!(request.model, "yandexgpt-lite");
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.max_tokens, Some(500));
    assert_eq!(request.format, ResponseFormat::Json);
}

#[test]
fn test_token_usage_total() {
    let usage = TokenUsage::new(120, 30);
    assert_eq!(usage.total_tokens, 150);
}

#[test]
fn test_extract_json_plain() {
    let value = extract_json(r#"{"category": "contract"}"#).unwrap();
    assert_eq!(value["category"], "contract");
}

#[test]
fn test_extract_json_fenced() {
    let value = extract_json("```json\n{\"risk\": \"high\"}\n```").unwrap();
    assert_eq!(value["risk"], "high");
}

#[test]
fn test_extract_json_with_prose() {
    let value = extract_json("Here is the result: {\"facts\": [1, 2]} Hope it helps.").unwrap();
    assert_eq!(value["facts"][1], 2);
}

#[test]
fn test_extract_json_missing() {
    let err = tokio_test::assert_err!(extract_json("no structure here"));
    assert!(matches!(err, Error::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[test]
fn test_parse_structured_text_format_untouched() {
    let response = CompletionResponse {
        content: "plain".to_string(),
        ..Default::default()
    }
    .parse_structured(ResponseFormat::Text);
    assert!(response.structured.is_none());
}

#[test]
fn test_parse_structured_json_fallback() {
    let parsed = CompletionResponse {
        content: "```json\n{\"ok\": true}\n```".to_string(),
        ..Default::default()
    }
    .parse_structured(ResponseFormat::Json);
    assert_eq!(parsed.structured.unwrap()["ok"], true);

    let prose = CompletionResponse {
        content: "I could not find anything.".to_string(),
        ..Default::default()
    }
    .parse_structured(ResponseFormat::Json);
    assert!(prose.structured.is_none());
    assert_eq!(prose.content, "I could not find anything.");
}
