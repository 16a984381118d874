use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use url_summarizer::{api::routes::create_router, config::Config, AppState};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/models/gemini-1.5-pro-latest:generateContent";

const ARTICLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Morning edition</title>
    <style>.banner { color: red; }</style>
    <script>trackVisitor("script-marker");</script>
</head>
<body>
    <article>
        <p>The city council approved a new budget on Monday evening, funding road
        repairs, library hours, and an expanded bus network for the coming year.</p>
        <p>Council members said the plan was the result of months of public hearings
        and would be reviewed again after the first quarter.</p>
    </article>
</body>
</html>"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("url_summarizer=debug")
        .with_test_writer()
        .try_init();
}

fn test_config(gemini: &MockServer) -> Config {
    Config {
        gemini_api_key: Some("test-key".to_string()),
        gemini_api_base: gemini.uri(),
        fetch_timeout: Duration::from_millis(500),
        summary_timeout: Duration::from_millis(500),
        ..Config::default()
    }
}

fn app(config: &Config) -> Router {
    init_tracing();
    create_router(AppState::new(config).expect("state should build"))
}

fn candidate(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }] })
}

async fn page_server(html: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;
    server
}

async fn gemini_server(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.oneshot(request).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

async fn post_raw(app: Router, body: &str) -> (StatusCode, HeaderMap, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/summary")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn post_url(app: Router, url: &str) -> (StatusCode, Value) {
    let (status, _, body) = post_raw(app, &json!({ "url": url }).to_string()).await;
    (status, body)
}

fn error_message(body: &Value) -> &str {
    body["error"].as_str().expect("error body should carry a message")
}

async fn prompt_text(gemini: &MockServer) -> String {
    let requests = gemini.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    body["contents"][0]["parts"][2]["text"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn returns_summary_from_first_candidate() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("ページは最新ニュースを報道"))).await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "summary": "ページは最新ニュースを報道" }));
}

#[tokio::test]
async fn prompt_never_contains_script_or_style_text() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("予算案を承認"))).await;

    let (status, _) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;
    assert_eq!(status, StatusCode::OK);

    let text = prompt_text(&gemini).await;
    assert!(text.contains("city council approved"));
    assert!(!text.contains("script-marker"));
    assert!(!text.contains("color: red"));
}

#[tokio::test]
async fn prompt_text_is_truncated_to_8000_chars() {
    let body = "the quick brown fox jumps over the lazy dog ".repeat(500);
    let html = format!("<html><body><article><p>{}</p></article></body></html>", body);
    let page = page_server(&html).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("狐が犬を飛び越える"))).await;

    let (status, _) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;
    assert_eq!(status, StatusCode::OK);

    let text = prompt_text(&gemini).await;
    assert_eq!(text.chars().count(), 8000);
    assert!(text.starts_with("the quick brown fox"));
    assert!(!text.ends_with("..."));
}

#[tokio::test]
async fn non_post_methods_are_rejected_with_allow_header() {
    let gemini = MockServer::start().await;

    for verb in ["GET", "PUT", "DELETE", "PATCH"] {
        let request = Request::builder()
            .method(verb)
            .uri("/api/summary")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(app(&test_config(&gemini)), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers.get(header::ALLOW).unwrap(), "POST");
        assert_eq!(error_message(&body), format!("Method {} Not Allowed", verb));
    }
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let gemini = MockServer::start().await;

    for body in ["{not json", "", "[1, 2]", r#"["https://example.com"]"#, r#""https://example.com""#, r#"{"url": 42}"#] {
        let (status, _, response) = post_raw(app(&test_config(&gemini)), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(error_message(&response), "Invalid JSON in request body");
    }
}

#[tokio::test]
async fn missing_or_empty_url_is_a_bad_request() {
    let gemini = MockServer::start().await;

    for body in ["{}", r#"{"url": null}"#, r#"{"url": ""}"#] {
        let (status, _, response) = post_raw(app(&test_config(&gemini)), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(error_message(&response), "URL is required");
    }
}

#[tokio::test]
async fn unparsable_url_is_a_bad_request() {
    let gemini = MockServer::start().await;

    let (status, body) = post_url(app(&test_config(&gemini)), "not a url").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Invalid URL format");
    assert!(gemini.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_api_key_is_a_server_configuration_error() {
    let page = page_server(ARTICLE_HTML).await;
    let config = Config::default();

    let (status, body) = post_url(app(&config), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(&body).starts_with("Server configuration error"));
    assert!(page.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_page_times_out_with_408() {
    let page = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE_HTML)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&page)
        .await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("unused"))).await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert!(error_message(&body).contains("timed out while fetching"));
    assert!(gemini.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn page_error_status_is_reported_with_snippet() {
    let page = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such page"))
        .mount(&page)
        .await;
    let gemini = MockServer::start().await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = error_message(&body);
    assert!(message.contains("404"));
    assert!(message.contains("no such page"));
}

#[tokio::test]
async fn unreachable_page_is_a_fetch_error() {
    let gemini = MockServer::start().await;

    // Port 1 has no listener.
    let (status, body) = post_url(app(&test_config(&gemini)), "http://127.0.0.1:1/article").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(&body).starts_with("Failed to fetch content from URL"));
}

#[tokio::test]
async fn empty_page_has_no_extractable_content() {
    let page = page_server("<html><head><style>p { margin: 0 }</style></head><body>  </body></html>").await;
    let gemini = MockServer::start().await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(&body).starts_with("Could not extract readable content"));
    assert!(gemini.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn deeply_nested_page_is_still_summarized() {
    let html = format!("<html><body>{}nested page text</body></html>", "<div>".repeat(50_000));
    let page = page_server(&html).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("入れ子のページ"))).await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "summary": "入れ子のページ" }));
    assert_eq!(prompt_text(&gemini).await, "nested page text");
}

#[tokio::test]
async fn rate_limited_generation_is_service_unavailable() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(429).set_body_json(json!({
        "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
    })))
    .await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let message = error_message(&body);
    assert!(message.contains("rate limited"));
    assert!(message.contains("Resource has been exhausted"));
}

#[tokio::test]
async fn other_generation_errors_are_internal() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(400).set_body_json(json!({
        "error": { "code": 400, "message": "API key not valid" }
    })))
    .await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(&body), "Gemini API error: API key not valid");
}

#[tokio::test]
async fn blocked_prompt_is_a_bad_request_naming_the_reason() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(json!({
        "promptFeedback": { "blockReason": "SAFETY" }
    })))
    .await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("SAFETY"));
}

#[tokio::test]
async fn response_without_text_is_an_empty_summary() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] }))).await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(&body).starts_with("Failed to get a valid summary"));
}

#[tokio::test]
async fn slow_generation_times_out_with_504() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(
        ResponseTemplate::new(200)
            .set_body_json(candidate("too late"))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let (status, body) = post_url(app(&test_config(&gemini)), &format!("{}/article", page.uri())).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(error_message(&body).contains("timed out"));
}

#[tokio::test]
async fn identical_requests_yield_identical_summaries() {
    let page = page_server(ARTICLE_HTML).await;
    let gemini = gemini_server(ResponseTemplate::new(200).set_body_json(candidate("市議会が予算を承認"))).await;
    let app = app(&test_config(&gemini));
    let url = format!("{}/article", page.uri());

    let first = post_url(app.clone(), &url).await;
    let second = post_url(app, &url).await;

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(gemini.received_requests().await.unwrap().len(), 2);
}
