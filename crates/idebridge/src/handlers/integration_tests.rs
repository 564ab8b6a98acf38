use bytes::Bytes;
use common::configuration::Configuration;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use idewire::apis::ide::{IdeModelConfig, IdeModelList};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use super::response_handler::ResponseBody;
use super::route;
use crate::app::AppState;
use crate::credentials::testing::ScriptedExchanger;
use crate::credentials::CredentialManager;
use crate::token_store::memory::MemoryTokenStore;
use crate::token_store::{StoredTokens, TokenStore};
use crate::upstream::testing::{done, output, queued, Reply, ScriptedUpstream};
use crate::utils::clock::testing::ManualClock;
use common::errors::BridgeError;

const NOW_MS: i64 = 1_742_882_589_000;

fn state_with(
    upstream: Arc<ScriptedUpstream>,
    auth_token: Option<&str>,
    credentials: Option<Arc<CredentialManager>>,
) -> Arc<AppState> {
    let mut config = Configuration::default();
    config.auth_token = auth_token.map(str::to_string);
    config.queue.retry_delay_ms = 0;
    let clock = Arc::new(ManualClock::at(NOW_MS));
    let credentials = credentials.unwrap_or_else(|| {
        Arc::new(CredentialManager::with_static_token("tok", clock.clone()))
    });
    Arc::new(AppState::new(&config, credentials, upstream, clock).unwrap())
}

fn state(upstream: Arc<ScriptedUpstream>) -> Arc<AppState> {
    state_with(upstream, None, None)
}

fn request(method: Method, path: &str, body: Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .header("x-request-id", "req-1")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn chat(model: &str, stream: bool) -> Request<Full<Bytes>> {
    request(
        Method::POST,
        "/v1/chat/completions",
        json!({"model": model, "stream": stream, "messages": [{"role": "user", "content": "hi"}]}),
    )
}

async fn body_text(response: Response<ResponseBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<ResponseBody>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn data_payloads(body: &str) -> Vec<&str> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .collect()
}

#[tokio::test]
async fn test_buffered_completion() {
    let upstream = Arc::new(ScriptedUpstream::with_frames(vec![
        output("R", ""),
        output("", "A"),
        done("stop"),
    ]));
    let response = route(chat("claude-3-7", false), state(upstream.clone()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["created"], NOW_MS / 1000);
    assert_eq!(body["model"], "claude-3-7");
    assert_eq!(
        body["choices"][0]["message"],
        json!({"role": "assistant", "content": "<think>\n\nR</think>\n\nA"})
    );
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(upstream.requests()[0].model_name, "aws_sdk_claude37_sonnet");
}

#[tokio::test]
async fn test_streaming_completion() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![
        Reply::Frames(vec![Ok(queued(9))]),
        Reply::Frames(vec![
            Ok(output("", "Hel")),
            Ok(output("", "lo")),
            Ok(done("stop")),
        ]),
    ]));
    let response = route(chat("gpt-4o", true), state(upstream)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let body = body_text(response).await;
    let payloads = data_payloads(&body);
    assert_eq!(payloads.len(), 4);

    let chunks: Vec<Value> = payloads[..3]
        .iter()
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "Hel");
    assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "lo");
    assert_eq!(chunks[2]["choices"][0]["delta"], json!({}));
    assert_eq!(chunks[2]["choices"][0]["finish_reason"], "stop");
    assert!(chunks.iter().all(|chunk| chunk["id"] == chunks[0]["id"]));
    assert_eq!(payloads[3], "[DONE]");
}

#[tokio::test]
async fn test_stream_failure_renders_error_frame() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![Reply::Frames(vec![
        Ok(output("", "partial")),
        Err(BridgeError::StreamReadError("connection reset".to_string())),
    ])]));
    let response = route(chat("gpt-4o", true), state(upstream)).await.unwrap();
    let body = body_text(response).await;

    assert!(body.ends_with(
        "event: error\ndata: {\"error\":\"error reading upstream stream: connection reset\"}\n\n"
    ));
    assert!(!body.contains("[DONE]"));
}

#[tokio::test]
async fn test_empty_buffered_answer_is_an_error() {
    let upstream = Arc::new(ScriptedUpstream::with_frames(vec![done("stop")]));
    let response = route(chat("gpt-4o", false), state(upstream)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": {
            "message": "upstream returned an empty response",
            "type": "internal_server_error",
            "code": 500
        }})
    );
}

#[tokio::test]
async fn test_request_rejections() {
    let upstream = Arc::new(ScriptedUpstream::default());

    let response = route(chat("gpt-9", false), state(upstream.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_request");

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .body(Full::new(Bytes::from("{not json")))
        .unwrap();
    let response = route(malformed, state(upstream.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let empty = request(
        Method::POST,
        "/v1/chat/completions",
        json!({"model": "gpt-4o", "messages": []}),
    );
    let response = route(empty, state(upstream.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_upstream_rejection_keeps_status() {
    let upstream = Arc::new(ScriptedUpstream::new(vec![Reply::Fail(
        BridgeError::UpstreamError {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "upstream returned an error: slow down".to_string(),
        },
    )]));
    let response = route(chat("gpt-4o", true), state(upstream)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "rate_limit_exceeded");
    assert_eq!(body["error"]["code"], 429);
}

#[tokio::test]
async fn test_expired_credentials_reject_before_parsing() {
    let clock = Arc::new(ManualClock::at(NOW_MS));
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(
            &StoredTokens {
                access_token: "at".to_string(),
                access_expire_at: NOW_MS - 1,
                refresh_token: "rt".to_string(),
                refresh_expire_at: NOW_MS - 1,
            },
            NOW_MS,
        )
        .await
        .unwrap();
    let credentials = Arc::new(CredentialManager::new(
        "rt-configured",
        Arc::new(ScriptedExchanger::default()),
        store,
        clock,
    ));
    credentials.restore().await;

    let upstream = Arc::new(ScriptedUpstream::default());
    let app = state_with(upstream.clone(), None, Some(credentials));

    let garbage = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .body(Full::new(Bytes::from("garbage")))
        .unwrap();
    let response = route(garbage, app.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["type"], "credential_expired");

    let response = route(request(Method::GET, "/v1/models", json!({})), app)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_models_use_public_names() {
    let upstream = Arc::new(ScriptedUpstream::default());
    *upstream.models.lock().unwrap() = Some(IdeModelList {
        model_configs: ["aws_sdk_claude37_sonnet", "claude3.5", "deepseek-R1"]
            .into_iter()
            .map(|name| IdeModelConfig {
                name: name.to_string(),
                display_name: String::new(),
                is_default: false,
                multimodal: false,
            })
            .collect(),
    });

    let response = route(request(Method::GET, "/v1/models", json!({})), state(upstream))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "object": "list",
            "data": [
                {"id": "claude-3-7-sonnet", "object": "model", "created": NOW_MS / 1000},
                {"id": "claude-3-5-sonnet", "object": "model", "created": NOW_MS / 1000},
                {"id": "deepseek-R1", "object": "model", "created": NOW_MS / 1000}
            ]
        })
    );
}

#[tokio::test]
async fn test_bearer_auth() {
    let upstream = Arc::new(ScriptedUpstream::with_frames(vec![
        output("", "ok"),
        done("stop"),
    ]));
    let app = state_with(upstream, Some("s3cret"), None);

    let response = route(chat("gpt-4o", false), app.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["type"], "unauthorized");

    let mut authorized = chat("gpt-4o", false);
    authorized
        .headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let response = route(authorized, app.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // preflight needs no credentials
    let preflight = request(Method::OPTIONS, "/v1/chat/completions", json!({}));
    let response = route(preflight, app).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["allow"], "POST, OPTIONS");
}

#[tokio::test]
async fn test_preflight_and_unknown_routes() {
    let app = state(Arc::new(ScriptedUpstream::default()));

    let response = route(request(Method::OPTIONS, "/v1/models", json!({})), app.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["allow"], "GET, OPTIONS");
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "Authorization, Content-Type"
    );

    let response = route(request(Method::GET, "/v1/embeddings", json!({})), app.clone())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = route(request(Method::GET, "/v1/chat/completions", json!({})), app)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
