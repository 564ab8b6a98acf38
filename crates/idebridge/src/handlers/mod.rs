pub mod auth;
pub mod chat_completions;
pub mod models;
pub mod response_handler;

#[cfg(test)]
mod integration_tests;

use common::consts::REQUEST_ID_HEADER;
use common::errors::BridgeError;
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW,
};
use hyper::{Method, Request, Response, StatusCode};
use idewire::{ApiDefinition, OpenAIApi};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::AppState;
use auth::authorize;
use chat_completions::chat_completions;
use models::list_models;
use response_handler::{empty, ResponseBody};

fn allowed_methods(api: OpenAIApi) -> &'static str {
    match api {
        OpenAIApi::ChatCompletions => "POST, OPTIONS",
        OpenAIApi::Models => "GET, OPTIONS",
    }
}

fn preflight(api: OpenAIApi) -> Response<ResponseBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(ALLOW, HeaderValue::from_static(allowed_methods(api)));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn not_found() -> Response<ResponseBody> {
    let mut not_found = Response::new(empty());
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    not_found
}

async fn dispatch<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, BridgeError>
where
    B: Body,
    B::Error: Display,
{
    let Some(api) = OpenAIApi::from_endpoint(request.uri().path()) else {
        debug!("no route found");
        return Ok(not_found());
    };

    if request.method() == Method::OPTIONS {
        return Ok(preflight(api));
    }
    authorize(request.headers(), state.auth_token.as_deref())?;

    match (request.method(), api) {
        (&Method::POST, OpenAIApi::ChatCompletions) => chat_completions(request, state).await,
        (&Method::GET, OpenAIApi::Models) => list_models(&state).await,
        _ => {
            debug!("method not routed");
            Ok(not_found())
        }
    }
}

/// Entry point for every inbound request. Errors are rendered here so the
/// connection never sees a service error.
pub async fn route<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, hyper::Error>
where
    B: Body,
    B::Error: Display,
{
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    let mut response = async move {
        match dispatch(request, state).await {
            Ok(response) => response,
            Err(err) => {
                warn!(status = err.status().as_u16(), error = %err, "request failed");
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await;

    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    Ok(response)
}
