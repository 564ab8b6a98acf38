use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Error as HyperError, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

// -----------------------------------------------------------------------------
// Configuration Errors
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value `{value}` for {name}")]
    InvalidValue { name: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// -----------------------------------------------------------------------------
// Bridge Errors
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("refresh token has expired, an operator must supply a new one")]
    CredentialExpired,

    #[error("model '{0}' is not supported")]
    UnsupportedModel(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{message}")]
    UpstreamError { status: StatusCode, message: String },

    #[error("error reading upstream stream: {0}")]
    StreamReadError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid or missing bearer token")]
    Unauthorized,

    #[error("upstream returned an empty response")]
    EmptyResponse,

    #[error("internal server error: {0}")]
    InternalServerError(String),

    #[error("failed to create response: {0}")]
    ResponseCreationFailed(#[from] hyper::http::Error),
}

/// Coarse category reported alongside an upstream HTTP status.
pub fn status_category(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "invalid_request",
        401 => "unauthorized",
        403 => "permission_denied",
        404 => "not_found",
        429 => "rate_limit_exceeded",
        _ => "internal_server_error",
    }
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::CredentialExpired | BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            BridgeError::UnsupportedModel(_) | BridgeError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::UpstreamError { status, .. } => *status,
            BridgeError::StreamReadError(_)
            | BridgeError::EmptyResponse
            | BridgeError::InternalServerError(_)
            | BridgeError::ResponseCreationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::CredentialExpired => "credential_expired",
            BridgeError::UnsupportedModel(_) | BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::UpstreamUnavailable(_) => "service_unavailable",
            BridgeError::UpstreamError { status, .. } => status_category(*status),
            BridgeError::Unauthorized => "unauthorized",
            BridgeError::StreamReadError(_)
            | BridgeError::EmptyResponse
            | BridgeError::InternalServerError(_)
            | BridgeError::ResponseCreationFailed(_) => "internal_server_error",
        }
    }

    pub fn into_response(self) -> Response<BoxBody<Bytes, HyperError>> {
        let status = self.status();
        let body_json = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_u16(),
            }
        });

        let boxed_body = Full::new(Bytes::from(body_json.to_string()))
            .map_err(|never| match never {})
            .boxed();

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(boxed_body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::from("Internal Error"))
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}
