use common::errors::BridgeError;
use hyper::header::{HeaderMap, AUTHORIZATION};

/// Checks `Authorization: Bearer <token>` when an inbound token is configured.
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), BridgeError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(BridgeError::Unauthorized),
    }
}
