use async_trait::async_trait;
use common::errors::BridgeError;
use idewire::apis::ide::{TokenExchangeRequest, TokenExchangeResponse, TokenGrant};
use idewire::{ApiDefinition, IdeApi};
use std::time::Duration;
use tracing::{debug, warn};

/// One call to the upstream token endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, BridgeError>;
}

pub struct HttpTokenExchanger {
    client: reqwest::Client,
    url: String,
    client_id: String,
    user_id: String,
    timeout: Duration,
}

impl HttpTokenExchanger {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        client_id: &str,
        user_id: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                IdeApi::ExchangeToken.endpoint()
            ),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, BridgeError> {
        let body = TokenExchangeRequest::new(&self.client_id, refresh_token, &self.user_id);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "token exchange request failed");
                BridgeError::UpstreamUnavailable(format!("token exchange failed: {}", err))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "token exchange rejected");
            return Err(BridgeError::UpstreamError {
                status,
                message: format!("token exchange rejected: {}", text),
            });
        }

        let parsed: TokenExchangeResponse = response.json().await.map_err(|err| {
            BridgeError::InternalServerError(format!("unreadable token exchange response: {}", err))
        })?;
        debug!(
            token_expire_at = parsed.result.token_expire_at,
            refresh_expire_at = parsed.result.refresh_expire_at,
            "token exchange succeeded"
        );
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn exchanger(base_url: &str) -> HttpTokenExchanger {
        HttpTokenExchanger::new(
            reqwest::Client::new(),
            base_url,
            "client-1",
            "user-1",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_exchange_posts_credentials() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/cloudide/api/v3/trae/oauth/ExchangeToken")
            .match_body(Matcher::Json(json!({
                "ClientID": "client-1",
                "RefreshToken": "rt-old",
                "ClientSecret": "-",
                "UserID": "user-1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"Result": {
                    "Token": "at-new",
                    "TokenExpireAt": 2000,
                    "RefreshToken": "rt-new",
                    "RefreshExpireAt": 9000
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let grant = exchanger(&server.url()).exchange("rt-old").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            grant,
            TokenGrant {
                token: "at-new".to_string(),
                token_expire_at: 2000,
                refresh_token: "rt-new".to_string(),
                refresh_expire_at: 9000,
            }
        );
    }

    #[tokio::test]
    async fn test_exchange_surfaces_rejection() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/cloudide/api/v3/trae/oauth/ExchangeToken")
            .with_status(403)
            .with_body("revoked")
            .create_async()
            .await;

        let err = exchanger(&server.url()).exchange("rt").await.unwrap_err();
        match err {
            BridgeError::UpstreamError { status, message } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(message.contains("revoked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_transport_failure() {
        // nothing listens on port 9 of localhost
        let err = exchanger("http://127.0.0.1:9").exchange("rt").await.unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamUnavailable(_)));
    }
}
