//! HTTP client for the IDE chat backend.

use async_trait::async_trait;
use common::configuration::Upstream;
use common::consts::{
    APP_ID_HEADER, DEVICE_BRAND_HEADER, DEVICE_CPU_HEADER, DEVICE_ID_HEADER, DEVICE_TYPE_HEADER,
    IDE_TOKEN_HEADER, IDE_VERSION_CODE_HEADER, IDE_VERSION_HEADER, IDE_VERSION_TYPE_HEADER,
    MACHINE_ID_HEADER, OS_VERSION_HEADER,
};
use common::errors::BridgeError;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use idewire::apis::ide::{IdeChatRequest, IdeModelList};
use idewire::{ApiDefinition, IdeApi, SseEvent};
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::credentials::CredentialManager;
use crate::device::{DeviceIdentity, DeviceRotator};

/// Raw `event:`/`data:` frames of one upstream chat response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseEvent, BridgeError>> + Send>>;

#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Sends a chat request and returns its event stream once the upstream
    /// has accepted it.
    async fn open_chat(&self, request: &IdeChatRequest) -> Result<FrameStream, BridgeError>;

    async fn list_models(&self) -> Result<IdeModelList, BridgeError>;
}

/// The client-application half of the identification headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub app_id: String,
    pub ide_version: String,
    pub ide_version_code: String,
    pub ide_version_type: String,
}

impl From<&Upstream> for AppIdentity {
    fn from(upstream: &Upstream) -> Self {
        Self {
            app_id: upstream.app_id.clone(),
            ide_version: upstream.ide_version.clone(),
            ide_version_code: upstream.ide_version_code.clone(),
            ide_version_type: upstream.ide_version_type.clone(),
        }
    }
}

pub fn identification_headers(
    app: &AppIdentity,
    device: &DeviceIdentity,
    token: &str,
) -> Result<HeaderMap, BridgeError> {
    let pairs: [(&'static str, &str); 11] = [
        (APP_ID_HEADER, &app.app_id),
        (IDE_VERSION_HEADER, &app.ide_version),
        (IDE_VERSION_CODE_HEADER, &app.ide_version_code),
        (IDE_VERSION_TYPE_HEADER, &app.ide_version_type),
        (DEVICE_CPU_HEADER, &device.cpu),
        (DEVICE_ID_HEADER, &device.device_id),
        (MACHINE_ID_HEADER, &device.machine_id),
        (DEVICE_BRAND_HEADER, &device.brand),
        (DEVICE_TYPE_HEADER, &device.device_type),
        (OS_VERSION_HEADER, &device.os_version),
        (IDE_TOKEN_HEADER, token),
    ];

    let mut headers = HeaderMap::with_capacity(pairs.len() + 2);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    for (name, value) in pairs {
        let value = HeaderValue::from_str(value).map_err(|_| {
            BridgeError::InternalServerError(format!("header {} has an invalid value", name))
        })?;
        headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
}

/// Pairs each `event:` line with the `data:` line that follows it. Blank
/// lines between pairs are optional, and the last line may lack its newline.
/// An `event:` line followed by anything but `data:` is dropped together with
/// that line.
pub fn pair_frames<S, E>(lines: S) -> FrameStream
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send,
{
    let lines = Some(Box::pin(lines));
    Box::pin(stream::unfold(lines, |lines| async move {
        let mut lines = lines?;
        let mut pending_event: Option<String> = None;
        loop {
            let line = match lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    return Some((Err(BridgeError::StreamReadError(err.to_string())), None));
                }
                None => return None,
            };
            let line = line.trim();

            match pending_event.take() {
                Some(event) => match line.strip_prefix("data:") {
                    Some(data) => {
                        let frame = SseEvent::new(event, data.trim_start());
                        return Some((Ok(frame), Some(lines)));
                    }
                    None => debug!(event = %event, "event line without data, skipped"),
                },
                None => {
                    if let Some(event) = line.strip_prefix("event:") {
                        pending_event = Some(event.trim_start().to_string());
                    } else if !line.is_empty() {
                        debug!(line = %line, "stray upstream line, skipped");
                    }
                }
            }
        }
    }))
}

async fn upstream_failure(response: reqwest::Response) -> BridgeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "upstream returned an error");
    BridgeError::UpstreamError {
        status,
        message: format!("upstream returned an error: {}", body),
    }
}

fn transport_failure(err: reqwest::Error) -> BridgeError {
    warn!(error = %err, "upstream request failed");
    BridgeError::UpstreamUnavailable(err.to_string())
}

pub struct IdeClient {
    client: reqwest::Client,
    base_url: String,
    app: AppIdentity,
    credentials: Arc<CredentialManager>,
    devices: Arc<DeviceRotator>,
    request_timeout: Duration,
}

impl IdeClient {
    pub fn new(
        client: reqwest::Client,
        upstream: &Upstream,
        credentials: Arc<CredentialManager>,
        devices: Arc<DeviceRotator>,
    ) -> Self {
        Self {
            client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            app: AppIdentity::from(upstream),
            credentials,
            devices,
            request_timeout: Duration::from_secs(upstream.request_timeout_secs),
        }
    }

    fn url(&self, api: IdeApi) -> String {
        format!("{}{}", self.base_url, api.endpoint())
    }

    async fn headers(&self) -> Result<HeaderMap, BridgeError> {
        let token = self.credentials.ensure_fresh().await?;
        let device = self.devices.current_identity().await;
        identification_headers(&self.app, &device, &token)
    }
}

#[async_trait]
impl ChatUpstream for IdeClient {
    async fn open_chat(&self, request: &IdeChatRequest) -> Result<FrameStream, BridgeError> {
        let headers = self.headers().await?;
        debug!(
            model = %request.model_name,
            session_id = %request.session_id,
            "opening upstream chat stream"
        );

        let response = self
            .client
            .post(self.url(IdeApi::Chat))
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            return Err(upstream_failure(response).await);
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());
        Ok(pair_frames(lines))
    }

    async fn list_models(&self) -> Result<IdeModelList, BridgeError> {
        let headers = self.headers().await?;
        let response = self
            .client
            .get(self.url(IdeApi::ModelList))
            .query(&[("type", "chat")])
            .headers(headers)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            return Err(upstream_failure(response).await);
        }

        response.json::<IdeModelList>().await.map_err(|err| {
            BridgeError::InternalServerError(format!("unreadable model catalog: {}", err))
        })
    }
}
