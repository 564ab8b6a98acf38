use common::configuration::{Configuration, TokenStoreType};
use common::consts::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use common::errors::ConfigError;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use idebridge::app::AppState;
use idebridge::credentials::exchange::HttpTokenExchanger;
use idebridge::credentials::CredentialManager;
use idebridge::device::DeviceRotator;
use idebridge::handlers::route;
use idebridge::token_store::memory::MemoryTokenStore;
use idebridge::token_store::redis_store::RedisTokenStore;
use idebridge::token_store::TokenStore;
use idebridge::upstream::{ChatUpstream, IdeClient};
use idebridge::utils::clock::{Clock, SystemClock};
use idebridge::utils::tracing::{init_tracer, redact};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn build_credentials(
    config: &Configuration,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
) -> Result<CredentialManager, BoxError> {
    if let Some(token) = config
        .upstream
        .static_token
        .as_deref()
        .filter(|token| !token.is_empty())
    {
        info!(token = %redact(token), "using static upstream token");
        return Ok(CredentialManager::with_static_token(token, clock));
    }

    let store: Arc<dyn TokenStore> = match config.token_store.store_type {
        TokenStoreType::Memory => {
            info!(store_type = "memory", "initialized token store");
            Arc::new(MemoryTokenStore::new())
        }
        TokenStoreType::Redis => {
            let connection_string = config
                .token_store
                .connection_string
                .as_deref()
                .ok_or_else(|| {
                    ConfigError::Invalid("redis token store needs a connection string".to_string())
                })?;
            Arc::new(RedisTokenStore::connect(connection_string, &config.upstream.app_id).await?)
        }
    };

    let exchange_timeout = Duration::from_secs(config.upstream.exchange_timeout_secs);
    let exchanger = Arc::new(HttpTokenExchanger::new(
        client,
        &config.upstream.base_url,
        &config.upstream.client_id,
        &config.upstream.user_id,
        exchange_timeout,
    ));
    let refresh_token = config.upstream.refresh_token.clone().unwrap_or_default();
    let credentials = CredentialManager::new(&refresh_token, exchanger, store, clock)
        .with_exchange_timeout(exchange_timeout);
    credentials.restore().await;
    Ok(credentials)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    eprintln!("loading configuration from {}", config_path);

    let mut config = Configuration::from_file(Path::new(&config_path))?;
    config.apply_env(|name| env::var(name).ok())?;
    config.validate()?;

    init_tracer(config.log_level.as_deref());
    info!(
        path = %config_path,
        base_url = %config.upstream.base_url,
        continuation = config.continuation.enabled,
        device_rotation = config.device.rotate,
        "loaded configuration"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()?;

    let credentials = Arc::new(build_credentials(&config, http_client.clone(), clock.clone()).await?);
    // a bridge that cannot authenticate at start-up is misconfigured
    let token = credentials.ensure_fresh().await?;
    info!(token = %redact(&token), "upstream credentials ready");
    if !config.uses_static_token() {
        let _refresh = credentials
            .clone()
            .spawn_refresh_loop(Duration::from_secs(config.upstream.refresh_interval_secs));
    }

    let devices = Arc::new(DeviceRotator::new(&config.device));
    let upstream: Arc<dyn ChatUpstream> = Arc::new(IdeClient::new(
        http_client,
        &config.upstream,
        credentials.clone(),
        devices,
    ));
    let state = Arc::new(AppState::new(&config, credentials, upstream, clock)?);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);

        let state = state.clone();
        let service = service_fn(move |req| route(req, state.clone()));

        tokio::task::spawn(async move {
            debug!(peer = ?peer_addr, "accepted connection");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = ?err, "error serving connection");
            }
        });
    }
}
