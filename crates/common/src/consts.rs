pub const APP_ID_HEADER: &str = "x-app-id";
pub const IDE_VERSION_HEADER: &str = "x-ide-version";
pub const IDE_VERSION_CODE_HEADER: &str = "x-ide-version-code";
pub const IDE_VERSION_TYPE_HEADER: &str = "x-ide-version-type";
pub const DEVICE_CPU_HEADER: &str = "x-device-cpu";
pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const MACHINE_ID_HEADER: &str = "x-machine-id";
pub const DEVICE_BRAND_HEADER: &str = "x-device-brand";
pub const DEVICE_TYPE_HEADER: &str = "x-device-type";
pub const OS_VERSION_HEADER: &str = "x-os-version";
pub const IDE_TOKEN_HEADER: &str = "x-ide-token";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const CONFIG_PATH_ENV: &str = "IDEBRIDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./idebridge.yaml";

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:17080";
pub const DEFAULT_BASE_URL: &str = "https://a0ai-api-sg.byteintlapi.com";
pub const DEFAULT_LOCALE: &str = "zh-cn";
pub const DEFAULT_CONTINUE_PROMPT: &str = "继续";

/// Tokens are refreshed this long before they actually expire
pub const TOKEN_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 30;
