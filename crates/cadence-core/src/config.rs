use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Header the external scheduler sends back on every publish callback.
pub const WEBHOOK_SECRET_HEADER: &str = "x-cadence-webhook-secret";
/// Header carrying the extension's capability token.
pub const CAPABILITY_TOKEN_HEADER: &str = "x-capability-token";
pub const OWNER_ID_HEADER: &str = "x-owner-id";
pub const AUTHOR_ID_HEADER: &str = "x-author-id";
pub const OWNER_PLAN_HEADER: &str = "x-owner-plan";

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Token,
                    token: Some("change-me".to_string()),
                },
            },
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            keys: KeysConfig::default(),
            limits: LimitsConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

/// How session-authenticated routes trust the forwarded owner identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Service token the sign-in layer presents as `Authorization: Bearer`.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Bearer service token plus forwarded `x-owner-id`.
    Token,
    /// Forwarded headers only; the proxy in front has already authenticated.
    TrustedProxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// External scheduler service and callback wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL of the external one-shot trigger service.
    #[serde(default = "default_scheduler_base_url")]
    pub base_url: String,
    /// Bearer token for the trigger service API.
    pub api_token: Option<String>,
    /// Public URL of `POST /webhooks/publish` on this gateway.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    /// Shared secret the trigger service echoes back in the callback header.
    #[serde(default = "default_webhook_secret")]
    pub webhook_secret: String,
    /// Replace an item's live trigger on re-schedule instead of failing
    /// with `AlreadyScheduled`.
    #[serde(default = "bool_true")]
    pub supersede_existing: bool,
    /// A schedule must land at least this many seconds in the future.
    #[serde(default = "default_min_lead_secs")]
    pub min_lead_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries for transport errors and 502/503/504. 4xx is never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_url: default_scheduler_base_url(),
            api_token: None,
            callback_url: default_callback_url(),
            webhook_secret: default_webhook_secret(),
            supersede_existing: true,
            min_lead_secs: default_min_lead_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Extension capability token signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            signing_secret: default_signing_secret(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

/// Plan-based ceilings on outstanding schedules. `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_free_max_scheduled")]
    pub free_max_scheduled: Option<usize>,
    #[serde(default)]
    pub pro_max_scheduled: Option<usize>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            free_max_scheduled: default_free_max_scheduled(),
            pro_max_scheduled: None,
        }
    }
}

impl LimitsConfig {
    pub fn max_scheduled(&self, plan: crate::types::Plan) -> Option<usize> {
        match plan {
            crate::types::Plan::Free => self.free_max_scheduled,
            crate::types::Plan::Pro => self.pro_max_scheduled,
        }
    }
}

/// Where fired notes are handed off for publication.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishConfig {
    /// When unset, publication is only recorded in the log.
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_scheduler_base_url() -> String {
    "http://localhost:8288".to_string()
}
fn default_callback_url() -> String {
    format!("http://{DEFAULT_BIND}:{DEFAULT_PORT}/webhooks/publish")
}
fn default_webhook_secret() -> String {
    "change-me-webhook".to_string()
}
fn default_min_lead_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_signing_secret() -> String {
    "change-me-signing".to_string()
}
fn default_token_ttl_days() -> u32 {
    3650
}
fn default_free_max_scheduled() -> Option<usize> {
    Some(10)
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Falls back to `~/.cadence/cadence.toml` when no path is given.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CadenceConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
            .map_err(|e| crate::error::CadenceError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
