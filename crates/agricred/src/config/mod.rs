use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::workflows::financing::blueprint::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::workflows::financing::{
    FinancingBlueprint, RandomDraftIds, SessionSettings, ValuationConfig,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub financing: FinancingPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            financing: FinancingPolicy::from_env()?,
        })
    }
}

/// Rates, tariff and limits applied to every financing draft.
#[derive(Debug, Clone, PartialEq)]
pub struct FinancingPolicy {
    pub valuation: ValuationConfig,
    pub collaborator_timeout: Duration,
    pub max_document_bytes: u64,
}

impl Default for FinancingPolicy {
    fn default() -> Self {
        Self {
            valuation: ValuationConfig::default(),
            collaborator_timeout: Duration::from_secs(30),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl FinancingPolicy {
    fn from_env() -> Result<Self, ConfigError> {
        let mut policy = Self::default();
        let rates = &mut policy.valuation.advance_rates;

        if let Some(rate) = advance_rate("APP_INVOICE_ADVANCE_RATE")? {
            rates.invoice = rate;
            rates.invoice_upload = rate;
        }
        if let Some(rate) = advance_rate("APP_WAREHOUSE_ADVANCE_RATE")? {
            rates.warehouse_receipt = rate;
        }
        if let Some(rate) = advance_rate("APP_UPLOAD_WAREHOUSE_ADVANCE_RATE")? {
            rates.warehouse_receipt_upload = rate;
        }

        if let Ok(value) = env::var("APP_COLLABORATOR_TIMEOUT_SECS") {
            let seconds = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .ok_or(ConfigError::InvalidTimeout { value })?;
            policy.collaborator_timeout = Duration::from_secs(seconds);
        }

        Ok(policy)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            blueprint: Arc::new(FinancingBlueprint::with_document_limit(
                self.max_document_bytes,
            )),
            valuation: self.valuation.clone(),
            collaborator_timeout: self.collaborator_timeout,
            draft_ids: Arc::new(RandomDraftIds),
        }
    }
}

fn advance_rate(variable: &'static str) -> Result<Option<u8>, ConfigError> {
    let Ok(value) = env::var(variable) else {
        return Ok(None);
    };

    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|rate| (1..=100).contains(rate))
        .map(Some)
        .ok_or(ConfigError::InvalidAdvanceRate { variable, value })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAdvanceRate { variable: &'static str, value: String },
    InvalidTimeout { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAdvanceRate { variable, value } => {
                write!(f, "{variable} must be a percentage between 1 and 100, got '{value}'")
            }
            ConfigError::InvalidTimeout { value } => write!(
                f,
                "APP_COLLABORATOR_TIMEOUT_SECS must be a positive number of seconds, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidAdvanceRate { .. }
            | ConfigError::InvalidTimeout { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

/// Serialises tests that touch process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
