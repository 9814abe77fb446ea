use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
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
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Read `.env` (when present) and the `APP_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = env::var("APP_ENV")
            .map(|value| AppEnvironment::parse(&value))
            .unwrap_or(AppEnvironment::Development);

        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(environment),
            workflow: WorkflowConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("APP_HOST")
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match env::var("APP_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self { host, port })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        self.host
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|source| ConfigError::InvalidHost { source })
    }
}

/// Log filter and output styling.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives; `RUST_LOG` overrides them at startup.
    pub log_level: String,
    /// Colored output, only wanted on a developer terminal.
    pub ansi: bool,
}

impl TelemetryConfig {
    fn from_env(environment: AppEnvironment) -> Self {
        Self {
            log_level: env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            ansi: environment == AppEnvironment::Development,
        }
    }
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PORTAL_URL: &str = "http://localhost:3000";
const DEFAULT_ACCESS_LINK_TTL_HOURS: u32 = 72;
const DEFAULT_CREDENTIAL_LENGTH: usize = 16;
const MIN_CREDENTIAL_LENGTH: usize = 12;
const DEFAULT_ACCESS_TOKEN_LENGTH: usize = 40;
const MIN_ACCESS_TOKEN_LENGTH: usize = 32;

/// Registration workflow dials: notification addressing and provisioning secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Office inbox that hears about new registrations; `None` disables the notice.
    pub office_email: Option<String>,
    pub portal_url: String,
    pub access_link_ttl_hours: u32,
    pub credential_length: usize,
    pub access_token_length: usize,
    pub form_mapping_path: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            office_email: None,
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            access_link_ttl_hours: DEFAULT_ACCESS_LINK_TTL_HOURS,
            credential_length: DEFAULT_CREDENTIAL_LENGTH,
            access_token_length: DEFAULT_ACCESS_TOKEN_LENGTH,
            form_mapping_path: None,
        }
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let office_email = env::var("APP_OFFICE_EMAIL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let portal_url = env::var("APP_PORTAL_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.portal_url);

        let access_link_ttl_hours = match env::var("APP_ACCESS_LINK_TTL_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidAccessLinkTtl)?,
            Err(_) => defaults.access_link_ttl_hours,
        };

        let credential_length = secret_length(
            "APP_CREDENTIAL_LENGTH",
            defaults.credential_length,
            MIN_CREDENTIAL_LENGTH,
        )?;
        let access_token_length = secret_length(
            "APP_ACCESS_TOKEN_LENGTH",
            defaults.access_token_length,
            MIN_ACCESS_TOKEN_LENGTH,
        )?;

        let form_mapping_path = env::var("APP_FORM_MAPPING")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            office_email,
            portal_url,
            access_link_ttl_hours,
            credential_length,
            access_token_length,
            form_mapping_path,
        })
    }

    pub fn access_link_validity(&self) -> Duration {
        Duration::hours(i64::from(self.access_link_ttl_hours))
    }
}

fn secret_length(
    variable: &'static str,
    default: usize,
    minimum: usize,
) -> Result<usize, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|length| *length >= minimum)
            .ok_or(ConfigError::InvalidSecretLength { variable, minimum }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAccessLinkTtl,
    InvalidSecretLength {
        variable: &'static str,
        minimum: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAccessLinkTtl => {
                write!(f, "APP_ACCESS_LINK_TTL_HOURS must be a positive number of hours")
            }
            ConfigError::InvalidSecretLength { variable, minimum } => {
                write!(f, "{variable} must be a number no smaller than {minimum}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidAccessLinkTtl
            | ConfigError::InvalidSecretLength { .. } => None,
        }
    }
}
