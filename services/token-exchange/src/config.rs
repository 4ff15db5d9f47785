use std::net::SocketAddr;
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

const CONFIG_PATH_ENV: &str = "TOKEN_EXCHANGE_CONFIG";
const PORT_ENV: &str = "TOKEN_EXCHANGE_PORT";
const ISSUER_URL_ENV: &str = "TOKEN_EXCHANGE_ISSUER_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenExchangeConfig {
    pub bind_address: String,
    pub port: u16,
    pub issuer: IssuerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    pub endpoint: String,
    pub request_timeout_ms: u64,
}

impl Default for TokenExchangeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8010,
            issuer: IssuerConfig::default(),
        }
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8020/v1/custom-token".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl IssuerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

impl TokenExchangeConfig {
    /// Load configuration: defaults, then the optional YAML file named by
    /// `TOKEN_EXCHANGE_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_environment_overrides();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn apply_environment_overrides(&mut self) {
        self.port = env_port(PORT_ENV, self.port);
        if let Ok(endpoint) = env::var(ISSUER_URL_ENV) {
            self.issuer.endpoint = endpoint;
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_address, self.port).parse()
    }
}

/// Resolve a port override from the environment.
///
/// Falls back to the provided default when the variable is missing or cannot
/// be parsed into a `u16`.
fn env_port(var: &str, default: u16) -> u16 {
    match env::var(var) {
        Ok(value) => value
            .parse::<u16>()
            .inspect_err(|error| {
                tracing::warn!(%var, %value, %error, "invalid port override, using default");
            })
            .unwrap_or(default),
        Err(_) => default,
    }
}
