use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::IssuerConfig;

/// Failure at the identity backend boundary.
///
/// `Mint` carries the upstream message verbatim; the exchange layer
/// re-classifies it before anything reaches a caller. `Endpoint` only
/// occurs at construction time and never on the request path.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid issuer endpoint: {0}")]
    Endpoint(String),
    #[error("{0}")]
    Mint(String),
}

/// Capability to mint a short-lived custom token for an authenticated
/// subject. Implemented over HTTP in production and faked in tests.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn mint_custom_token(&self, subject: &str) -> Result<String, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    token: String,
}

/// Process-wide client for the identity backend's token-mint endpoint.
/// Constructed once at bootstrap and shared read-only across invocations.
#[derive(Clone)]
pub struct HttpIdentityClient {
    endpoint: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpIdentityClient {
    pub fn new(config: &IssuerConfig) -> Result<Self, IdentityError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|err| IdentityError::Endpoint(err.to_string()))?;
        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
            timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl IdentityBackend for HttpIdentityClient {
    async fn mint_custom_token(&self, subject: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&json!({ "uid": subject }))
            .send()
            .await
            .map_err(|err| IdentityError::Mint(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Mint(format!(
                "identity backend responded with status {status}"
            )));
        }

        let payload = response
            .json::<MintResponse>()
            .await
            .map_err(|err| IdentityError::Mint(err.to_string()))?;
        Ok(payload.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_endpoint() {
        let config = IssuerConfig {
            endpoint: "not a url".to_string(),
            request_timeout_ms: 1_000,
        };
        assert!(matches!(
            HttpIdentityClient::new(&config),
            Err(IdentityError::Endpoint(_))
        ));
    }

    #[test]
    fn mint_error_displays_upstream_message_unchanged() {
        let err = IdentityError::Mint("quota exceeded".to_string());
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
