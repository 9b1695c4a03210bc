//! Injected configuration values.
//!
//! The core never reads environment variables or config files itself; a
//! collaborator deserializes these structs and hands them in.

use std::fmt;

use serde::Deserialize;

use crate::types::Network;

/// Errors raised when validating injected configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("deployer address is not configured")]
    MissingDeployer,

    #[error("signing credential is not configured")]
    MissingCredential,

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Opaque signing credential.
///
/// Never printed: `Debug` is redacted and the type does not implement
/// `Serialize`, so it cannot leak into records or reports.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the secret to a signer.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Network selection, endpoint and signing identity.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
    /// Overrides the network's default API endpoint.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Principal that deploys (and therefore owns) every contract.
    #[serde(default)]
    pub deployer_address: String,
    #[serde(default)]
    pub credential: Credential,
}

impl NetworkConfig {
    pub fn new(network: Network, deployer_address: impl Into<String>, credential: Credential) -> Self {
        Self {
            network,
            api_url: None,
            deployer_address: deployer_address.into(),
            credential,
        }
    }

    /// Effective API endpoint without a trailing slash.
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_api_url())
            .trim_end_matches('/')
    }

    /// Checks the values needed before any network call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployer_address.trim().is_empty() {
            return Err(ConfigError::MissingDeployer);
        }
        if self.credential.is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        let url = self.api_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }
        Ok(())
    }
}
