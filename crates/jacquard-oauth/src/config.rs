//! Client-wide configuration, built once and treated as immutable thereafter.
//!
//! Builder pattern grounded in `jacquard-identity`'s `ResolverOptions`.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use thiserror::Error;
use url::Url;

use crate::storage::{MemoryStorage, Storage};

#[derive(Debug, Error)]
pub enum Error {
    #[error("master_key must be exactly 32 bytes, got {0}")]
    InvalidMasterKeyLen(usize),
    #[error("plc_directory must be a valid URL: {0}")]
    InvalidPlcDirectory(#[source] url::ParseError),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Exponential-backoff budget for token refresh retries (§4.10).
#[derive(Debug, Clone, Copy, Builder)]
#[builder(start_fn = new)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
            .max_retries(3)
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(8))
            .build()
    }
}

/// Client-wide configuration. Construct via the builder, then call
/// [`ClientConfigBuilder::build_checked`] (or `.build()` plus [`ClientConfig::validate`])
/// to catch misconfiguration early rather than at first use.
#[derive(Clone, Builder)]
#[builder(start_fn = new)]
pub struct ClientConfig {
    /// 32-byte root key for the at-rest [`crate::crypto::EncryptionService`].
    pub master_key: [u8; 32],
    #[builder(default = Arc::new(MemoryStorage::new()))]
    pub storage: Arc<dyn Storage>,
    #[builder(default = Duration::from_secs(300))]
    pub default_token_lifetime: Duration,
    #[builder(default = Duration::from_secs(300))]
    pub dpop_nonce_lifetime: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub http_timeout: Duration,
    #[builder(default = Url::parse("https://plc.directory").unwrap())]
    pub plc_directory: Url,
    #[builder(default = RetryPolicy::default())]
    pub refresh_retry: RetryPolicy,
}

impl ClientConfig {
    /// Validate invariants that the builder's type system can't express.
    pub fn validate(&self) -> Result<()> {
        if self.plc_directory.scheme() != "https" {
            return Err(Error::InvalidPlcDirectory(
                Url::parse("not-https://").unwrap_err(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("master_key", &"<redacted>")
            .field("default_token_lifetime", &self.default_token_lifetime)
            .field("dpop_nonce_lifetime", &self.dpop_nonce_lifetime)
            .field("http_timeout", &self.http_timeout)
            .field("plc_directory", &self.plc_directory)
            .field("refresh_retry", &(
                self.refresh_retry.max_retries,
                self.refresh_retry.base_delay,
                self.refresh_retry.max_delay,
            ))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ClientConfig::new([0u8; 32]).build();
        assert_eq!(config.default_token_lifetime, Duration::from_secs(300));
        assert_eq!(config.plc_directory.as_str(), "https://plc.directory/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_master_key() {
        let config = ClientConfig::new([1u8; 32]).build();
        assert!(!format!("{config:?}").contains('\u{1}'.to_string().as_str()));
    }
}
