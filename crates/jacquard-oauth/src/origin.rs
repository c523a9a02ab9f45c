//! Origin URL normalization, used for DPoP nonce scoping and issuer comparisons.

use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("url parse error: {0}")]
    Parse(#[from] url::ParseError),
    #[error("url has no host")]
    NoHost,
    #[error("url scheme must be http or https")]
    UnsupportedScheme,
}

pub type Result<T> = core::result::Result<T, Error>;

/// A scheme+host+port origin, normalized so that default ports and trailing
/// path/query/fragment are stripped before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginUrl(SmolStr);

impl OriginUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::UnsupportedScheme);
        }
        let host = url.host_str().ok_or(Error::NoHost)?;
        let port = url.port_or_known_default();
        let origin = match port {
            Some(port) => smol_str::format_smolstr!("{}://{}:{}", url.scheme(), host, port),
            None => smol_str::format_smolstr!("{}://{}", url.scheme(), host),
        };
        Ok(Self(origin))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for OriginUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OriginUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_are_equivalent() {
        let a = OriginUrl::parse("https://example.com/foo?bar").unwrap();
        let b = OriginUrl::parse("https://example.com:443/baz").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_ports_differ() {
        let a = OriginUrl::parse("https://example.com").unwrap();
        let b = OriginUrl::parse("https://example.com:8443").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(OriginUrl::parse("ftp://example.com").is_err());
    }
}
