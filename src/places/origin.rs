//! Origin derivation from page URLs

use url::Url;

use crate::utils::{PlacesError, Result};

/// The `(prefix, host)` pair identifying an origin row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginKey {
    /// Scheme plus separator, e.g. `https://` or `about:`
    pub prefix: String,
    /// Host with port, empty for URLs without an authority
    pub host: String,
}

impl OriginKey {
    /// Parse a page URL and derive its origin
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| PlacesError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.host_str() {
            Some(host) => {
                let host = match parsed.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                Ok(Self {
                    prefix: format!("{}://", parsed.scheme()),
                    host,
                })
            }
            None => Ok(Self {
                prefix: format!("{}:", parsed.scheme()),
                host: String::new(),
            }),
        }
    }
}
