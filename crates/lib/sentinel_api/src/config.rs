//! API server configuration.

use std::fmt;

use sentinel_core::config::AuthConfig;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Keys accepted in `X-API-Key` by the introspection endpoint.
    pub introspection_api_keys: Vec<String>,
    /// Take the client address from the first `X-Forwarded-For` hop.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub auth: AuthConfig,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("introspection_api_keys", &self.introspection_api_keys.len())
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Comma-separated list, blanks dropped.
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_are_trimmed_and_blanks_dropped() {
        assert_eq!(parse_api_keys(" a, ,b ,"), vec!["a", "b"]);
        assert!(parse_api_keys("").is_empty());
    }
}
