/// Configuration management for the SMP resolver
use crate::error::{SmpError, SmpResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;

/// Default SML zone operated by the European Commission
pub const DEFAULT_SML_DOMAIN: &str = "edelivery.tech.ec.europa.eu";

/// Default per-request timeout for main SMP fetches, in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

/// Resolver configuration, immutable after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Root SML zone used to build the NAPTR query name
    pub sml_domain: String,

    /// Recursive DNS servers to query; empty means system resolvers
    pub dns_servers: Vec<IpAddr>,

    /// Per-request timeout in milliseconds for main HTTP fetches
    pub http_timeout_ms: u64,

    /// Reserved for future use; the in-memory caches have no TTL
    pub cache_ttl_secs: u64,

    /// User-Agent header for HTTP requests
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sml_domain: DEFAULT_SML_DOMAIN.to_string(),
            dns_servers: Vec::new(),
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            cache_ttl_secs: 0,
            user_agent: format!("smp-resolver-ng/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SmpResult<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let sml_domain =
            env::var("SMP_SML_DOMAIN").unwrap_or_else(|_| defaults.sml_domain.clone());

        let dns_servers = match env::var("SMP_DNS_SERVERS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>().map_err(|_| {
                        SmpError::Config(format!("Invalid DNS server address: {}", s))
                    })
                })
                .collect::<SmpResult<Vec<IpAddr>>>()?,
            Err(_) => Vec::new(),
        };

        let http_timeout_ms = env::var("SMP_HTTP_TIMEOUT_MS")
            .unwrap_or_else(|_| defaults.http_timeout_ms.to_string())
            .parse()
            .map_err(|_| SmpError::Config("Invalid SMP_HTTP_TIMEOUT_MS value".to_string()))?;

        let cache_ttl_secs = env::var("SMP_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        let user_agent =
            env::var("SMP_USER_AGENT").unwrap_or_else(|_| defaults.user_agent.clone());

        let config = Self {
            sml_domain,
            dns_servers,
            http_timeout_ms,
            cache_ttl_secs,
            user_agent,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> SmpResult<()> {
        if self.sml_domain.is_empty() {
            return Err(SmpError::Config("SML domain cannot be empty".to_string()));
        }

        if self.http_timeout_ms == 0 {
            return Err(SmpError::Config(
                "HTTP timeout must be greater than zero".to_string(),
            ));
        }

        if self.user_agent.is_empty() {
            return Err(SmpError::Config("User-Agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.sml_domain, DEFAULT_SML_DOMAIN);
        assert!(config.dns_servers.is_empty());
        assert_eq!(config.http_timeout_ms, DEFAULT_HTTP_TIMEOUT_MS);
        assert!(config.user_agent.starts_with("smp-resolver-ng/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_sml_domain() {
        let config = ResolverConfig {
            sml_domain: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ResolverConfig {
            http_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
