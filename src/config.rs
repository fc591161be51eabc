//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Statement tracking and provisioning knobs
#[derive(Debug, Clone)]
pub struct MaskingConfig {
    /// Fixed delay between two status checks of a submitted statement
    pub poll_interval: Duration,
    /// Wait budget per statement, measured from submission
    pub max_wait: Duration,
    pub default_schema: String,
    /// Consult the warehouse policy catalog and skip identical policies
    pub skip_existing: bool,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(30),
            default_schema: "public".to_string(),
            skip_existing: true,
        }
    }
}

/// A warehouse cluster registered at startup
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub identifier: String,
    pub connection_string: String,
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub masking: MaskingConfig,
    pub clusters: Vec<ClusterConfig>,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let defaults = MaskingConfig::default();
        let masking = MaskingConfig {
            poll_interval: std::env::var("MASKING_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_wait: std::env::var("MASKING_MAX_WAIT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_wait),
            default_schema: std::env::var("MASKING_DEFAULT_SCHEMA")
                .unwrap_or(defaults.default_schema),
            skip_existing: std::env::var("MASKING_SKIP_EXISTING")
                .ok()
                .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.skip_existing),
        };

        if masking.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "MASKING_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let clusters = match std::env::var("CLUSTERS") {
            Ok(raw) => Self::parse_clusters(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            server,
            cors,
            masking,
            clusters,
        })
    }

    /// Parse `id=postgres://...;id2=postgres://...`
    fn parse_clusters(raw: &str) -> Result<Vec<ClusterConfig>, ConfigError> {
        raw.split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (identifier, connection_string) = entry.split_once('=').ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "Invalid CLUSTERS entry '{}' (expected id=postgres://...)",
                        entry
                    ))
                })?;
                if identifier.trim().is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "Cluster identifier cannot be empty".to_string(),
                    ));
                }
                Ok(ClusterConfig {
                    identifier: identifier.trim().to_string(),
                    connection_string: connection_string.trim().to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_masking_config() {
        let config = MaskingConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_wait, Duration::from_secs(30));
        assert_eq!(config.default_schema, "public");
        assert!(config.skip_existing);
    }

    #[test]
    fn test_parse_clusters() {
        let clusters = Settings::parse_clusters(
            "analytics=postgres://u:p@host:5439/dev; reporting = postgres://u:p@other/dw;",
        )
        .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].identifier, "analytics");
        assert_eq!(clusters[0].connection_string, "postgres://u:p@host:5439/dev");
        assert_eq!(clusters[1].identifier, "reporting");
    }

    #[test]
    fn test_parse_clusters_rejects_missing_separator() {
        assert!(Settings::parse_clusters("postgres://u:p@host/dev").is_err());
        assert!(Settings::parse_clusters("=postgres://u:p@host/dev").is_err());
    }
}
