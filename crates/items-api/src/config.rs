use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use items_core::ConfigError;

use crate::timeout::{DEFAULT_TIMEOUT, bounded_timeout};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Where tables live while the gateway runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    DynamoDb,
}

/// Gateway settings, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub request_timeout: Duration,
    pub backend: Backend,
    /// Topology description to apply; the built-in items service if unset.
    pub topology_path: Option<PathBuf>,
    /// Deployment record read before and written after applying.
    pub state_file: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("ITEMS_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse().map_err(|e| ConfigError::Invalid {
            name: "ITEMS_BIND_ADDR",
            reason: format!("{bind_addr}: {e}"),
        })?;

        let request_timeout = match lookup("ITEMS_REQUEST_TIMEOUT") {
            Some(raw) => bounded_timeout(&raw).map_err(|reason| ConfigError::Invalid {
                name: "ITEMS_REQUEST_TIMEOUT",
                reason,
            })?,
            None => DEFAULT_TIMEOUT,
        };

        let backend = match lookup("ITEMS_BACKEND").as_deref() {
            None | Some("memory") => Backend::Memory,
            Some("dynamodb") => Backend::DynamoDb,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "ITEMS_BACKEND",
                    reason: format!("expected `memory` or `dynamodb`, got `{other}`"),
                });
            }
        };

        Ok(Self {
            bind_addr,
            request_timeout,
            backend,
            topology_path: lookup("ITEMS_TOPOLOGY").map(PathBuf::from),
            state_file: lookup("ITEMS_STATE_FILE").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let env: HashMap<&str, &str> = vars.iter().copied().collect();
        GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.request_timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.topology_path, None);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("ITEMS_BIND_ADDR", "127.0.0.1:8080"),
            ("ITEMS_REQUEST_TIMEOUT", "10s"),
            ("ITEMS_BACKEND", "dynamodb"),
            ("ITEMS_STATE_FILE", "deploy.json"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.backend, Backend::DynamoDb);
        assert_eq!(config.state_file, Some(PathBuf::from("deploy.json")));
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        assert!(config(&[("ITEMS_REQUEST_TIMEOUT", "500ms")]).is_err());
        assert!(config(&[("ITEMS_REQUEST_TIMEOUT", "1h")]).is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(matches!(
            config(&[("ITEMS_BACKEND", "postgres")]),
            Err(ConfigError::Invalid { name: "ITEMS_BACKEND", .. })
        ));
    }
}
