//! ---
//! hmc_section: "04-configuration"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "TOML-backed configuration for the backend daemon."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
#![warn(missing_docs)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Network settings consumed by the connection server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Host the connection server binds. Loopback by default: remote
    /// frontends on other machines are an explicit operator decision.
    #[serde(default = "NetworkConfig::default_host")]
    pub host: String,
    /// Port the connection server binds.
    #[serde(default = "NetworkConfig::default_port")]
    pub port: u16,
}

impl NetworkConfig {
    fn default_host() -> String {
        "127.0.0.1".to_owned()
    }

    const fn default_port() -> u16 {
        55545
    }

    /// Resolve the effective listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Cadence of the periodic media cache maintenance messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds between scheduled cache rebuild messages.
    #[serde(default = "CacheConfig::default_rebuild_interval_secs")]
    pub rebuild_interval_secs: u64,
}

impl CacheConfig {
    const fn default_rebuild_interval_secs() -> u64 {
        3600
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rebuild_interval_secs: Self::default_rebuild_interval_secs(),
        }
    }
}

/// Root configuration of the backend daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Connection server settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Media cache scheduling settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl BackendConfig {
    /// Environment variable overriding the configuration path.
    pub const ENV_CONFIG_PATH: &'static str = "HMC_CONFIG";

    /// Load configuration from the first existing candidate path,
    /// respecting the `HMC_CONFIG` override. When nothing exists the
    /// built-in defaults are returned.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(Self::default())
    }

    /// Load configuration from a concrete path.
    pub fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<BackendConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.network.port == 0 {
            return Err(anyhow!("network.port must not be zero"));
        }
        if self.cache.rebuild_interval_secs == 0 {
            return Err(anyhow!("cache.rebuild_interval_secs must not be zero"));
        }
        Ok(())
    }
}
