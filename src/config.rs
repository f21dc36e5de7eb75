use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Largest accepted request body, uploads included
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// One messaging instance served by this process.
#[derive(Debug, Deserialize, Clone)]
pub struct InstanceConfig {
    pub name: String,
    /// Whether the instance can post media straight to newsletter channels
    #[serde(default)]
    pub channel_media: bool,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_body_limit() -> usize {
    64 * 1024 * 1024
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        body_limit_bytes: default_body_limit(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        let mut seen = std::collections::HashSet::new();
        for instance in &config.instances {
            if instance.name.trim().is_empty() {
                anyhow::bail!("Instance name must not be empty");
            }
            if !seen.insert(instance.name.as_str()) {
                anyhow::bail!("Duplicate instance name: {}", instance.name);
            }
        }

        Ok(config)
    }
}
