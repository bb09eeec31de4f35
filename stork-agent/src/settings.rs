//! Layered agent configuration: built-in defaults, overridden by an
//! optional YAML file, overridden by `STORK_AGENT_*` environment
//! variables, mirroring the server's settings loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stork_core::telemetry::LoggingConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not load agent settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentSettings {
    /// Address the agent's own gRPC server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    /// `server:port` the agent registers against.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_agent_port() -> u16 {
    8080
}

fn default_server_url() -> String {
    "https://localhost:8533".to_string()
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("/etc/stork/certs")
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("/etc/stork/agent-credentials.json")
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            agent_port: default_agent_port(),
            server_url: default_server_url(),
            cert_dir: default_cert_dir(),
            credentials_file: default_credentials_file(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentSettings {
    /// Layers `config_file` (if it exists) over built-in defaults, then
    /// applies `STORK_AGENT_*` environment overrides (`STORK_AGENT_AGENT_PORT`
    /// maps to `agent_port`, and so on).
    pub fn load(config_file: Option<&PathBuf>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AgentSettings::default())?);

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path.as_path()).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("STORK_AGENT").separator("_"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let settings = AgentSettings::load(None).unwrap();
        assert_eq!(settings.agent_port, 8080);
    }
}
