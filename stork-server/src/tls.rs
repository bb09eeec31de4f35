//! Loads the PEM material the `cert` admin tool exported into
//! `tonic::transport::{ServerTlsConfig, ClientTlsConfig}`, mirroring the
//! agent's own loader: the server plays both roles, hosting
//! `Registration` for agents and calling out to each agent's
//! `AgentService`.

use std::path::Path;

use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

#[derive(Error, Debug)]
pub enum TlsConfigError {
    #[error("could not read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn read(path: &Path) -> Result<Vec<u8>, TlsConfigError> {
    std::fs::read(path).map_err(|source| TlsConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })
}

/// The server's identity plus the agent CA it trusts, for the
/// `Registration` service it hosts.
pub fn server_tls_config(cert_pem: &Path, key_pem: &Path, agent_ca_pem: &Path) -> Result<ServerTlsConfig, TlsConfigError> {
    let identity = Identity::from_pem(read(cert_pem)?, read(key_pem)?);
    let agent_ca = Certificate::from_pem(read(agent_ca_pem)?);
    Ok(ServerTlsConfig::new().identity(identity).client_ca_root(agent_ca))
}

/// The server's identity plus an agent's self-signed certificate, for the
/// outbound channel a puller opens to that agent's `AgentService`.
pub fn client_tls_config(cert_pem: &Path, key_pem: &Path, agent_cert_pem: &[u8]) -> Result<ClientTlsConfig, TlsConfigError> {
    let identity = Identity::from_pem(read(cert_pem)?, read(key_pem)?);
    let agent_ca = Certificate::from_pem(agent_cert_pem);
    Ok(ClientTlsConfig::new().identity(identity).ca_certificate(agent_ca))
}
