//! Loads the PEM material the `cert` admin tool exported into
//! `tonic::transport::{ServerTlsConfig, ClientTlsConfig}`.

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

/// The agent's own TLS identity plus the server CA it trusts, for the
/// gRPC server the agent hosts.
pub fn server_tls_config(
    cert_pem: &Path,
    key_pem: &Path,
    client_ca_pem: &Path,
) -> Result<ServerTlsConfig, TlsConfigError> {
    let identity = Identity::from_pem(read(cert_pem)?, read(key_pem)?);
    let client_ca = Certificate::from_pem(read(client_ca_pem)?);
    Ok(ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(client_ca))
}

/// The agent's identity plus the server CA it trusts, for the outbound
/// channel the agent opens to the server's `Registration` service.
pub fn client_tls_config(
    cert_pem: &Path,
    key_pem: &Path,
    server_ca_pem: &Path,
) -> Result<ClientTlsConfig, TlsConfigError> {
    let identity = Identity::from_pem(read(cert_pem)?, read(key_pem)?);
    let server_ca = Certificate::from_pem(read(server_ca_pem)?);
    Ok(ClientTlsConfig::new()
        .identity(identity)
        .ca_certificate(server_ca))
}
