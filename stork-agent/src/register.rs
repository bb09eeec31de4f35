//! Agent enrollment: on first boot the agent generates a persistent token,
//! then submits (and retries, idempotently, on every subsequent boot) a
//! registration request to the server over TLS.

use std::path::{Path, PathBuf};

use fs::file::reader::FileReader;
use fs::file::writer::FileWriter;
use fs::file::LocalFile;
use stork_proto::agent::RegisterRequest;
use stork_proto::RegistrationClient;
use thiserror::Error;
use tonic::transport::Channel;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("could not read or create agent token at {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read agent certificate at {path}: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not connect to server at {0}: {1}")]
    Connect(String, tonic::transport::Error),
    #[error("registration request to {0} failed: {1}")]
    Rpc(String, tonic::Status),
}

/// Loads the agent's persistent enrollment token from `token_path`,
/// generating and saving a new one if none exists yet. A fresh token is
/// generated at most once per agent installation.
pub fn load_or_create_token(token_path: &Path) -> Result<String, RegisterError> {
    let local_file = LocalFile;
    if token_path.exists() {
        return local_file
            .read(token_path)
            .map(|s| s.trim().to_string())
            .map_err(|source| RegisterError::Token {
                path: token_path.to_path_buf(),
                source,
            });
    }

    let token = Uuid::new_v4().to_string();
    local_file
        .write(token_path, token.clone())
        .map_err(|e| RegisterError::Token {
            path: token_path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?;
    Ok(token)
}

pub struct RegisterOutcome {
    pub machine_id: i64,
    pub authorized: bool,
    pub server_ca_pem: String,
}

/// Submits (or re-submits) the agent's registration request. Idempotent:
/// calling this again before authorization, or again after a restart, is
/// not an error — the server matches on `(address, agent_port)`.
pub async fn register(
    server_url: &str,
    hostname: &str,
    address: &str,
    agent_port: u16,
    certificate_path: &Path,
    agent_version: &str,
) -> Result<RegisterOutcome, RegisterError> {
    let local_file = LocalFile;
    let certificate_pem =
        local_file
            .read(certificate_path)
            .map_err(|source| RegisterError::Certificate {
                path: certificate_path.to_path_buf(),
                source,
            })?;

    let channel = Channel::from_shared(server_url.to_string())
        .map_err(|e| RegisterError::Connect(server_url.to_string(), e.into()))?
        .connect()
        .await
        .map_err(|e| RegisterError::Connect(server_url.to_string(), e))?;

    let mut client = RegistrationClient::new(channel);
    let response = client
        .register(RegisterRequest {
            agent_version: agent_version.to_string(),
            hostname: hostname.to_string(),
            address: address.to_string(),
            agent_port: agent_port as u32,
            certificate_pem,
        })
        .await
        .map_err(|status| RegisterError::Rpc(server_url.to_string(), status))?
        .into_inner();

    Ok(RegisterOutcome {
        machine_id: response.machine_id,
        authorized: response.authorized,
        server_ca_pem: response.server_ca_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_a_token_once_and_reuses_it_on_subsequent_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent-token");

        let first = load_or_create_token(&path).unwrap();
        let second = load_or_create_token(&path).unwrap();
        assert_eq!(first, second);
    }
}
