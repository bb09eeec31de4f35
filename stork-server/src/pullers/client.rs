//! Builds a short-lived mTLS channel to a daemon's agent for a single
//! puller call. Connections are not pooled: puller ticks are minutes
//! apart, far below the cost of a fresh TLS handshake, and a short-lived
//! channel means a dead agent is reflected on the very next tick rather
//! than through a stale pooled connection.

use std::path::PathBuf;
use std::time::Duration;

use stork_core::model::{DaemonId, MachineId};
use stork_core::puller::PullError;
use stork_proto::AgentServiceClient;
use tonic::transport::{Channel, Endpoint};

use crate::db::PgStore;
use crate::tls;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AgentClientFactory {
    store: PgStore,
    cert_pem: PathBuf,
    key_pem: PathBuf,
}

impl AgentClientFactory {
    pub fn new(store: PgStore, cert_dir: PathBuf) -> Self {
        Self {
            store,
            cert_pem: cert_dir.join("server-cert.pem"),
            key_pem: cert_dir.join("server-key.pem"),
        }
    }

    /// Resolves `daemon_id` to its app's control access point and machine,
    /// then dials that agent. The agent's own certificate, fingerprinted at
    /// registration time, is the CA this channel trusts — there is no
    /// shared agent CA to fall back to.
    pub fn client_for(&self, daemon_id: DaemonId) -> Result<AgentServiceClient<Channel>, PullError> {
        let daemon = self
            .store
            .get_daemon(daemon_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "daemon not found".to_string()))?;
        let app = self
            .store
            .get_app(daemon.app_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "app not found".to_string()))?;
        self.dial(app.machine_id, daemon_id)
    }

    /// Dials a machine directly, for the discovery path that runs before
    /// any daemon exists yet (so there is no [`DaemonId`] to resolve
    /// through). `for_daemon` is only used to label errors consistently
    /// with [`Self::client_for`]; pass the machine's own placeholder id's
    /// first daemon once one exists, or any sentinel otherwise.
    pub fn client_for_machine(&self, machine_id: MachineId, for_daemon: DaemonId) -> Result<AgentServiceClient<Channel>, PullError> {
        self.dial(machine_id, for_daemon)
    }

    fn dial(&self, machine_id: MachineId, daemon_id: DaemonId) -> Result<AgentServiceClient<Channel>, PullError> {
        let machine = self
            .store
            .get_machine(machine_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "machine not found".to_string()))?;

        let agent_cert_pem = self
            .store
            .get_agent_certificate(machine_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "no agent certificate on file".to_string()))?;

        let tls = tls::client_tls_config(&self.cert_pem, &self.key_pem, agent_cert_pem.as_bytes())
            .map_err(|e| PullError::Unreachable(daemon_id, e.to_string()))?;

        let endpoint = Endpoint::from_shared(format!("https://{}:{}", machine.address, machine.agent_port))
            .map_err(|e| PullError::Unreachable(daemon_id, e.to_string()))?
            .tls_config(tls)
            .map_err(|e| PullError::Unreachable(daemon_id, e.to_string()))?
            .timeout(RPC_TIMEOUT);

        let channel = self
            .store
            .block_on(endpoint.connect())
            .map_err(|e| PullError::Unreachable(daemon_id, e.to_string()))?;

        Ok(AgentServiceClient::new(channel))
    }
}
