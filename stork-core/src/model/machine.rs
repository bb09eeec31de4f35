use serde::{Deserialize, Serialize};

use super::ids::MachineId;

/// A managed host. `(address, agent_port)` uniquely identifies a live
/// machine; duplicates are rejected at the reconciliation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub address: String,
    pub agent_port: u16,
    pub authorized: bool,
    pub last_contact_error: Option<String>,
    pub agent_token_fingerprint: Option<String>,
}

impl Machine {
    /// A newly agent-registered machine: pending, not yet authorized.
    pub fn pending(id: MachineId, address: String, agent_port: u16) -> Self {
        Self {
            id,
            address,
            agent_port,
            authorized: false,
            last_contact_error: None,
            agent_token_fingerprint: None,
        }
    }

    pub fn identity(&self) -> (&str, u16) {
        (&self.address, self.agent_port)
    }
}
