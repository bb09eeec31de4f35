//! Refreshes one machine's detected app inventory: liveness, plus
//! whatever subnets and config-file reservations its Kea daemons report
//! right now. Runs the same discovery routine the authorize-machine REST
//! handler uses to seed a brand new machine, just on an interval instead
//! of once.

use std::time::Duration;

use stork_core::model::DaemonId;
use stork_core::puller::{PullError, Puller};

use crate::db::PgStore;
use crate::settings::SharedSettings;

use super::client::AgentClientFactory;
use super::discovery;

pub struct MachineStatePuller {
    store: PgStore,
    clients: AgentClientFactory,
    settings: SharedSettings,
}

impl MachineStatePuller {
    pub fn new(store: PgStore, clients: AgentClientFactory, settings: SharedSettings) -> Self {
        Self { store, clients, settings }
    }
}

impl Puller for MachineStatePuller {
    fn name(&self) -> &'static str {
        "machine_state"
    }

    fn interval_setting_name(&self) -> &'static str {
        "machine_state_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").machine_state_interval()
    }

    fn pull(&self, daemon_id: DaemonId) -> Result<(), PullError> {
        let daemon = self
            .store
            .get_daemon(daemon_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "daemon not found".to_string()))?;
        let app = self
            .store
            .get_app(daemon.app_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "app not found".to_string()))?;

        discovery::discover_machine(&self.store, &self.clients, app.machine_id)
    }
}
