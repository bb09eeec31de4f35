//! Host reservations sourced from Kea's `host_cmds` hook
//! (`reservation-get-all`), layered on top of whatever the discovery
//! puller already found in the daemon's config file. Kept as a separate,
//! narrower puller because `host_cmds` is optional and typically backed
//! by a database the agent has no other access to — this is the only way
//! Stork ever learns about those reservations.

use std::collections::HashSet;
use std::time::Duration;

use stork_core::model::{AccessPointKind, DaemonId, DaemonName, HostDataSource, HostId};
use stork_core::puller::{PullError, Puller};
use stork_core::store::HostRepository;

use crate::db::PgStore;
use crate::settings::SharedSettings;

use super::client::AgentClientFactory;
use super::{kea, kea_config};

pub struct KeaHostsPuller {
    store: PgStore,
    clients: AgentClientFactory,
    settings: SharedSettings,
}

impl KeaHostsPuller {
    pub fn new(store: PgStore, clients: AgentClientFactory, settings: SharedSettings) -> Self {
        Self { store, clients, settings }
    }
}

fn kea_service_name(name: DaemonName) -> Option<&'static str> {
    match name {
        DaemonName::Dhcp4 => Some("dhcp4"),
        DaemonName::Dhcp6 => Some("dhcp6"),
        _ => None,
    }
}

impl Puller for KeaHostsPuller {
    fn name(&self) -> &'static str {
        "kea_hosts"
    }

    fn interval_setting_name(&self) -> &'static str {
        "kea_hosts_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").kea_hosts_interval()
    }

    fn pull(&self, daemon_id: DaemonId) -> Result<(), PullError> {
        let daemon = self
            .store
            .get_daemon(daemon_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "daemon not found".to_string()))?;
        let Some(service) = kea_service_name(daemon.name) else {
            return Ok(());
        };
        let app = self
            .store
            .get_app(daemon.app_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "app not found".to_string()))?;
        let Some(control) = app.access_points.iter().find(|ap| ap.kind == AccessPointKind::Control) else {
            return Ok(());
        };
        let scheme = if control.use_secure_protocol { "https" } else { "http" };
        let url = format!("{scheme}://{}:{}/", control.address, control.port);

        let mut client = self.clients.client_for(daemon_id)?;
        let mut store = self.store.clone();
        let mut kept: HashSet<HostId> = HashSet::new();

        for local_subnet in self.store.local_subnets_of_daemon(daemon_id) {
            let arguments = serde_json::json!({ "subnet-id": local_subnet.local_subnet_id });
            let result = kea::send_command(&self.store, &mut client, daemon_id, &url, "reservation-get-all", service, Some(arguments));
            let result = match result {
                Ok(r) => r,
                // host_cmds not loaded, or this subnet has no backend: skip
                // rather than fail the whole daemon's pull.
                Err(_) => continue,
            };
            if result.code != 0 {
                continue;
            }

            for host in kea_config::parse_host_cmds_reservations("", &result.arguments) {
                let host_id = store
                    .upsert_host(
                        Some(local_subnet.subnet_id),
                        &host.identifiers,
                        host.ip_reservations,
                        host.hostname,
                        HostDataSource::HostCmds,
                    )
                    .map_err(|e| PullError::BadResponse(daemon_id, e.to_string()))?;
                store
                    .upsert_local_host(host_id, daemon_id, HostDataSource::HostCmds, host.options)
                    .map_err(|e| PullError::BadResponse(daemon_id, e.to_string()))?;
                kept.insert(host_id);
            }
        }

        store.prune_local_hosts_by_source(daemon_id, HostDataSource::HostCmds, &kept);
        Ok(())
    }
}
