//! Refreshes one daemon's liveness detail — version, uptime, last error,
//! reload count — at a finer interval than the full discovery pull, via
//! Kea's `status-get` (BIND9 daemons have no equivalent control command
//! and are left with whatever `machine_state` last recorded).

use std::time::Duration;

use stork_core::model::{AccessPointKind, DaemonId, DaemonName};
use stork_core::puller::{PullError, Puller};

use crate::db::PgStore;
use crate::settings::SharedSettings;

use super::client::AgentClientFactory;
use super::kea;

pub struct AppStatePuller {
    store: PgStore,
    clients: AgentClientFactory,
    settings: SharedSettings,
}

impl AppStatePuller {
    pub fn new(store: PgStore, clients: AgentClientFactory, settings: SharedSettings) -> Self {
        Self { store, clients, settings }
    }
}

fn kea_service_name(name: DaemonName) -> Option<&'static str> {
    match name {
        DaemonName::Dhcp4 => Some("dhcp4"),
        DaemonName::Dhcp6 => Some("dhcp6"),
        DaemonName::D2 => Some("d2"),
        _ => None,
    }
}

impl Puller for AppStatePuller {
    fn name(&self) -> &'static str {
        "app_state"
    }

    fn interval_setting_name(&self) -> &'static str {
        "app_state_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").app_state_interval()
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
        let result = kea::send_command(&self.store, &mut client, daemon_id, &url, "status-get", service, None)?;
        if result.code != 0 {
            // Daemon not currently running behind this control agent; leave
            // the last-known state in place rather than clearing it.
            return Ok(());
        }

        let version = result.arguments.get("extended-version").and_then(|v| v.as_str()).map(String::from);
        let uptime = result.arguments.get("uptime").and_then(|v| v.as_i64());
        // A shorter uptime than last sampled means the daemon restarted or
        // reloaded its config since the previous pull.
        let reloaded = match (uptime, daemon.uptime_seconds) {
            (Some(now), Some(prev)) => (now as u64) < prev,
            _ => false,
        };

        self.store.record_daemon_state(daemon_id, version.as_deref(), uptime, None, reloaded);
        Ok(())
    }
}
