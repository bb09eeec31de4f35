//! High-availability status for Kea daemons running the `libdhcp_ha`
//! hook, read off `status-get`'s `high-availability` section. Runs far
//! more often than the other Kea pullers since a failover is exactly the
//! kind of state change operators want to see within seconds, not
//! minutes.

use std::time::Duration;

use chrono::Utc;
use stork_core::model::{AccessPointKind, DaemonId, DaemonName, HaRole, HaState, HaStatus};
use stork_core::puller::{PullError, Puller};

use crate::db::PgStore;
use crate::settings::SharedSettings;

use super::client::AgentClientFactory;
use super::kea;

pub struct HaStatusPuller {
    store: PgStore,
    clients: AgentClientFactory,
    settings: SharedSettings,
}

impl HaStatusPuller {
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

fn parse_role(value: &str) -> HaRole {
    match value {
        "secondary" | "standby-server" => HaRole::Secondary,
        "standby" => HaRole::Standby,
        "backup" => HaRole::Backup,
        _ => HaRole::Primary,
    }
}

fn parse_state(value: &str) -> HaState {
    match value {
        "hot-standby" => HaState::HotStandby,
        "partner-down" => HaState::Partnerdown,
        "communication-interrupted" => HaState::CommunicationInterrupted,
        "waiting-to-terminate" => HaState::WaitingToTerminate,
        "terminated" => HaState::Terminated,
        "unavailable" | "" => HaState::Unavailable,
        _ => HaState::LoadBalancing,
    }
}

/// Parses the first HA relationship out of `status-get`'s
/// `high-availability` array. A daemon can in principle run more than one
/// HA relationship (one per failover peering), but Stork — like the
/// server it's built on — only ever surfaces the first.
fn parse_ha_status(arguments: &serde_json::Value) -> Option<HaStatus> {
    let relationship = arguments.get("high-availability")?.as_array()?.first()?;
    let servers = relationship.get("ha-servers")?;
    let local = servers.get("local")?;
    let role = parse_role(local.get("role").and_then(|v| v.as_str()).unwrap_or("primary"));
    let state = parse_state(local.get("state").and_then(|v| v.as_str()).unwrap_or(""));
    let scopes = local
        .get("scopes")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let partner_state = servers
        .get("remote")
        .and_then(|remote| remote.get("last-state"))
        .and_then(|v| v.as_str())
        .map(parse_state);

    Some(HaStatus { role, state, partner_state, scopes, failover_time: None, heartbeat_at: Utc::now() })
}

impl Puller for HaStatusPuller {
    fn name(&self) -> &'static str {
        "ha_status"
    }

    fn interval_setting_name(&self) -> &'static str {
        "ha_status_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").ha_status_interval()
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
            return Ok(());
        }

        // No `high-availability` section at all means the hook isn't
        // loaded on this daemon — nothing to report, not a failure.
        if let Some(status) = parse_ha_status(&result.arguments) {
            self.store.upsert_ha_status(daemon_id, &status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primary_load_balancing_with_secondary_partner() {
        let arguments = serde_json::json!({
            "high-availability": [{
                "ha-mode": "load-balancing",
                "ha-servers": {
                    "local": {"role": "primary", "scopes": ["server1"], "state": "load-balancing"},
                    "remote": {"role": "secondary", "last-state": "load-balancing", "in-touch": true}
                }
            }]
        });
        let status = parse_ha_status(&arguments).unwrap();
        assert_eq!(status.role, HaRole::Primary);
        assert_eq!(status.state, HaState::LoadBalancing);
        assert_eq!(status.partner_state, Some(HaState::LoadBalancing));
        assert_eq!(status.scopes, vec!["server1".to_string()]);
    }

    #[test]
    fn missing_ha_section_parses_to_none() {
        let arguments = serde_json::json!({"pid": 123});
        assert!(parse_ha_status(&arguments).is_none());
    }
}
