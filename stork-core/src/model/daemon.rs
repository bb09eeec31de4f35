use serde::{Deserialize, Serialize};

use super::ids::{AppId, DaemonId};

/// A logical process inside an app. Kea apps carry a subset of
/// `{dhcp4, dhcp6, d2, ca, netconf}`; BIND9 apps carry `named`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaemonName {
    Dhcp4,
    Dhcp6,
    D2,
    Ca,
    Netconf,
    Named,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Daemon {
    pub id: DaemonId,
    pub app_id: AppId,
    pub name: DaemonName,
    pub active: bool,
    /// Whether the user has opted to track this daemon's statistics. This
    /// flag is preserved across rediscoveries by the commit algorithm.
    pub monitored: bool,
    pub version: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub reloaded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub reload_count: u64,
    /// Opaque per-family configuration blob (Kea JSON or BIND9 config),
    /// carried as-is for the review engine to parse.
    pub config: serde_json::Value,
}

impl Daemon {
    pub fn is_dhcp(&self) -> bool {
        matches!(self.name, DaemonName::Dhcp4 | DaemonName::Dhcp6)
    }

    pub fn record_reload(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.reloaded_at = Some(at);
        self.reload_count += 1;
    }
}
