//! High-availability status (SUPPLEMENT): the `ha-relationship` scrape a
//! Kea DHCP daemon exposes when its `libdhcp_ha` hook is loaded. Tracked
//! per [`crate::model::daemon::Daemon`] rather than modeled as a relation
//! between daemons, since each side only ever reports its own view of the
//! partner.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaRole {
    Primary,
    Secondary,
    Standby,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaState {
    LoadBalancing,
    HotStandby,
    Partnerdown,
    CommunicationInterrupted,
    WaitingToTerminate,
    Terminated,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaStatus {
    pub role: HaRole,
    pub state: HaState,
    pub partner_state: Option<HaState>,
    pub scopes: Vec<String>,
    pub failover_time: Option<chrono::DateTime<chrono::Utc>>,
    pub heartbeat_at: chrono::DateTime<chrono::Utc>,
}

impl HaStatus {
    /// Whether this side considers itself actively serving traffic.
    pub fn is_serving(&self) -> bool {
        matches!(
            self.state,
            HaState::LoadBalancing | HaState::HotStandby | HaState::Partnerdown
        )
    }
}
