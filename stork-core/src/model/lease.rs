//! Lease lookup results (SUPPLEMENT): Kea's `lease4-get-by-*` /
//! `lease6-get-by-*` commands are forwarded live rather than cached, so
//! this type only models the shape of a single returned lease, not a
//! stored entity.

use serde::{Deserialize, Serialize};

use super::ids::{DaemonId, SubnetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    Default,
    Declined,
    Expired,
    Released,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub daemon_id: DaemonId,
    pub subnet_id: Option<SubnetId>,
    pub ip_address: String,
    pub hw_address: Option<String>,
    pub duid: Option<String>,
    pub hostname: Option<String>,
    pub state: LeaseState,
    pub cltt: chrono::DateTime<chrono::Utc>,
    pub valid_lifetime_seconds: u32,
}

impl Lease {
    pub fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.cltt + chrono::Duration::seconds(self.valid_lifetime_seconds as i64)
    }
}
