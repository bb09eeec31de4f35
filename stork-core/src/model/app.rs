use serde::{Deserialize, Serialize};

use super::ids::{AppId, MachineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppKind {
    Kea,
    Bind9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPointKind {
    Control,
    Statistics,
}

/// `(type, address, port, key?)` tuple at which a daemon accepts control
/// commands. The `(address, port)` of an access point is the stable
/// identity used by app reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub kind: AccessPointKind,
    pub address: String,
    pub port: u16,
    pub key: Option<String>,
    pub use_secure_protocol: bool,
}

/// A service instance hosted on a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub machine_id: MachineId,
    pub kind: AppKind,
    pub access_points: Vec<AccessPoint>,
}

impl App {
    /// The access point reconciliation keys apps by: the first control
    /// access point, since every Kea/BIND9 app has exactly one.
    pub fn control_access_point(&self) -> Option<&AccessPoint> {
        self.access_points
            .iter()
            .find(|ap| ap.kind == AccessPointKind::Control)
    }
}
