//! Shared networks and subnets: the prefix-addressed heart of the DHCP
//! model. A [`Subnet`] belongs to at most one [`SharedNetwork`] and is
//! monitored by one or more daemons through a [`LocalSubnet`] association.

use serde::{Deserialize, Serialize};

use super::ids::{DaemonId, SharedNetworkId, SubnetId};
use super::stats::SubnetStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    V4,
    V6,
}

/// Unique by `(name, family)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetwork {
    pub id: SharedNetworkId,
    pub name: String,
    pub family: Family,
}

/// A dynamic address range within a subnet. IPv4-only; IPv6 leasing instead
/// uses non-temporary-address and prefix-delegation pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPool {
    pub lower_bound: String,
    pub upper_bound: String,
}

/// An IPv6 prefix-delegation pool: `prefix/prefix_len` delegating
/// `/delegated_len` prefixes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixPool {
    pub prefix: String,
    pub prefix_len: u8,
    pub delegated_len: u8,
    pub excluded_prefix: Option<String>,
}

/// A DHCP subnet, keyed by CIDR prefix within a family. Optionally grouped
/// under a shared network; monitored by zero or more daemons via
/// [`LocalSubnet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub prefix: String,
    pub family: Family,
    pub shared_network_id: Option<SharedNetworkId>,
    pub address_pools: Vec<AddressPool>,
    pub prefix_pools: Vec<PrefixPool>,
}

/// The per-daemon view of a subnet: the association `(subnet_id,
/// daemon_id)`, carrying the daemon-local configuration and the last
/// fetched statistics for that daemon's copy of the subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSubnet {
    pub subnet_id: SubnetId,
    pub daemon_id: DaemonId,
    pub local_subnet_id: i32,
    pub config: serde_json::Value,
    pub stats: SubnetStats,
    pub stats_collected_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Subnet {
    pub fn has_shared_network(&self) -> bool {
        self.shared_network_id.is_some()
    }
}
