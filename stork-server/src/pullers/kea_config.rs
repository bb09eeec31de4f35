//! Parses the handful of shapes the discovery puller cares about out of a
//! Kea `config-get`/`reservation-get-all` response: subnets, pools and
//! host reservations. Deliberately narrow — daemons carry far more
//! configuration than this, but only what feeds the inventory model and
//! the review engine is extracted; the rest rides along unparsed in
//! [`stork_core::model::Daemon::config`].

use stork_core::model::{
    AddressPool, DaemonName, Family, HostDataSource, HostIdentifier, IdentifierKind, IpReservation, PrefixPool,
};
use stork_core::reconcile::{ReportedHost, ReportedSubnet};

/// The top-level key `config-get` nests a daemon's settings under.
fn daemon_config_key(name: DaemonName) -> Option<&'static str> {
    match name {
        DaemonName::Dhcp4 => Some("Dhcp4"),
        DaemonName::Dhcp6 => Some("Dhcp6"),
        DaemonName::D2 => Some("DhcpDdns"),
        DaemonName::Ca => Some("Control-agent"),
        DaemonName::Netconf => Some("Netconf"),
        DaemonName::Named => None,
    }
}

/// Unwraps `{"Dhcp4": {...}}` down to the daemon's own settings object, or
/// the whole value if it is already unwrapped (some agents may forward
/// the daemon section directly).
pub fn daemon_settings(name: DaemonName, config_get_arguments: &serde_json::Value) -> serde_json::Value {
    match daemon_config_key(name).and_then(|key| config_get_arguments.get(key)) {
        Some(v) => v.clone(),
        None => config_get_arguments.clone(),
    }
}

/// Extracts every `subnet4`/`subnet6` entry, including pools and the
/// shared-network name the subnet is nested under, if any.
pub fn parse_subnets(name: DaemonName, settings: &serde_json::Value) -> Vec<ReportedSubnet> {
    let (family, subnet_key) = match name {
        DaemonName::Dhcp4 => (Family::V4, "subnet4"),
        DaemonName::Dhcp6 => (Family::V6, "subnet6"),
        _ => return vec![],
    };

    let mut subnets = Vec::new();

    // Top-level subnets (not inside a shared network).
    if let Some(array) = settings.get(subnet_key).and_then(|v| v.as_array()) {
        for entry in array {
            if let Some(subnet) = parse_one_subnet(family, entry, None) {
                subnets.push(subnet);
            }
        }
    }

    // Subnets nested under a shared network.
    if let Some(networks) = settings.get("shared-networks").and_then(|v| v.as_array()) {
        for network in networks {
            let Some(sn_name) = network.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(array) = network.get(subnet_key).and_then(|v| v.as_array()) {
                for entry in array {
                    if let Some(subnet) = parse_one_subnet(family, entry, Some(sn_name.to_string())) {
                        subnets.push(subnet);
                    }
                }
            }
        }
    }

    subnets
}

fn parse_one_subnet(family: Family, entry: &serde_json::Value, shared_network_name: Option<String>) -> Option<ReportedSubnet> {
    let prefix = entry.get("subnet")?.as_str()?.to_string();
    let local_subnet_id = entry.get("id")?.as_i64()? as i32;
    let shared_network_name = shared_network_name.or_else(|| entry.get("shared-network-name").and_then(|v| v.as_str()).map(String::from));

    let address_pools = entry
        .get("pools")
        .and_then(|v| v.as_array())
        .map(|pools| pools.iter().filter_map(parse_address_pool).collect())
        .unwrap_or_default();

    let prefix_pools = entry
        .get("pd-pools")
        .and_then(|v| v.as_array())
        .map(|pools| pools.iter().filter_map(parse_prefix_pool).collect())
        .unwrap_or_default();

    Some(ReportedSubnet {
        prefix,
        family,
        shared_network_name,
        address_pools,
        prefix_pools,
        local_subnet_id,
    })
}

fn parse_address_pool(entry: &serde_json::Value) -> Option<AddressPool> {
    let range = entry.get("pool")?.as_str()?;
    let (lower, upper) = range.split_once('-').unwrap_or((range, range));
    Some(AddressPool {
        lower_bound: lower.trim().to_string(),
        upper_bound: upper.trim().to_string(),
    })
}

fn parse_prefix_pool(entry: &serde_json::Value) -> Option<PrefixPool> {
    Some(PrefixPool {
        prefix: entry.get("prefix")?.as_str()?.to_string(),
        prefix_len: entry.get("prefix-len")?.as_u64()? as u8,
        delegated_len: entry.get("delegated-len")?.as_u64()? as u8,
        excluded_prefix: entry.get("excluded-prefix").and_then(|v| v.as_str()).map(String::from),
    })
}

/// Collects every reservation in `settings`: subnet-scoped ones (nested
/// under each `subnet4`/`subnet6` entry's own `reservations`) and global
/// ones (the daemon-level `reservations` array, valid for DHCPv4 only).
pub fn parse_config_file_reservations(name: DaemonName, settings: &serde_json::Value) -> Vec<ReportedHost> {
    let subnet_key = match name {
        DaemonName::Dhcp4 => "subnet4",
        DaemonName::Dhcp6 => "subnet6",
        _ => return vec![],
    };

    let mut hosts = Vec::new();

    if let Some(array) = settings.get(subnet_key).and_then(|v| v.as_array()) {
        for entry in array {
            let Some(prefix) = entry.get("subnet").and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(reservations) = entry.get("reservations").and_then(|v| v.as_array()) {
                for r in reservations {
                    if let Some(host) = parse_one_reservation(r, Some(prefix.to_string())) {
                        hosts.push(host);
                    }
                }
            }
        }
    }

    if let Some(global) = settings.get("reservations").and_then(|v| v.as_array()) {
        for r in global {
            if let Some(host) = parse_one_reservation(r, None) {
                hosts.push(host);
            }
        }
    }

    hosts
}

/// Parses the entries of a `reservation-get-all` response: the same
/// per-reservation shape as a config-file reservation, just returned by
/// `host_cmds` instead of embedded in the config.
pub fn parse_host_cmds_reservations(subnet_prefix: &str, arguments: &serde_json::Value) -> Vec<ReportedHost> {
    arguments
        .get("hosts")
        .and_then(|v| v.as_array())
        .map(|hosts| {
            hosts
                .iter()
                .filter_map(|h| parse_one_reservation(h, Some(subnet_prefix.to_string())))
                .map(|mut host| {
                    host.data_source = HostDataSource::HostCmds;
                    host
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_one_reservation(entry: &serde_json::Value, subnet_prefix: Option<String>) -> Option<ReportedHost> {
    let mut identifiers = Vec::new();
    for (key, kind) in [
        ("hw-address", IdentifierKind::HwAddress),
        ("duid", IdentifierKind::Duid),
        ("circuit-id", IdentifierKind::CircuitId),
        ("client-id", IdentifierKind::ClientId),
        ("flex-id", IdentifierKind::Flex),
    ] {
        if let Some(value) = entry.get(key).and_then(|v| v.as_str()) {
            identifiers.push(HostIdentifier {
                kind,
                value_hex: normalize_hex(value),
            });
        }
    }
    if identifiers.is_empty() {
        return None;
    }

    let mut ip_reservations = Vec::new();
    if let Some(addr) = entry.get("ip-address").and_then(|v| v.as_str()) {
        ip_reservations.push(IpReservation { address: addr.to_string(), prefix_len: None });
    }
    if let Some(addrs) = entry.get("ip-addresses").and_then(|v| v.as_array()) {
        for a in addrs {
            if let Some(addr) = a.as_str() {
                ip_reservations.push(IpReservation { address: addr.to_string(), prefix_len: None });
            }
        }
    }
    if let Some(prefixes) = entry.get("prefixes").and_then(|v| v.as_array()) {
        for p in prefixes {
            if let Some(p) = p.as_str().and_then(|s| s.split_once('/')) {
                let (address, len) = p;
                ip_reservations.push(IpReservation {
                    address: address.to_string(),
                    prefix_len: len.parse().ok(),
                });
            }
        }
    }

    Some(ReportedHost {
        subnet_prefix,
        identifiers,
        ip_reservations,
        hostname: entry.get("hostname").and_then(|v| v.as_str()).map(String::from),
        data_source: HostDataSource::ConfigFile,
        options: entry.clone(),
    })
}

/// Strips colons from a hex identifier (`aa:bb:cc` -> `aabbcc`); Kea's own
/// config and host_cmds responses are inconsistent about separators.
fn normalize_hex(value: &str) -> String {
    value.chars().filter(|c| *c != ':').collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_level_subnet_with_pool() {
        let settings = serde_json::json!({
            "subnet4": [{
                "id": 7,
                "subnet": "192.0.2.0/24",
                "pools": [{"pool": "192.0.2.10 - 192.0.2.20"}],
            }]
        });
        let subnets = parse_subnets(DaemonName::Dhcp4, &settings);
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].local_subnet_id, 7);
        assert_eq!(subnets[0].address_pools[0].lower_bound, "192.0.2.10");
        assert_eq!(subnets[0].address_pools[0].upper_bound, "192.0.2.20");
    }

    #[test]
    fn parses_subnet_nested_in_shared_network() {
        let settings = serde_json::json!({
            "shared-networks": [{
                "name": "floor-1",
                "subnet4": [{"id": 1, "subnet": "10.0.0.0/24"}]
            }]
        });
        let subnets = parse_subnets(DaemonName::Dhcp4, &settings);
        assert_eq!(subnets[0].shared_network_name.as_deref(), Some("floor-1"));
    }

    #[test]
    fn parses_reservation_with_hw_address_and_hostname() {
        let settings = serde_json::json!({
            "subnet4": [{
                "id": 1,
                "subnet": "10.0.0.0/24",
                "reservations": [{"hw-address": "aa:bb:cc:dd:ee:ff", "ip-address": "10.0.0.5", "hostname": "printer"}]
            }]
        });
        let hosts = parse_config_file_reservations(DaemonName::Dhcp4, &settings);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].identifiers[0].value_hex, "aabbccddeeff");
        assert_eq!(hosts[0].hostname.as_deref(), Some("printer"));
        assert_eq!(hosts[0].subnet_prefix.as_deref(), Some("10.0.0.0/24"));
    }

    #[test]
    fn reservation_with_no_identifier_is_skipped() {
        let entry = serde_json::json!({"hostname": "mystery"});
        assert!(parse_one_reservation(&entry, None).is_none());
    }
}
