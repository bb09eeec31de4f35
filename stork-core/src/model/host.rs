//! Static host reservations: identified by a hardware/DUID/circuit-id
//! identifier rather than by prefix, and potentially configured
//! independently (and inconsistently) on more than one daemon.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{DaemonId, HostId, SubnetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    HwAddress,
    Duid,
    CircuitId,
    ClientId,
    Flex,
}

/// A hex-encoded identifier value, e.g. a MAC address or DUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostIdentifier {
    pub kind: IdentifierKind,
    pub value_hex: String,
}

/// A static address or prefix assigned to the reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpReservation {
    pub address: String,
    pub prefix_len: Option<u8>,
}

/// A host reservation, scoped to a subnet when the identifier is only
/// meaningful within it (e.g. `circuit-id`), global otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub subnet_id: Option<SubnetId>,
    pub identifiers: Vec<HostIdentifier>,
    pub ip_reservations: Vec<IpReservation>,
    pub hostname: Option<String>,
}

/// The per-daemon view of a host reservation: the same logical host may be
/// configured via `config-file` on one daemon and `host_cmds` on another,
/// each with its own option set. `options_hash` lets the commit algorithm
/// detect a daemon-side edit without deep-comparing the options blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalHost {
    pub host_id: HostId,
    pub daemon_id: DaemonId,
    pub source: HostDataSource,
    pub options: serde_json::Value,
    pub options_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostDataSource {
    ConfigFile,
    HostCmds,
}

impl LocalHost {
    /// Stable hash of `options`, independent of key order, used to detect
    /// whether a daemon's reservation changed since the last fetch.
    pub fn hash_options(options: &serde_json::Value) -> String {
        let canonical = canonicalize(options);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        to_hex(&hasher.finalize())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serializes a JSON value with object keys sorted, so semantically
/// identical documents hash identically regardless of field order.
fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                out.push_str(&canonicalize(&map[*key]));
            }
            out.push('}');
            out
        }
        serde_json::Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonicalize(item));
            }
            out.push(']');
            out
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_hash_is_order_independent() {
        let a = json!({"one": 1, "two": 2});
        let b = json!({"two": 2, "one": 1});
        assert_eq!(LocalHost::hash_options(&a), LocalHost::hash_options(&b));
    }

    #[test]
    fn options_hash_differs_on_value_change() {
        let a = json!({"one": 1});
        let b = json!({"one": 2});
        assert_ne!(LocalHost::hash_options(&a), LocalHost::hash_options(&b));
    }
}
