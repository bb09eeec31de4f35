//! Local detection of the Kea Control Agent and BIND9 `named` processes
//! running on this host, from their on-disk configuration files.

pub mod bind9;
pub mod kea;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPointKind {
    Control,
    Statistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedAccessPoint {
    pub kind: AccessPointKind,
    pub address: String,
    pub port: u16,
    pub key: Option<String>,
    pub use_secure_protocol: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedAppKind {
    Kea,
    Bind9,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedApp {
    pub kind: DetectedAppKind,
    pub access_points: Vec<DetectedAccessPoint>,
}

/// Rewrites a listening wildcard to a local connect target: `0.0.0.0`
/// isn't valid to dial, `127.0.0.1` is.
pub fn rewrite_wildcard_address(address: &str) -> String {
    match address {
        "0.0.0.0" => "127.0.0.1".to_string(),
        "::" => "::1".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_ipv4_and_ipv6_wildcards() {
        assert_eq!(rewrite_wildcard_address("0.0.0.0"), "127.0.0.1");
        assert_eq!(rewrite_wildcard_address("::"), "::1");
    }

    #[test]
    fn leaves_concrete_addresses_alone() {
        assert_eq!(rewrite_wildcard_address("10.0.0.5"), "10.0.0.5");
        assert_eq!(rewrite_wildcard_address("::1"), "::1");
    }
}
