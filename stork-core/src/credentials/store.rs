//! Per `(IP, port)` Basic-Auth credential store used by the agent when
//! talking to the Kea Control Agent.

use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::CoreError;

use super::address::normalize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    ip: String,
    port: u16,
}

/// A mapping `(normalized_ip, port) -> BasicAuth`.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    entries: HashMap<Key, BasicAuth>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    ip: String,
    port: u16,
    user: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    basic_auth: Vec<PersistedEntry>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only parseable IPv4/IPv6 literals; stores under canonical
    /// form. Overwrites any existing record for the same `(ip, port)`.
    pub fn add_or_update_basic_auth(
        &mut self,
        ip: &str,
        port: u16,
        creds: BasicAuth,
    ) -> Result<(), CoreError> {
        let key = Key {
            ip: normalize(ip)?,
            port,
        };
        self.entries.insert(key, creds);
        Ok(())
    }

    /// Canonicalizes the query key then looks up the store. Returns `None`
    /// on a malformed address rather than an error: a lookup miss and an
    /// unparseable query both mean "no credentials for this target".
    pub fn get_basic_auth(&self, ip: &str, port: u16) -> Option<&BasicAuth> {
        let ip = normalize(ip).ok()?;
        self.entries.get(&Key { ip, port })
    }

    /// Valid only if the scheme is `http`/`https`, the host is a literal IP
    /// (not a hostname), and the port is explicit. The path and query
    /// fragment never affect the lookup.
    pub fn get_basic_auth_by_url(&self, url: &str) -> Option<&BasicAuth> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return None;
        }
        let port = parsed.port()?;
        let host = parsed.host()?;
        let ip = match host {
            Host::Ipv4(v4) => v4.to_string(),
            Host::Ipv6(v6) => v6.to_string(),
            Host::Domain(_) => return None,
        };
        self.get_basic_auth(&ip, port)
    }

    /// Idempotent: removing an absent entry is not an error.
    pub fn remove_basic_auth(&mut self, ip: &str, port: u16) {
        if let Ok(ip) = normalize(ip) {
            self.entries.remove(&Key { ip, port });
        }
    }

    /// Parses a JSON document of shape `{ "basic_auth": [...] }`. Strict
    /// JSON: unquoted keys or a missing `port` field fail, as does empty
    /// content. Entries with non-literal addresses are rejected the same
    /// way a direct `add_or_update_basic_auth` call would be.
    pub fn read<R: Read>(&mut self, mut reader: R) -> Result<(), CoreError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|e| CoreError::InvalidInput(format!("could not read credentials: {e}")))?;
        if buf.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "credentials document is empty".to_string(),
            ));
        }
        let doc: PersistedDocument = serde_json::from_str(&buf)
            .map_err(|e| CoreError::InvalidInput(format!("malformed credentials JSON: {e}")))?;
        for entry in doc.basic_auth {
            self.add_or_update_basic_auth(
                &entry.ip,
                entry.port,
                BasicAuth {
                    user: entry.user,
                    password: entry.password,
                },
            )?;
        }
        Ok(())
    }

    /// Serializes the store back to the same JSON shape `read` accepts, for
    /// persistence to the agent's credentials file.
    pub fn to_json(&self) -> Result<String, CoreError> {
        let mut entries: Vec<PersistedEntry> = self
            .entries
            .iter()
            .map(|(key, creds)| PersistedEntry {
                ip: key.ip.clone(),
                port: key.port,
                user: creds.user.clone(),
                password: creds.password.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (a.ip.as_str(), a.port).cmp(&(b.ip.as_str(), b.port)));
        serde_json::to_string_pretty(&PersistedDocument {
            basic_auth: entries,
        })
        .map_err(|e| CoreError::Internal(format!("could not serialize credentials: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(user: &str, password: &str) -> BasicAuth {
        BasicAuth {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let mut store = CredentialStore::new();
        store
            .add_or_update_basic_auth("192.168.0.1", 1234, creds("foo", "bar"))
            .unwrap();

        let json = r#"{"basic_auth":[{"ip":"192.168.0.1","port":1234,"user":"foo","password":"bar"}]}"#;
        let mut parsed = CredentialStore::new();
        parsed.read(json.as_bytes()).unwrap();
        assert_eq!(
            parsed.get_basic_auth("192.168.0.1", 1234),
            Some(&creds("foo", "bar"))
        );
    }

    #[test]
    fn scenario_one_credentials_round_trip() {
        let mut store = CredentialStore::new();
        store
            .add_or_update_basic_auth("192.168.0.1", 1234, creds("foo", "bar"))
            .unwrap();

        assert_eq!(
            store.get_basic_auth_by_url("http://192.168.0.1:1234/anything?x=1"),
            Some(&creds("foo", "bar"))
        );
        assert_eq!(store.get_basic_auth_by_url("http://192.168.0.1:5678/"), None);
    }

    #[test]
    fn scenario_two_ipv6_canonicalization() {
        let mut store = CredentialStore::new();
        store
            .add_or_update_basic_auth("FF:FF:0000:0000::", 80, creds("u", "p"))
            .unwrap();
        store.remove_basic_auth("FF:FF:0000::", 80);
        assert_eq!(store.get_basic_auth("FF:FF::", 80), None);
    }

    #[test]
    fn rejects_hostnames_and_malformed_addresses() {
        let mut store = CredentialStore::new();
        for bad in ["example.com", "", "-192.168.0.1", ":::1", "192.168.0.1/24"] {
            assert!(store.add_or_update_basic_auth(bad, 80, creds("u", "p")).is_err());
        }
    }

    #[test]
    fn url_lookup_requires_http_scheme_literal_host_and_explicit_port() {
        let mut store = CredentialStore::new();
        store
            .add_or_update_basic_auth("10.0.0.1", 8080, creds("u", "p"))
            .unwrap();

        assert!(store.get_basic_auth_by_url("ftp://10.0.0.1:8080/").is_none());
        assert!(store.get_basic_auth_by_url("http://example.com:8080/").is_none());
        assert!(store.get_basic_auth_by_url("http://10.0.0.1/").is_none());
    }

    #[test]
    fn read_rejects_empty_content_and_missing_port() {
        let mut store = CredentialStore::new();
        assert!(store.read("".as_bytes()).is_err());
        assert!(
            store
                .read(r#"{"basic_auth":[{"ip":"10.0.0.1","user":"u","password":"p"}]}"#.as_bytes())
                .is_err()
        );
        assert!(
            store
                .read(r#"{basic_auth: []}"#.as_bytes())
                .is_err()
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = CredentialStore::new();
        store.remove_basic_auth("10.0.0.1", 80);
        store.remove_basic_auth("10.0.0.1", 80);
    }
}
