//! Parses a BIND9 `named.conf` to recover its `rndc` control channel: the
//! first `controls { inet <addr> port <n> ... keys { "<name>"; }; };`
//! block, joined with the `key "<name>" { algorithm ...; secret ...; };`
//! block it references.

use regex::Regex;
use thiserror::Error;

use super::{AccessPointKind, DetectedAccessPoint, DetectedApp, DetectedAppKind};
use super::rewrite_wildcard_address;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Bind9DetectError {
    #[error("named.conf has no `controls` block")]
    MissingControlsBlock,
    #[error("controls block does not reference a `keys` entry")]
    MissingKeyReference,
    #[error("named.conf has no `key \"{0}\"` block matching the controls reference")]
    MissingKeyBlock(String),
}

/// Statistics channel default port, used when a `controls` block omits
/// `port` (BIND9 itself defaults to 953 for `rndc`, 8053 is statistics-http,
/// not handled here).
const DEFAULT_RNDC_PORT: u16 = 953;

pub fn detect(named_conf: &str) -> Result<DetectedApp, Bind9DetectError> {
    let controls_re = Regex::new(
        r#"(?s)controls\s*\{\s*inet\s+([^\s;]+)(?:\s+port\s+(\d+))?[^}]*?keys\s*\{\s*"([^"]+)"\s*;"#,
    )
    .expect("static regex is valid");

    let captures = controls_re
        .captures(named_conf)
        .ok_or(Bind9DetectError::MissingControlsBlock)?;

    let address = captures.get(1).map(|m| m.as_str()).unwrap_or("127.0.0.1");
    let port = captures
        .get(2)
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(DEFAULT_RNDC_PORT);
    let key_name = captures
        .get(3)
        .ok_or(Bind9DetectError::MissingKeyReference)?
        .as_str();

    let key_re = Regex::new(&format!(
        r#"(?s)key\s+"{}"\s*\{{\s*algorithm\s+([^;]+);\s*secret\s+"([^"]+)"\s*;"#,
        regex::escape(key_name)
    ))
    .expect("constructed regex is valid");

    let key_captures = key_re
        .captures(named_conf)
        .ok_or_else(|| Bind9DetectError::MissingKeyBlock(key_name.to_string()))?;
    let algorithm = key_captures.get(1).unwrap().as_str().trim();
    let secret = key_captures.get(2).unwrap().as_str();

    Ok(DetectedApp {
        kind: DetectedAppKind::Bind9,
        access_points: vec![DetectedAccessPoint {
            kind: AccessPointKind::Control,
            address: rewrite_wildcard_address(address),
            port,
            key: Some(format!("{algorithm}:{secret}")),
            use_secure_protocol: false,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMED_CONF: &str = r#"
        controls {
            inet 127.0.0.1 port 953
                allow { localhost; } keys { "rndc-key"; };
        };

        key "rndc-key" {
            algorithm hmac-sha256;
            secret "c3VwZXJzZWNyZXQ=";
        };
    "#;

    #[test]
    fn joins_controls_block_with_referenced_key() {
        let app = detect(NAMED_CONF).unwrap();
        let ap = &app.access_points[0];
        assert_eq!(ap.address, "127.0.0.1");
        assert_eq!(ap.port, 953);
        assert_eq!(ap.key.as_deref(), Some("hmac-sha256:c3VwZXJzZWNyZXQ="));
    }

    #[test]
    fn missing_controls_block_is_an_error() {
        assert_eq!(detect("").unwrap_err(), Bind9DetectError::MissingControlsBlock);
    }

    #[test]
    fn controls_referencing_unknown_key_is_an_error() {
        let conf = r#"controls { inet 127.0.0.1 port 953 keys { "missing-key"; }; };"#;
        assert_eq!(
            detect(conf).unwrap_err(),
            Bind9DetectError::MissingKeyBlock("missing-key".to_string())
        );
    }

    #[test]
    fn defaults_port_when_omitted() {
        let conf = r#"
            controls { inet 10.0.0.1 keys { "k"; }; };
            key "k" { algorithm hmac-md5; secret "abc="; };
        "#;
        let app = detect(conf).unwrap();
        assert_eq!(app.access_points[0].port, DEFAULT_RNDC_PORT);
    }
}
