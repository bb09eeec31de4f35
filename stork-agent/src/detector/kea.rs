//! Parses the Kea Control Agent's JSON configuration to recover the
//! address the CA listens on. Kea's JSON dialect allows `/* ... */`,
//! `//` and `#` comments that plain JSON tokenizers reject; these are
//! stripped (never interpreted) before handing the text to `serde_json`.

use serde_json::Value;
use thiserror::Error;

use super::{AccessPointKind, DetectedAccessPoint, DetectedApp, DetectedAppKind};
use super::rewrite_wildcard_address;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeaDetectError {
    #[error("malformed Kea Control Agent configuration: {0}")]
    MalformedJson(String),
    #[error("Control Agent configuration has no `Control-agent` section")]
    MissingControlAgentSection,
    #[error("Control Agent configuration has no `http-host`/`http-port`")]
    MissingHttpAddress,
}

/// Strips `/* block */`, `// line` and `# line` comments from a Kea config,
/// leaving string literals untouched even when they themselves contain
/// `//` or `#`.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Parses a Kea Control Agent configuration and extracts its HTTP access
/// point. `0.0.0.0`/`::` listening addresses are rewritten to a local
/// connect target.
pub fn detect(config_text: &str) -> Result<DetectedApp, KeaDetectError> {
    let stripped = strip_json_comments(config_text);
    let value: Value = serde_json::from_str(&stripped)
        .map_err(|e| KeaDetectError::MalformedJson(e.to_string()))?;

    let ca = value
        .get("Control-agent")
        .ok_or(KeaDetectError::MissingControlAgentSection)?;

    let host = ca
        .get("http-host")
        .and_then(Value::as_str)
        .ok_or(KeaDetectError::MissingHttpAddress)?;
    let port = ca
        .get("http-port")
        .and_then(Value::as_u64)
        .ok_or(KeaDetectError::MissingHttpAddress)?;

    let use_secure_protocol = ca.get("trust-anchor").is_some();

    Ok(DetectedApp {
        kind: DetectedAppKind::Kea,
        access_points: vec![DetectedAccessPoint {
            kind: AccessPointKind::Control,
            address: rewrite_wildcard_address(host),
            port: port as u16,
            key: None,
            use_secure_protocol,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_block_line_and_hash_comments_outside_strings() {
        let input = r#"{
            /* block comment */
            "Control-agent": { // line comment
                "http-host": "0.0.0.0", # hash comment
                "http-port": 8000
            }
        }"#;
        let stripped = strip_json_comments(input);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["Control-agent"]["http-port"], 8000);
    }

    #[test]
    fn preserves_slashes_and_hashes_inside_string_literals() {
        let input = r#"{"Control-agent": {"http-host": "127.0.0.1", "http-port": 8000, "note": "50% // not a comment # either"}}"#;
        let stripped = strip_json_comments(input);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["Control-agent"]["note"], "50% // not a comment # either");
    }

    #[test]
    fn rewrites_wildcard_host_to_loopback() {
        let config = r#"{"Control-agent": {"http-host": "0.0.0.0", "http-port": 8000}}"#;
        let app = detect(config).unwrap();
        assert_eq!(app.access_points[0].address, "127.0.0.1");
        assert_eq!(app.access_points[0].port, 8000);
    }

    #[test]
    fn missing_section_is_an_error() {
        assert_eq!(
            detect("{}").unwrap_err(),
            KeaDetectError::MissingControlAgentSection
        );
    }

    #[test]
    fn missing_http_address_is_an_error() {
        let config = r#"{"Control-agent": {}}"#;
        assert_eq!(detect(config).unwrap_err(), KeaDetectError::MissingHttpAddress);
    }
}
