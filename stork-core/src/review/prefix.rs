//! CIDR prefix parsing, canonicalization, and overlap testing shared by the
//! `subnets_overlapping` and `canonical_prefixes` checkers.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    V4 { addr: u32, len: u8 },
    V6 { addr: u128, len: u8 },
}

impl Prefix {
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let (addr_part, len_part) = text
            .split_once('/')
            .ok_or_else(|| CoreError::InvalidInput(format!("`{text}` is not a CIDR prefix")))?;
        let len: u8 = len_part
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("`{text}` has a non-numeric prefix length")))?;

        if let Ok(v4) = Ipv4Addr::from_str(addr_part) {
            if len > 32 {
                return Err(CoreError::InvalidInput(format!("`{text}` exceeds /32")));
            }
            return Ok(Prefix::V4 {
                addr: u32::from(v4),
                len,
            });
        }
        if let Ok(v6) = Ipv6Addr::from_str(addr_part) {
            if len > 128 {
                return Err(CoreError::InvalidInput(format!("`{text}` exceeds /128")));
            }
            return Ok(Prefix::V6 {
                addr: u128::from(v6),
                len,
            });
        }
        Err(CoreError::InvalidInput(format!("`{text}` is not a valid address/length pair")))
    }

    pub fn len(&self) -> u8 {
        match self {
            Prefix::V4 { len, .. } => *len,
            Prefix::V6 { len, .. } => *len,
        }
    }

    fn is_v4(&self) -> bool {
        matches!(self, Prefix::V4 { .. })
    }

    /// The prefix masked down to its network address, dropping host bits.
    pub fn network(&self) -> Self {
        match *self {
            Prefix::V4 { addr, len } => Prefix::V4 {
                addr: mask_v4(addr, len),
                len,
            },
            Prefix::V6 { addr, len } => Prefix::V6 {
                addr: mask_v6(addr, len),
                len,
            },
        }
    }

    /// Whether the stored address already equals its network address, i.e.
    /// no host bits are set.
    pub fn is_canonical(&self) -> bool {
        *self == self.network()
    }

    /// Two prefixes overlap when the address ranges they denote intersect:
    /// the longer prefix's network, truncated to the shorter prefix's
    /// length, equals the shorter prefix's network. Same-family only; a
    /// v4/v6 comparison is never an overlap.
    pub fn overlaps(&self, other: &Prefix) -> bool {
        if self.is_v4() != other.is_v4() {
            return false;
        }
        match (self, other) {
            (Prefix::V4 { addr: a, len: la }, Prefix::V4 { addr: b, len: lb }) => {
                let shorter = (*la).min(*lb);
                mask_v4(*a, shorter) == mask_v4(*b, shorter)
            }
            (Prefix::V6 { addr: a, len: la }, Prefix::V6 { addr: b, len: lb }) => {
                let shorter = (*la).min(*lb);
                mask_v6(*a, shorter) == mask_v6(*b, shorter)
            }
            _ => unreachable!("family mismatch already handled above"),
        }
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::V4 { addr, len } => write!(f, "{}/{len}", Ipv4Addr::from(*addr)),
            Prefix::V6 { addr, len } => write!(f, "{}/{len}", Ipv6Addr::from(*addr)),
        }
    }
}

fn mask_v4(addr: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - len as u32))
    }
}

fn mask_v6(addr: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        addr & (u128::MAX << (128 - len as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6() {
        assert_eq!(Prefix::parse("10.0.0.0/8").unwrap(), Prefix::V4 { addr: 10 << 24, len: 8 });
        assert!(matches!(Prefix::parse("2001:db8::/32").unwrap(), Prefix::V6 { .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Prefix::parse("not-a-prefix").is_err());
        assert!(Prefix::parse("10.0.0.0/33").is_err());
        assert!(Prefix::parse("2001:db8::/129").is_err());
    }

    #[test]
    fn detects_non_canonical_host_bits() {
        let p = Prefix::parse("192.168.1.5/24").unwrap();
        assert!(!p.is_canonical());
        assert_eq!(p.network().to_string(), "192.168.1.0/24");
    }

    #[test]
    fn canonical_prefix_is_unchanged_by_network() {
        let p = Prefix::parse("192.168.1.0/24").unwrap();
        assert!(p.is_canonical());
    }

    #[test]
    fn overlap_detects_nested_prefixes() {
        let outer = Prefix::parse("10.0.0.0/8").unwrap();
        let inner = Prefix::parse("10.1.0.0/16").unwrap();
        let disjoint = Prefix::parse("192.168.0.0/16").unwrap();

        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
        assert!(!outer.overlaps(&disjoint));
    }

    #[test]
    fn overlap_ignores_family_mismatch() {
        let v4 = Prefix::parse("10.0.0.0/8").unwrap();
        let v6 = Prefix::parse("2001:db8::/32").unwrap();
        assert!(!v4.overlaps(&v6));
    }

    #[test]
    fn identical_prefixes_overlap() {
        let a = Prefix::parse("10.0.0.0/24").unwrap();
        let b = Prefix::parse("10.0.0.0/24").unwrap();
        assert!(a.overlaps(&b));
    }
}
