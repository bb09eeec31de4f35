//! Subnet statistics: an open keyed map of numeric counters whose values may
//! exceed the 64-bit signed range and must round-trip through JSON without
//! precision loss. A `-1` sentinel marks "invalid" and propagates as a
//! NaN-equivalent through aggregation rather than aborting a batch.

use std::collections::BTreeMap;
use std::ops::Add;

use num_bigint::BigInt;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const TOTAL_ADDRESSES: &str = "total-addresses";
pub const ASSIGNED_ADDRESSES: &str = "assigned-addresses";
pub const DECLINED_ADDRESSES: &str = "declined-addresses";
pub const TOTAL_NAS: &str = "total-nas";
pub const ASSIGNED_NAS: &str = "assigned-nas";
pub const DECLINED_NAS: &str = "declined-nas";
pub const TOTAL_PDS: &str = "total-pds";
pub const ASSIGNED_PDS: &str = "assigned-pds";

/// A single counter value: either a valid arbitrary-precision integer, or
/// the `-1` sentinel ("invalid"), which behaves like NaN under addition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatValue {
    Valid(BigInt),
    Invalid,
}

impl StatValue {
    pub fn from_i64(v: i64) -> Self {
        if v == -1 {
            StatValue::Invalid
        } else {
            StatValue::Valid(BigInt::from(v))
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, StatValue::Invalid)
    }

    pub fn zero() -> Self {
        StatValue::Valid(BigInt::from(0))
    }
}

impl Add for StatValue {
    type Output = StatValue;

    /// Invalid is absorbing: once any addend is invalid the sum stays
    /// invalid, mirroring NaN propagation.
    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (StatValue::Invalid, _) | (_, StatValue::Invalid) => StatValue::Invalid,
            (StatValue::Valid(a), StatValue::Valid(b)) => StatValue::Valid(a + b),
        }
    }
}

impl Serialize for StatValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatValue::Valid(v) => serializer.serialize_str(&v.to_string()),
            StatValue::Invalid => serializer.serialize_str("-1"),
        }
    }
}

impl<'de> Deserialize<'de> for StatValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept either a JSON number or a decimal string, since some Kea
        // responses emit small counters as bare numbers.
        let raw = serde_json::Value::deserialize(deserializer)?;
        let text = match raw {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(DeError::custom(format!("expected number or string, got {other}"))),
        };
        if text == "-1" {
            return Ok(StatValue::Invalid);
        }
        let parsed = text
            .parse::<BigInt>()
            .map_err(|e| DeError::custom(format!("invalid stat value `{text}`: {e}")))?;
        Ok(StatValue::Valid(parsed))
    }
}

/// An open keyed map of numeric counters, e.g. `total-addresses` ->
/// `4294967296`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetStats(pub BTreeMap<String, StatValue>);

impl SubnetStats {
    pub fn get(&self, key: &str) -> StatValue {
        self.0.get(key).cloned().unwrap_or_else(StatValue::zero)
    }

    pub fn set(&mut self, key: impl Into<String>, value: StatValue) {
        self.0.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_big_values_without_precision_loss() {
        let huge = "18446744073709551616"; // 2^64, overflows i64/u64
        let value: StatValue = serde_json::from_str(&format!("\"{huge}\"")).unwrap();
        assert_eq!(serde_json::to_string(&value).unwrap(), format!("\"{huge}\""));
    }

    #[test]
    fn invalid_sentinel_round_trips() {
        let value: StatValue = serde_json::from_str("\"-1\"").unwrap();
        assert!(value.is_invalid());
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"-1\"");
    }

    #[test]
    fn invalid_is_absorbing_under_addition() {
        let sum = StatValue::from_i64(5) + StatValue::Invalid;
        assert!(sum.is_invalid());
    }
}
