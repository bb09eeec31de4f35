//! Utilization calculator: a fold from per-subnet statistics to
//! per-shared-network and per-fleet totals. IPv4 accumulates
//! `{total, assigned, declined}`; IPv6 accumulates the NA and PD
//! counters separately, then mixes NAs into a shared network's address
//! total for cross-family display. Utilization is `assigned / total`
//! with `total == 0` yielding `0`, never an error or infinity, stored as
//! an integer percentage times ten (one decimal place, `[0, 1000]`).
//! The `-1` sentinel propagates as an absorbing "invalid" through a
//! scope's running total, matching [`crate::model::StatValue`]'s NaN-like
//! addition.

use crate::model::{Family, Subnet, SubnetStats};

/// Running totals for one family within one scope (a single subnet, a
/// shared network, or the whole fleet).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyTotals {
    pub total: Counter,
    pub assigned: Counter,
    pub declined: Counter,
    pub total_pd: Counter,
    pub assigned_pd: Counter,
}

/// A running sum that turns permanently invalid once any addend is the
/// `-1` sentinel, mirroring [`crate::model::StatValue`]'s NaN-style
/// addition without carrying arbitrary precision through this layer
/// (fleet-wide totals fit comfortably in `i128`; only the wire-level
/// per-daemon counters need `BigInt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter {
    sum: i128,
    invalid: bool,
}

impl Counter {
    pub fn valid(&self) -> Option<i128> {
        if self.invalid {
            None
        } else {
            Some(self.sum)
        }
    }

    pub fn add_stat(mut self, value: &crate::model::StatValue) -> Self {
        match value {
            crate::model::StatValue::Invalid => Counter { sum: self.sum, invalid: true },
            crate::model::StatValue::Valid(v) => {
                if self.invalid {
                    return self;
                }
                // Saturate rather than panic on the astronomically unlikely
                // fleet that overflows i128; precision loss here only
                // affects display, never the per-subnet JSON the agent
                // reports, which stays BigInt end to end.
                let as_i128 = v.to_string().parse::<i128>().unwrap_or(i128::MAX);
                self.sum = self.sum.saturating_add(as_i128);
                self
            }
        }
    }
}

impl std::ops::Add for Counter {
    type Output = Counter;

    fn add(self, rhs: Self) -> Self::Output {
        if self.invalid || rhs.invalid {
            Counter { sum: self.sum, invalid: true }
        } else {
            Counter {
                sum: self.sum.saturating_add(rhs.sum),
                invalid: false,
            }
        }
    }
}

impl FamilyTotals {
    fn fold_subnet(self, family: Family, stats: &SubnetStats) -> Self {
        match family {
            Family::V4 => FamilyTotals {
                total: self.total + Counter::default().add_stat(&stats.get(crate::model::stats::TOTAL_ADDRESSES)),
                assigned: self.assigned + Counter::default().add_stat(&stats.get(crate::model::stats::ASSIGNED_ADDRESSES)),
                declined: self.declined + Counter::default().add_stat(&stats.get(crate::model::stats::DECLINED_ADDRESSES)),
                ..self
            },
            Family::V6 => FamilyTotals {
                total: self.total + Counter::default().add_stat(&stats.get(crate::model::stats::TOTAL_NAS)),
                assigned: self.assigned + Counter::default().add_stat(&stats.get(crate::model::stats::ASSIGNED_NAS)),
                declined: self.declined + Counter::default().add_stat(&stats.get(crate::model::stats::DECLINED_NAS)),
                total_pd: self.total_pd + Counter::default().add_stat(&stats.get(crate::model::stats::TOTAL_PDS)),
                assigned_pd: self.assigned_pd + Counter::default().add_stat(&stats.get(crate::model::stats::ASSIGNED_PDS)),
            },
        }
    }

    /// `assigned / total` as an integer percentage times ten, `0` when
    /// `total` is zero, `None` (display-suppressed) when either side is
    /// the invalid sentinel.
    pub fn addr_utilization_permille_x10(&self) -> Option<u32> {
        utilization_ratio(self.assigned, self.total)
    }

    pub fn pd_utilization_permille_x10(&self) -> Option<u32> {
        utilization_ratio(self.assigned_pd, self.total_pd)
    }
}

fn utilization_ratio(assigned: Counter, total: Counter) -> Option<u32> {
    let assigned = assigned.valid()?;
    let total = total.valid()?;
    if total == 0 {
        return Some(0);
    }
    let permille_x10 = (assigned.max(0) * 1000) / total.max(1);
    Some(permille_x10.clamp(0, 1000) as u32)
}

/// One subnet's contribution, keyed for the caller to group by shared
/// network.
pub struct SubnetContribution<'a> {
    pub subnet: &'a Subnet,
    pub stats: &'a SubnetStats,
}

/// Folds a batch of subnet statistics into per-shared-network and a
/// single fleet-wide total. Subnets with no `shared_network_id` only
/// contribute to the fleet total. A shared network mixing address and
/// NA/PD families sums NAs into its address total for cross-family
/// display; PD totals are kept separate regardless.
pub fn aggregate<'a>(
    contributions: impl IntoIterator<Item = SubnetContribution<'a>>,
) -> (std::collections::HashMap<crate::model::SharedNetworkId, FamilyTotals>, FamilyTotals) {
    let mut by_shared_network: std::collections::HashMap<crate::model::SharedNetworkId, FamilyTotals> =
        std::collections::HashMap::new();
    let mut fleet = FamilyTotals::default();

    for contribution in contributions {
        let folded = FamilyTotals::default().fold_subnet(contribution.subnet.family, contribution.stats);
        fleet = merge_mixed(fleet, &folded);
        if let Some(shared_network_id) = contribution.subnet.shared_network_id {
            let entry = by_shared_network.entry(shared_network_id).or_default();
            *entry = merge_mixed(entry.clone(), &folded);
        }
    }

    (by_shared_network, fleet)
}

/// Merges one subnet's per-family totals into a scope accumulator that
/// may already hold a mix of v4 and v6 contributions: NAs (or v4
/// addresses) always add into `total`/`assigned`/`declined`; PD counters
/// only ever come from v6 subnets and add into `total_pd`/`assigned_pd`.
fn merge_mixed(mut acc: FamilyTotals, folded: &FamilyTotals) -> FamilyTotals {
    acc.total = acc.total + folded.total;
    acc.assigned = acc.assigned + folded.assigned;
    acc.declined = acc.declined + folded.declined;
    acc.total_pd = acc.total_pd + folded.total_pd;
    acc.assigned_pd = acc.assigned_pd + folded.assigned_pd;
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Family, SharedNetworkId, StatValue, Subnet, SubnetId, SubnetStats};

    fn v4_subnet(id: i64, shared_network_id: Option<i64>) -> Subnet {
        Subnet {
            id: SubnetId(id),
            prefix: format!("10.0.{id}.0/24"),
            family: Family::V4,
            shared_network_id: shared_network_id.map(SharedNetworkId),
            address_pools: vec![],
            prefix_pools: vec![],
        }
    }

    fn stats_with(total: i64, assigned: i64, declined: i64) -> SubnetStats {
        let mut s = SubnetStats::default();
        s.set(crate::model::stats::TOTAL_ADDRESSES, StatValue::from_i64(total));
        s.set(crate::model::stats::ASSIGNED_ADDRESSES, StatValue::from_i64(assigned));
        s.set(crate::model::stats::DECLINED_ADDRESSES, StatValue::from_i64(declined));
        s
    }

    #[test]
    fn zero_total_yields_zero_utilization_not_nan_or_error() {
        let subnet = v4_subnet(1, None);
        let stats = stats_with(0, 0, 0);
        let (_, fleet) = aggregate([SubnetContribution { subnet: &subnet, stats: &stats }]);
        assert_eq!(fleet.addr_utilization_permille_x10(), Some(0));
    }

    #[test]
    fn shared_network_sums_member_subnets() {
        let a = v4_subnet(1, Some(9));
        let b = v4_subnet(2, Some(9));
        let stats_a = stats_with(100, 50, 0);
        let stats_b = stats_with(100, 25, 0);

        let (by_sn, fleet) = aggregate([
            SubnetContribution { subnet: &a, stats: &stats_a },
            SubnetContribution { subnet: &b, stats: &stats_b },
        ]);

        let sn_totals = &by_sn[&SharedNetworkId(9)];
        assert_eq!(sn_totals.total.valid(), Some(200));
        assert_eq!(sn_totals.assigned.valid(), Some(75));
        assert_eq!(sn_totals.addr_utilization_permille_x10(), Some(375));
        assert_eq!(fleet.total.valid(), Some(200));
    }

    #[test]
    fn invalid_sentinel_suppresses_display_without_aborting_batch() {
        let a = v4_subnet(1, None);
        let mut stats_a = stats_with(100, 0, 0);
        stats_a.set(crate::model::stats::ASSIGNED_ADDRESSES, StatValue::Invalid);
        let b = v4_subnet(2, None);
        let stats_b = stats_with(50, 25, 0);

        let (_, fleet) = aggregate([
            SubnetContribution { subnet: &a, stats: &stats_a },
            SubnetContribution { subnet: &b, stats: &stats_b },
        ]);

        assert_eq!(fleet.addr_utilization_permille_x10(), None);
        // the batch still completed; the valid subnet's total is reflected
        assert_eq!(fleet.total.valid(), Some(150));
    }

    #[test]
    fn utilization_is_clamped_into_0_to_1000() {
        assert_eq!(utilization_ratio(Counter { sum: 5, invalid: false }, Counter { sum: 5, invalid: false }), Some(1000));
    }
}
