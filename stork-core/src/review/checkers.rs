//! The mandatory config review checkers. Each one is a stateless function
//! of a [`ReviewContext`]; the checker's own enablement is resolved
//! separately by [`crate::review::controller`].

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::model::SubnetId;

use super::context::{Checker, Finding, ReviewContext, Severity};
use super::prefix::Prefix;

fn has_hook_library(config: &serde_json::Value, needle: &str) -> bool {
    config
        .get("hooks-libraries")
        .and_then(|v| v.as_array())
        .map(|libs| {
            libs.iter().any(|lib| {
                lib.get("library")
                    .and_then(|l| l.as_str())
                    .map(|s| s.contains(needle))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Flags a DHCP daemon that has no `stat_cmds` hook loaded: its statistics
/// puller will only ever see the handful of counters Kea exposes without
/// the hook, not the per-subnet breakdown the utilization view depends on.
pub struct StatCmdsPresence;

impl Checker for StatCmdsPresence {
    fn name(&self) -> &'static str {
        "stat_cmds_presence"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        if !ctx.daemon.is_dhcp() {
            return Vec::new();
        }
        if has_hook_library(&ctx.daemon.config, "stat_cmds") {
            return Vec::new();
        }
        vec![Finding::new(
            self.name(),
            Severity::Warning,
            "{daemon} does not load the libdhcp_stat_cmds hook; per-subnet statistics will be unavailable",
        )]
    }
}

/// Flags a DHCP daemon with a `hosts-database(s)` entry configured that
/// has no `host_cmds` hook loaded — without the hook, reservations stored
/// in the database can only be inspected by querying it directly.
pub struct HostCmdsPresence;

impl Checker for HostCmdsPresence {
    fn name(&self) -> &'static str {
        "host_cmds_presence"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        if !ctx.daemon.is_dhcp() {
            return Vec::new();
        }
        let has_host_database = ctx.daemon.config.get("hosts-database").is_some()
            || ctx
                .daemon
                .config
                .get("hosts-databases")
                .and_then(|v| v.as_array())
                .map(|a| !a.is_empty())
                .unwrap_or(false);
        if !has_host_database || has_hook_library(&ctx.daemon.config, "host_cmds") {
            return Vec::new();
        }
        vec![Finding::new(
            self.name(),
            Severity::Info,
            "{daemon} has a hosts database configured but does not load the libdhcp_host_cmds hook",
        )]
    }
}

/// Flags shared networks with zero member subnets ("empty") or exactly
/// one ("dispensable" — grouping exists to let clients roam between
/// subnets, which is meaningless with fewer than two members). Both
/// counts are rolled into a single finding with correct singular/plural
/// wording rather than one finding per network.
pub struct SharedNetworkDispensable;

impl Checker for SharedNetworkDispensable {
    fn name(&self) -> &'static str {
        "shared_network_dispensable"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        let mut empty = 0usize;
        let mut single = 0usize;
        for sn in ctx.shared_networks {
            let member_count = ctx.subnets.iter().filter(|s| s.shared_network_id == Some(sn.id)).count();
            match member_count {
                0 => empty += 1,
                1 => single += 1,
                _ => {}
            }
        }
        if empty == 0 && single == 0 {
            return Vec::new();
        }
        let mut parts = Vec::new();
        if empty > 0 {
            parts.push(format!("{empty} empty shared network{}", plural_suffix(empty)));
        }
        if single > 0 {
            parts.push(format!(
                "{single} shared network{} with only a single subnet",
                plural_suffix(single)
            ));
        }
        vec![Finding::new(self.name(), Severity::Info, parts.join(" and "))]
    }
}

fn plural_suffix(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Flags a subnet with no address pools, no prefix pools, and no host
/// reservations (from either its config file or, when `host_cmds` is
/// loaded, the host database — the reconciled [`ReviewContext::hosts`]
/// view already merges both): it can never hand out an address, so it
/// serves no purpose in the configuration.
pub struct SubnetDispensable;

impl Checker for SubnetDispensable {
    fn name(&self) -> &'static str {
        "subnet_dispensable"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        ctx.subnets
            .iter()
            .filter(|s| {
                s.address_pools.is_empty()
                    && s.prefix_pools.is_empty()
                    && !ctx.hosts.iter().any(|h| h.subnet_id == Some(s.id))
            })
            .map(|s| {
                Finding::new(
                    self.name(),
                    Severity::Warning,
                    format!("subnet `{}` has no pools and no reservations in {{daemon}}", s.prefix),
                )
            })
            .collect()
    }
}

/// Flags a subnet, among those with at least one pool and at least one IP
/// or delegated-prefix reservation, where *every* reservation sits
/// outside *every* pool — meaning none of them benefit from Kea's
/// out-of-pool reservation fast path it could otherwise use, so the
/// daemon is paying the reservation-lookup cost on every lease request
/// for nothing. A single in-pool reservation is enough to disqualify the
/// subnet, since the fast path is then unavailable regardless.
/// `reservations-out-of-pool=true` at subnet, shared-network, or global
/// scope disables the check for that scope (subnet wins ties).
pub struct ReservationsOutOfPool;

impl Checker for ReservationsOutOfPool {
    fn name(&self) -> &'static str {
        "reservations_out_of_pool"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for subnet in ctx.subnets {
            if ctx.out_of_pool_overrides.is_disabled_for(subnet) {
                continue;
            }
            let v4_pools: Vec<(Ipv4Addr, Ipv4Addr)> = subnet
                .address_pools
                .iter()
                .filter_map(|p| {
                    let lo = Ipv4Addr::from_str(&p.lower_bound).ok()?;
                    let hi = Ipv4Addr::from_str(&p.upper_bound).ok()?;
                    Some((lo, hi))
                })
                .collect();
            let pd_pools: Vec<Prefix> = subnet
                .prefix_pools
                .iter()
                .filter_map(|p| Prefix::parse(&format!("{}/{}", p.prefix, p.prefix_len)).ok())
                .collect();
            if v4_pools.is_empty() && pd_pools.is_empty() {
                continue;
            }

            let mut any_reservation = false;
            let mut all_out_of_pool = true;
            for host in ctx.hosts.iter().filter(|h| h.subnet_id == Some(subnet.id)) {
                for reservation in &host.ip_reservations {
                    any_reservation = true;
                    let in_pool = match reservation.prefix_len {
                        None => Ipv4Addr::from_str(&reservation.address)
                            .map(|addr| {
                                v4_pools
                                    .iter()
                                    .any(|(lo, hi)| u32::from(addr) >= u32::from(*lo) && u32::from(addr) <= u32::from(*hi))
                            })
                            .unwrap_or(false),
                        Some(len) => Prefix::parse(&format!("{}/{len}", reservation.address))
                            .map(|res_prefix| pd_pools.iter().any(|pool| pool.overlaps(&res_prefix)))
                            .unwrap_or(false),
                    };
                    if in_pool {
                        all_out_of_pool = false;
                    }
                }
            }
            if any_reservation && all_out_of_pool {
                findings.push(Finding::new(
                    self.name(),
                    Severity::Info,
                    format!(
                        "subnet `{}` has reservations that all fall outside its pools in {{daemon}}",
                        subnet.prefix
                    ),
                ));
            }
        }
        findings
    }
}

/// Flags a configured prefix that is not in canonical form (network
/// address masked to its prefix length, IPv6 zero-collapsed) or that
/// fails to parse at all. Kea accepts and silently canonicalizes
/// non-canonical prefixes, so a mismatch in the source config is usually
/// a typo.
pub struct CanonicalPrefixes;

impl Checker for CanonicalPrefixes {
    fn name(&self) -> &'static str {
        "canonical_prefixes"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        ctx.subnets
            .iter()
            .filter_map(|s| match Prefix::parse(&s.prefix) {
                Ok(parsed) if parsed.is_canonical() => None,
                Ok(parsed) => Some(Finding::new(
                    self.name(),
                    Severity::Warning,
                    format!(
                        "subnet prefix `{}` in {{daemon}} is not canonical (expected `{}`)",
                        s.prefix,
                        parsed.network()
                    ),
                )),
                Err(_) => Some(Finding::new(
                    self.name(),
                    Severity::Warning,
                    format!("subnet prefix `{}` in {{daemon}} is not a valid address/length pair", s.prefix),
                )),
            })
            .collect()
    }
}

/// Flags overlapping subnet prefixes within the same address family,
/// across both top-level subnets and those nested in shared networks.
/// Overlapping subnets are a Kea configuration error (the daemon refuses
/// to load one of them), so this is worth surfacing before a reload
/// fails. Capped at [`Self::DEFAULT_LIMIT`] reported pairs — an upper
/// bound on the *total* across families, families processed in a fixed
/// order, rather than a separate cap per family.
pub struct SubnetsOverlapping {
    pub limit: usize,
}

impl SubnetsOverlapping {
    pub const DEFAULT_LIMIT: usize = 10;
}

impl Default for SubnetsOverlapping {
    fn default() -> Self {
        Self { limit: Self::DEFAULT_LIMIT }
    }
}

/// A detected overlap between a shorter-or-equal "parent" prefix and a
/// longer-or-equal "child" prefix sharing the same network bits.
struct OverlapPair {
    parent_id: SubnetId,
    parent_text: String,
    child_id: SubnetId,
    child_text: String,
    family_rank: u8,
    /// Duplicate prefixes (equal length) have no real parent/child
    /// relationship, so both directions are reported.
    mutual: bool,
}

impl Checker for SubnetsOverlapping {
    fn name(&self) -> &'static str {
        "subnets_overlapping"
    }

    fn run(&self, ctx: &ReviewContext) -> Vec<Finding> {
        let mut parsed: Vec<(SubnetId, &str, Prefix)> = ctx
            .subnets
            .iter()
            .filter_map(|s| Prefix::parse(&s.prefix).ok().map(|p| (s.id, s.prefix.as_str(), p)))
            .collect();
        // Parents precede children within a family: sort by family, then
        // prefix length ascending, per the algorithm note.
        parsed.sort_by_key(|(_, _, p)| (!matches!(p, Prefix::V4 { .. }), p.len()));

        let mut pairs = Vec::new();
        for i in 0..parsed.len() {
            for j in (i + 1)..parsed.len() {
                let (id_a, text_a, prefix_a) = parsed[i];
                let (id_b, text_b, prefix_b) = parsed[j];
                if !prefix_a.overlaps(&prefix_b) {
                    continue;
                }
                let family_rank = if matches!(prefix_a, Prefix::V4 { .. }) { 0 } else { 1 };
                if prefix_a.len() == prefix_b.len() {
                    pairs.push(OverlapPair {
                        parent_id: id_a,
                        parent_text: text_a.to_string(),
                        child_id: id_b,
                        child_text: text_b.to_string(),
                        family_rank,
                        mutual: true,
                    });
                } else {
                    pairs.push(OverlapPair {
                        parent_id: id_a,
                        parent_text: text_a.to_string(),
                        child_id: id_b,
                        child_text: text_b.to_string(),
                        family_rank,
                        mutual: false,
                    });
                }
            }
        }

        // Deterministic report order: family desc, parent id desc, child
        // id asc.
        pairs.sort_by(|a, b| {
            b.family_rank
                .cmp(&a.family_rank)
                .then(b.parent_id.cmp(&a.parent_id))
                .then(a.child_id.cmp(&b.child_id))
        });

        let mut findings = Vec::new();
        let mut emitted_pairs = 0usize;
        for pair in &pairs {
            if emitted_pairs >= self.limit {
                findings.push(Finding::new(
                    self.name(),
                    Severity::Warning,
                    format!("at least {} overlapping subnet pairs in {{daemon}}", self.limit),
                ));
                break;
            }
            findings.push(Finding::new(
                self.name(),
                Severity::Warning,
                format!("`{}` is overlapped by `{}` in {{daemon}}", pair.parent_text, pair.child_text),
            ));
            emitted_pairs += 1;
            if pair.mutual {
                if emitted_pairs >= self.limit {
                    findings.push(Finding::new(
                        self.name(),
                        Severity::Warning,
                        format!("at least {} overlapping subnet pairs in {{daemon}}", self.limit),
                    ));
                    break;
                }
                findings.push(Finding::new(
                    self.name(),
                    Severity::Warning,
                    format!("`{}` is overlapped by `{}` in {{daemon}}", pair.child_text, pair.parent_text),
                ));
                emitted_pairs += 1;
            }
        }
        findings
    }
}
