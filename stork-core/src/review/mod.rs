pub mod checkers;
pub mod context;
pub mod controller;
pub mod prefix;

use std::collections::HashMap;

use crate::model::DaemonId;

pub use checkers::{
    CanonicalPrefixes, HostCmdsPresence, ReservationsOutOfPool, SharedNetworkDispensable, StatCmdsPresence,
    SubnetDispensable, SubnetsOverlapping,
};
pub use context::{Checker, Finding, OutOfPoolOverrides, ReviewContext, Severity};
pub use controller::{resolve, CheckerState};

/// The fixed, ordered list of mandatory checkers. New checkers are added
/// here, not discovered.
pub fn default_checkers() -> Vec<Box<dyn Checker>> {
    vec![
        Box::new(StatCmdsPresence),
        Box::new(HostCmdsPresence),
        Box::new(SharedNetworkDispensable),
        Box::new(SubnetDispensable),
        Box::new(ReservationsOutOfPool),
        Box::new(SubnetsOverlapping::default()),
        Box::new(CanonicalPrefixes),
    ]
}

/// Runs every checker enabled for `daemon_id` against `ctx`, in
/// registration order, concatenating their rendered findings (the
/// `{daemon}` placeholder substituted with `daemon_display_name`).
pub fn review(
    ctx: &ReviewContext,
    daemon_id: DaemonId,
    daemon_display_name: &str,
    checkers: &[Box<dyn Checker>],
    global: &HashMap<String, CheckerState>,
    per_daemon: &HashMap<DaemonId, HashMap<String, CheckerState>>,
) -> Vec<Finding> {
    checkers
        .iter()
        .filter(|c| resolve(global, per_daemon, daemon_id, c.name(), CheckerState::Enabled) == CheckerState::Enabled)
        .flat_map(|c| c.run(ctx))
        .map(|f| render_report(f, daemon_display_name))
        .collect()
}

/// Substitutes the literal `{daemon}` placeholder a checker may have left
/// in its finding's message with the daemon's display name. Checkers
/// themselves never see the display name, only the daemon id, keeping
/// them free of presentation concerns.
pub fn render_report(finding: Finding, daemon_display_name: &str) -> Finding {
    Finding {
        message: finding.message.replace("{daemon}", daemon_display_name),
        ..finding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AddressPool, AppId, Daemon, DaemonName, Family, Host, HostId, IpReservation, PrefixPool, SharedNetwork,
        SharedNetworkId, Subnet, SubnetId,
    };

    fn sample_daemon() -> Daemon {
        Daemon {
            id: DaemonId(1),
            app_id: AppId(1),
            name: DaemonName::Dhcp4,
            active: true,
            monitored: true,
            version: None,
            uptime_seconds: None,
            reloaded_at: None,
            last_error: None,
            reload_count: 0,
            config: serde_json::json!({}),
        }
    }

    fn ctx<'a>(daemon: &'a Daemon, shared_networks: &'a [SharedNetwork], subnets: &'a [Subnet], hosts: &'a [Host]) -> ReviewContext<'a> {
        ReviewContext {
            daemon,
            shared_networks,
            subnets,
            hosts,
            out_of_pool_overrides: OutOfPoolOverrides::default(),
        }
    }

    #[test]
    fn flags_missing_stat_cmds_and_empty_subnet() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "10.0.0.0/24".into(),
            family: Family::V4,
            shared_network_id: None,
            address_pools: vec![],
            prefix_pools: vec![],
        }];
        let context = ctx(&daemon, &[], &subnets, &[]);

        let findings = review(&context, DaemonId(1), "dhcp4@host-a", &default_checkers(), &HashMap::new(), &HashMap::new());
        let names: Vec<&str> = findings.iter().map(|f| f.checker).collect();
        assert!(names.contains(&"stat_cmds_presence"));
        assert!(names.contains(&"subnet_dispensable"));
        let stat_finding = findings.iter().find(|f| f.checker == "stat_cmds_presence").unwrap();
        assert!(stat_finding.message.contains("dhcp4@host-a"));
        assert!(!stat_finding.message.contains("{daemon}"));
    }

    #[test]
    fn disabling_a_checker_globally_suppresses_it() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "10.0.0.0/24".into(),
            family: Family::V4,
            shared_network_id: None,
            address_pools: vec![],
            prefix_pools: vec![],
        }];
        let context = ctx(&daemon, &[], &subnets, &[]);

        let mut global = HashMap::new();
        global.insert("subnet_dispensable".to_string(), CheckerState::Disabled);

        let findings = review(&context, DaemonId(1), "dhcp4", &default_checkers(), &global, &HashMap::new());
        assert!(!findings.iter().any(|f| f.checker == "subnet_dispensable"));
    }

    #[test]
    fn scenario_overlap_report_names_parent_and_child() {
        let daemon = sample_daemon();
        let subnets = vec![
            Subnet {
                id: SubnetId(1),
                prefix: "10.0.1.0/24".into(),
                family: Family::V4,
                shared_network_id: None,
                address_pools: vec![],
                prefix_pools: vec![],
            },
            Subnet {
                id: SubnetId(2),
                prefix: "10.0.0.0/16".into(),
                family: Family::V4,
                shared_network_id: None,
                address_pools: vec![],
                prefix_pools: vec![],
            },
        ];
        let context = ctx(&daemon, &[], &subnets, &[]);

        let findings = review(&context, DaemonId(1), "dhcp4", &default_checkers(), &HashMap::new(), &HashMap::new());
        let overlap: Vec<&Finding> = findings.iter().filter(|f| f.checker == "subnets_overlapping").collect();
        assert_eq!(overlap.len(), 1);
        assert_eq!(overlap[0].message, "`10.0.0.0/16` is overlapped by `10.0.1.0/24` in dhcp4");
    }

    #[test]
    fn identical_prefixes_produce_two_mutual_findings() {
        let daemon = sample_daemon();
        let subnets = vec![
            Subnet {
                id: SubnetId(1),
                prefix: "10.0.0.0/24".into(),
                family: Family::V4,
                shared_network_id: None,
                address_pools: vec![],
                prefix_pools: vec![],
            },
            Subnet {
                id: SubnetId(2),
                prefix: "10.0.0.0/24".into(),
                family: Family::V4,
                shared_network_id: None,
                address_pools: vec![],
                prefix_pools: vec![],
            },
        ];
        let context = ctx(&daemon, &[], &subnets, &[]);
        let checker = SubnetsOverlapping::default();
        let findings = checker.run(&context);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn overlap_checker_stops_at_configured_cap() {
        let daemon = sample_daemon();
        // Four nested /N subnets inside 10.0.0.0/8 give C(4,2) = 6 pairs.
        let subnets: Vec<Subnet> = (0..4u8)
            .map(|i| Subnet {
                id: SubnetId(i as i64 + 1),
                prefix: format!("10.0.0.0/{}", 8 + i as u8),
                family: Family::V4,
                shared_network_id: None,
                address_pools: vec![],
                prefix_pools: vec![],
            })
            .collect();
        let context = ctx(&daemon, &[], &subnets, &[]);
        let checker = SubnetsOverlapping { limit: 2 };
        let findings = checker.run(&context);
        assert_eq!(findings.len(), 3, "2 pair findings plus one cap-summary finding");
        assert!(findings.last().unwrap().message.contains("at least 2 overlapping subnet pairs"));
    }

    #[test]
    fn scenario_out_of_pool_reservation_outside_every_pool_is_flagged() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "192.0.3.0/24".into(),
            family: Family::V4,
            shared_network_id: None,
            address_pools: vec![AddressPool {
                lower_bound: "192.0.3.10".into(),
                upper_bound: "192.0.3.100".into(),
            }],
            prefix_pools: vec![],
        }];
        let hosts = vec![Host {
            id: HostId(1),
            subnet_id: Some(SubnetId(1)),
            identifiers: vec![],
            ip_reservations: vec![IpReservation {
                address: "192.0.3.5".into(),
                prefix_len: None,
            }],
            hostname: None,
        }];
        let context = ctx(&daemon, &[], &subnets, &hosts);

        let findings = review(&context, DaemonId(1), "dhcp4", &default_checkers(), &HashMap::new(), &HashMap::new());
        assert!(findings.iter().any(|f| f.checker == "reservations_out_of_pool"));
    }

    #[test]
    fn scenario_in_pool_reservation_is_not_flagged() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "192.0.3.0/24".into(),
            family: Family::V4,
            shared_network_id: None,
            address_pools: vec![AddressPool {
                lower_bound: "192.0.3.10".into(),
                upper_bound: "192.0.3.100".into(),
            }],
            prefix_pools: vec![],
        }];
        let hosts = vec![Host {
            id: HostId(1),
            subnet_id: Some(SubnetId(1)),
            identifiers: vec![],
            ip_reservations: vec![IpReservation {
                address: "192.0.3.50".into(),
                prefix_len: None,
            }],
            hostname: None,
        }];
        let context = ctx(&daemon, &[], &subnets, &hosts);

        let findings = review(&context, DaemonId(1), "dhcp4", &default_checkers(), &HashMap::new(), &HashMap::new());
        assert!(!findings.iter().any(|f| f.checker == "reservations_out_of_pool"));
    }

    #[test]
    fn scenario_subnet_scoped_override_disables_check_regardless_of_reservation() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "192.0.3.0/24".into(),
            family: Family::V4,
            shared_network_id: None,
            address_pools: vec![AddressPool {
                lower_bound: "192.0.3.10".into(),
                upper_bound: "192.0.3.100".into(),
            }],
            prefix_pools: vec![],
        }];
        let hosts = vec![Host {
            id: HostId(1),
            subnet_id: Some(SubnetId(1)),
            identifiers: vec![],
            ip_reservations: vec![IpReservation {
                address: "192.0.3.5".into(),
                prefix_len: None,
            }],
            hostname: None,
        }];
        let mut overrides = OutOfPoolOverrides::default();
        overrides.subnet.insert(SubnetId(1), true);
        let context = ReviewContext {
            daemon: &daemon,
            shared_networks: &[],
            subnets: &subnets,
            hosts: &hosts,
            out_of_pool_overrides: overrides,
        };

        let checker = ReservationsOutOfPool;
        assert!(checker.run(&context).is_empty());
    }

    #[test]
    fn prefix_delegation_reservations_use_pd_pools() {
        let daemon = sample_daemon();
        let subnets = vec![Subnet {
            id: SubnetId(1),
            prefix: "2001:db8::/32".into(),
            family: Family::V6,
            shared_network_id: None,
            address_pools: vec![],
            prefix_pools: vec![PrefixPool {
                prefix: "2001:db8::".into(),
                prefix_len: 48,
                delegated_len: 64,
                excluded_prefix: None,
            }],
        }];
        let hosts = vec![Host {
            id: HostId(1),
            subnet_id: Some(SubnetId(1)),
            identifiers: vec![],
            ip_reservations: vec![IpReservation {
                address: "2001:db8:ffff::".into(),
                prefix_len: Some(64),
            }],
            hostname: None,
        }];
        let context = ctx(&daemon, &[], &subnets, &hosts);
        let checker = ReservationsOutOfPool;
        assert_eq!(checker.run(&context).len(), 1);
    }

    #[test]
    fn scenario_dispensable_shared_networks_combined_message() {
        let daemon = sample_daemon();
        let shared_networks = vec![
            SharedNetwork { id: SharedNetworkId(1), name: "empty-a".into(), family: Family::V4 },
            SharedNetwork { id: SharedNetworkId(2), name: "empty-b".into(), family: Family::V4 },
            SharedNetwork { id: SharedNetworkId(3), name: "single-a".into(), family: Family::V4 },
            SharedNetwork { id: SharedNetworkId(4), name: "single-b".into(), family: Family::V4 },
        ];
        let subnets = vec![
            Subnet {
                id: SubnetId(1),
                prefix: "10.0.0.0/24".into(),
                family: Family::V4,
                shared_network_id: Some(SharedNetworkId(3)),
                address_pools: vec![],
                prefix_pools: vec![],
            },
            Subnet {
                id: SubnetId(2),
                prefix: "10.0.1.0/24".into(),
                family: Family::V4,
                shared_network_id: Some(SharedNetworkId(4)),
                address_pools: vec![],
                prefix_pools: vec![],
            },
        ];
        let context = ctx(&daemon, &shared_networks, &subnets, &[]);
        let checker = SharedNetworkDispensable;
        let findings = checker.run(&context);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].message,
            "2 empty shared networks and 2 shared networks with only a single subnet"
        );
    }

    #[test]
    fn shared_network_with_two_subnets_is_not_flagged() {
        let daemon = sample_daemon();
        let shared_networks = vec![SharedNetwork {
            id: SharedNetworkId(1),
            name: "floor-1".into(),
            family: Family::V4,
        }];
        let subnets = vec![
            Subnet {
                id: SubnetId(1),
                prefix: "10.0.0.0/24".into(),
                family: Family::V4,
                shared_network_id: Some(SharedNetworkId(1)),
                address_pools: vec![AddressPool {
                    lower_bound: "10.0.0.10".into(),
                    upper_bound: "10.0.0.20".into(),
                }],
                prefix_pools: vec![],
            },
            Subnet {
                id: SubnetId(2),
                prefix: "10.0.1.0/24".into(),
                family: Family::V4,
                shared_network_id: Some(SharedNetworkId(1)),
                address_pools: vec![AddressPool {
                    lower_bound: "10.0.1.10".into(),
                    upper_bound: "10.0.1.20".into(),
                }],
                prefix_pools: vec![],
            },
        ];
        let context = ctx(&daemon, &shared_networks, &subnets, &[]);

        let findings = review(&context, DaemonId(1), "dhcp4", &default_checkers(), &HashMap::new(), &HashMap::new());
        assert!(!findings.iter().any(|f| f.checker == "shared_network_dispensable"));
    }
}
