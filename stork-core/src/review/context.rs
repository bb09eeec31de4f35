use std::collections::HashMap;

use crate::model::{Daemon, Host, SharedNetwork, SharedNetworkId, Subnet, SubnetId};

/// Per-scope override of the `reservations-out-of-pool` boolean.
/// Resolution priority is subnet, then shared-network, then global, then
/// a built-in default of `false` (checked) — the same inheritance shape
/// as [`crate::review::controller::resolve`], just keyed by scope instead
/// of by daemon.
#[derive(Debug, Clone, Default)]
pub struct OutOfPoolOverrides {
    pub global: Option<bool>,
    pub shared_network: HashMap<SharedNetworkId, bool>,
    pub subnet: HashMap<SubnetId, bool>,
}

impl OutOfPoolOverrides {
    pub fn is_disabled_for(&self, subnet: &Subnet) -> bool {
        if let Some(v) = self.subnet.get(&subnet.id) {
            return *v;
        }
        if let Some(sn_id) = subnet.shared_network_id {
            if let Some(v) = self.shared_network.get(&sn_id) {
                return *v;
            }
        }
        self.global.unwrap_or(false)
    }
}

/// Everything a checker needs to inspect a single daemon's configuration:
/// the daemon itself plus the subnets, shared networks, and host
/// reservations currently known for it. Checkers never reach outside this
/// snapshot, which keeps them trivially testable with fixtures.
pub struct ReviewContext<'a> {
    pub daemon: &'a Daemon,
    pub shared_networks: &'a [SharedNetwork],
    pub subnets: &'a [Subnet],
    /// Host reservations known for this daemon from *either* its config
    /// file or (when `host_cmds` is loaded) the host database — the
    /// reconciliation layer already merges both into one view, so
    /// checkers never need to care which source a reservation came from.
    pub hosts: &'a [Host],
    pub out_of_pool_overrides: OutOfPoolOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub checker: &'static str,
    pub severity: Severity,
    /// May embed a literal `{daemon}` placeholder; substituted by
    /// [`crate::review::render_report`] right before handoff to the
    /// result sink, never by the checker itself.
    pub message: String,
}

impl Finding {
    pub fn new(checker: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            checker,
            severity,
            message: message.into(),
        }
    }
}

pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &ReviewContext) -> Vec<Finding>;
}
