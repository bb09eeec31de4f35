//! Runs the config-review checkers against a daemon's current inventory
//! and replaces its stored findings, floored at a generous interval since
//! review is cheap but its findings are meant to describe steady state,
//! not to chase every transient config change.
//!
//! Exposed as a free function as well as a [`Puller`] impl so a future
//! REST "review now" endpoint can trigger the exact same pass
//! synchronously, outside the scheduler.

use std::sync::Arc;
use std::time::Duration;

use stork_core::event_bus::EventBus;
use stork_core::model::{DaemonId, Event, Relations};
use stork_core::puller::{PullError, Puller};
use stork_core::review::{self, default_checkers, Finding, OutOfPoolOverrides, ReviewContext, Severity};

use crate::db::PgStore;
use crate::settings::SharedSettings;

pub struct ConfigReviewPuller {
    store: PgStore,
    events: Arc<EventBus>,
    settings: SharedSettings,
}

impl ConfigReviewPuller {
    pub fn new(store: PgStore, events: Arc<EventBus>, settings: SharedSettings) -> Self {
        Self { store, events, settings }
    }
}

impl Puller for ConfigReviewPuller {
    fn name(&self) -> &'static str {
        "config_review"
    }

    fn interval_setting_name(&self) -> &'static str {
        "config_review_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").config_review_interval()
    }

    fn pull(&self, daemon_id: DaemonId) -> Result<(), PullError> {
        run_review_for_daemon(&self.store, &self.events, daemon_id)
    }
}

/// Builds the review context for `daemon_id`, runs every enabled checker,
/// and replaces its stored config reports. Publishes one info event
/// summarizing the finding count so operators can see a review completed
/// without having to poll the reports endpoint.
pub fn run_review_for_daemon(store: &PgStore, events: &EventBus, daemon_id: DaemonId) -> Result<(), PullError> {
    let daemon = store.get_daemon(daemon_id).ok_or_else(|| PullError::Unreachable(daemon_id, "daemon not found".to_string()))?;
    let app = store.get_app(daemon.app_id).ok_or_else(|| PullError::Unreachable(daemon_id, "app not found".to_string()))?;
    let machine = store
        .get_machine(app.machine_id)
        .ok_or_else(|| PullError::Unreachable(daemon_id, "machine not found".to_string()))?;
    let display_name = format!("{}@{}", daemon_display_kind(daemon.name), machine.address);

    let local_subnets = store.local_subnets_of_daemon(daemon_id);
    let subnets: Vec<_> = local_subnets.iter().filter_map(|ls| store.get_subnet(ls.subnet_id)).collect();

    let mut seen_hosts = std::collections::HashSet::new();
    let mut hosts = Vec::new();
    for subnet in &subnets {
        let page = store.list_hosts(Some(subnet.id), &crate::db::Paging { offset: 0, limit: 10_000 });
        for host in page.items {
            if seen_hosts.insert(host.id) {
                hosts.push(host);
            }
        }
    }

    let shared_network_ids: std::collections::HashSet<_> = subnets.iter().filter_map(|s| s.shared_network_id).collect();
    let all_networks = store.list_shared_networks(None, &crate::db::Paging { offset: 0, limit: 10_000 });
    let shared_networks: Vec<_> = all_networks.items.into_iter().filter(|sn| shared_network_ids.contains(&sn.id)).collect();

    let ctx = ReviewContext {
        daemon: &daemon,
        shared_networks: &shared_networks,
        subnets: &subnets,
        hosts: &hosts,
        // No per-scope override has a storage path yet; every subnet and
        // shared network reviews against the checkers' own defaults.
        out_of_pool_overrides: OutOfPoolOverrides::default(),
    };

    let checkers = default_checkers();
    let (global, per_daemon) = store.checker_states();
    let findings = review::review(&ctx, daemon_id, &display_name, &checkers, &global, &per_daemon);

    let reports: Vec<(String, String)> = findings.iter().map(|f| (f.checker.to_string(), f.message.clone())).collect();
    store.replace_config_reports(daemon_id, &reports);

    publish_summary(store, events, daemon_id, &display_name, &findings);
    Ok(())
}

fn daemon_display_kind(name: stork_core::model::DaemonName) -> &'static str {
    use stork_core::model::DaemonName::*;
    match name {
        Dhcp4 => "dhcp4",
        Dhcp6 => "dhcp6",
        D2 => "d2",
        Ca => "ca",
        Netconf => "netconf",
        Named => "named",
    }
}

fn publish_summary(store: &PgStore, events: &EventBus, daemon_id: DaemonId, display_name: &str, findings: &[Finding]) {
    let warnings = findings.iter().filter(|f| f.severity == Severity::Warning).count();
    let text = if findings.is_empty() {
        format!("configuration review of {display_name} found no issues")
    } else {
        format!("configuration review of {display_name} found {} finding(s), {warnings} warning(s)", findings.len())
    };

    let draft = Event::info(0, chrono::Utc::now(), text).with_relations(Relations { daemon_id: Some(daemon_id), ..Default::default() });
    if let Ok(id) = store.record_event(&draft) {
        events.publish(Event { id, ..draft });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_display_kind_matches_control_channel_service_names() {
        assert_eq!(daemon_display_kind(stork_core::model::DaemonName::Dhcp4), "dhcp4");
        assert_eq!(daemon_display_kind(stork_core::model::DaemonName::Named), "named");
    }
}
