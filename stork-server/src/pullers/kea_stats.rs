//! Per-subnet lease statistics, via Kea's `statistic-get-all`, and the
//! fleet/shared-network utilization roll-up those statistics feed.
//!
//! Kea reports statistics as a flat map keyed `"subnet[<local-id>].<name>"`,
//! each value a list of `[value, timestamp]` samples (`statistic-get-all`
//! only ever returns the single most recent sample per key, but still
//! wraps it in a one-element array). There is no `regex` dependency here,
//! so the key is split by hand rather than matched against a pattern.

use std::time::Duration;

use chrono::Utc;
use stork_core::model::{AccessPointKind, DaemonId, DaemonName, SharedNetworkId, Subnet, SubnetId, SubnetStats};
use stork_core::puller::{PullError, Puller};
use stork_core::utilization::{self, SubnetContribution};

use crate::db::PgStore;
use crate::settings::SharedSettings;

use super::client::AgentClientFactory;
use super::kea;

pub struct KeaStatsPuller {
    store: PgStore,
    clients: AgentClientFactory,
    settings: SharedSettings,
}

impl KeaStatsPuller {
    pub fn new(store: PgStore, clients: AgentClientFactory, settings: SharedSettings) -> Self {
        Self { store, clients, settings }
    }
}

fn kea_service_name(name: DaemonName) -> Option<&'static str> {
    match name {
        DaemonName::Dhcp4 => Some("dhcp4"),
        DaemonName::Dhcp6 => Some("dhcp6"),
        _ => None,
    }
}

impl Puller for KeaStatsPuller {
    fn name(&self) -> &'static str {
        "kea_stats"
    }

    fn interval_setting_name(&self) -> &'static str {
        "kea_stats_puller_interval"
    }

    fn interval(&self) -> Option<Duration> {
        self.settings.read().expect("settings lock poisoned").kea_stats_interval()
    }

    fn pull(&self, daemon_id: DaemonId) -> Result<(), PullError> {
        let daemon = self
            .store
            .get_daemon(daemon_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "daemon not found".to_string()))?;
        let Some(service) = kea_service_name(daemon.name) else {
            return Ok(());
        };
        let app = self
            .store
            .get_app(daemon.app_id)
            .ok_or_else(|| PullError::Unreachable(daemon_id, "app not found".to_string()))?;
        let Some(control) = app.access_points.iter().find(|ap| ap.kind == AccessPointKind::Control) else {
            return Ok(());
        };
        let scheme = if control.use_secure_protocol { "https" } else { "http" };
        let url = format!("{scheme}://{}:{}/", control.address, control.port);

        let mut client = self.clients.client_for(daemon_id)?;
        let result = kea::send_command(&self.store, &mut client, daemon_id, &url, "statistic-get-all", service, None)?;
        if result.code != 0 {
            return Ok(());
        }

        let by_local_id = split_by_local_subnet(&result.arguments);
        let local_subnets = self.store.local_subnets_of_daemon(daemon_id);
        let collected_at = Utc::now();

        for local_subnet in &local_subnets {
            let Some(stats) = by_local_id.get(&local_subnet.local_subnet_id) else {
                continue;
            };
            self.store.record_local_subnet_stats(local_subnet.subnet_id, daemon_id, stats, collected_at);
        }

        self.recompute_utilization();
        Ok(())
    }
}

impl KeaStatsPuller {
    /// Folds every subnet's latest stored sample into fleet and
    /// shared-network totals and writes the per-scope results back. Run
    /// after every stats pull rather than left to the `/metrics` scrape,
    /// so the REST API's shared-network listing stays current even when
    /// nobody is scraping metrics.
    fn recompute_utilization(&self) {
        let subnets: Vec<Subnet> = self.store.all_subnets_for_metrics();
        let stats_by_subnet = self.store.latest_stats_per_subnet();
        let empty = SubnetStats::default();
        let contributions: Vec<SubnetContribution> = subnets
            .iter()
            .map(|subnet| SubnetContribution { subnet, stats: stats_by_subnet.get(&subnet.id).unwrap_or(&empty) })
            .collect();
        let (by_shared_network, _fleet) = utilization::aggregate(contributions);

        let shared_network_ids: std::collections::HashSet<SharedNetworkId> =
            subnets.iter().filter_map(|s| s.shared_network_id).collect();
        for id in shared_network_ids {
            let totals = by_shared_network.get(&id);
            let addr = totals.and_then(|t| t.addr_utilization_permille_x10()).map(|v| v as i16);
            let pd = totals.and_then(|t| t.pd_utilization_permille_x10()).map(|v| v as i16);
            self.store.set_shared_network_utilization(id, addr, pd);
        }
    }
}

/// Splits Kea's flat `"subnet[<id>].<name>"` statistics map into one
/// [`SubnetStats`] per local subnet id. Keys that don't match the
/// `subnet[N].*` shape (global counters like `pkt4-received`) are ignored.
fn split_by_local_subnet(arguments: &serde_json::Value) -> std::collections::HashMap<i32, SubnetStats> {
    let mut by_id: std::collections::HashMap<i32, SubnetStats> = std::collections::HashMap::new();
    let Some(map) = arguments.as_object() else {
        return by_id;
    };

    for (key, value) in map {
        let Some(rest) = key.strip_prefix("subnet[") else { continue };
        let Some((id_str, stat_name)) = rest.split_once("].") else { continue };
        let Ok(local_subnet_id) = id_str.parse::<i32>() else { continue };
        let Some(stat_value) = latest_sample(value) else { continue };
        by_id.entry(local_subnet_id).or_default().set(stat_name.to_string(), stat_value);
    }

    by_id
}

/// Kea reports each statistic as `[[value, timestamp], ...]`; only the
/// first (most recent) sample is kept. Parsed through `StatValue`'s own
/// `Deserialize` rather than `as_i64`, since a 64-bit counter like
/// `total-nas` on a `/64` is `2^64` and overflows both `i64` and `u64`;
/// going through `StatValue` keeps the value as a `BigInt` instead of
/// silently dropping the sample.
fn latest_sample(value: &serde_json::Value) -> Option<stork_core::model::StatValue> {
    let sample = value.as_array()?.first()?;
    let raw = sample.as_array()?.first()?;
    serde_json::from_value(raw.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_flat_stats_map_by_subnet_id() {
        let arguments = serde_json::json!({
            "subnet[1].total-addresses": [[100, "2024-01-01 00:00:00.000000"]],
            "subnet[1].assigned-addresses": [[42, "2024-01-01 00:00:00.000000"]],
            "subnet[2].total-addresses": [[50, "2024-01-01 00:00:00.000000"]],
            "pkt4-received": [[12345, "2024-01-01 00:00:00.000000"]],
        });
        let by_id = split_by_local_subnet(&arguments);
        assert_eq!(by_id.len(), 2);
        assert_eq!(
            by_id[&1].get(stork_core::model::stats::TOTAL_ADDRESSES),
            stork_core::model::StatValue::from_i64(100)
        );
        assert_eq!(
            by_id[&1].get(stork_core::model::stats::ASSIGNED_ADDRESSES),
            stork_core::model::StatValue::from_i64(42)
        );
        assert_eq!(
            by_id[&2].get(stork_core::model::stats::TOTAL_ADDRESSES),
            stork_core::model::StatValue::from_i64(50)
        );
    }

    #[test]
    fn malformed_keys_are_ignored() {
        let arguments = serde_json::json!({
            "subnet[abc].total-addresses": [[1, "t"]],
            "not-a-subnet-key": [[1, "t"]],
        });
        assert!(split_by_local_subnet(&arguments).is_empty());
    }

    #[test]
    fn stat_values_beyond_i64_range_are_kept() {
        // 2^64: a realistic `total-nas` count for an IPv6 /64, overflows
        // both i64 and u64.
        let huge = "18446744073709551616";
        let arguments: serde_json::Value =
            serde_json::from_str(&format!(r#"{{"subnet[7].total-nas": [[{huge}, "t"]]}}"#)).unwrap();
        let by_id = split_by_local_subnet(&arguments);
        let expected: stork_core::model::StatValue = serde_json::from_str(&format!("\"{huge}\"")).unwrap();
        assert_eq!(by_id[&7].get(stork_core::model::stats::TOTAL_NAS), expected);
    }
}
