//! The commit algorithm: idempotent persistence of an agent-reported
//! inventory into the store. Runs as a single logical transaction per
//! machine (the repository traits in [`crate::store`] are expected to be
//! backed by a real database transaction in `stork-server`; the
//! in-memory fake commits synchronously with no rollback needed since
//! every step here is infallible once validated).

use std::collections::HashSet;

use crate::error::CoreResult;
use crate::model::{
    AccessPoint, AddressPool, AppKind, DaemonId, DaemonName, Family, HostDataSource, HostId,
    HostIdentifier, IpReservation, PrefixPool, SubnetId,
};
use crate::store::ReconciliationStore;

/// One app as reported fresh by an agent: not yet assigned surrogate ids.
#[derive(Debug, Clone)]
pub struct ReportedApp {
    pub kind: AppKind,
    pub access_points: Vec<AccessPoint>,
    pub daemons: Vec<ReportedDaemon>,
}

#[derive(Debug, Clone)]
pub struct ReportedDaemon {
    pub name: DaemonName,
    pub subnets: Vec<ReportedSubnet>,
    pub hosts: Vec<ReportedHost>,
}

#[derive(Debug, Clone)]
pub struct ReportedSubnet {
    pub prefix: String,
    pub family: Family,
    pub shared_network_name: Option<String>,
    pub address_pools: Vec<AddressPool>,
    pub prefix_pools: Vec<PrefixPool>,
    /// The daemon's own numbering for this subnet (Kea's `id`), carried on
    /// the `LocalSubnet` join rather than the subnet itself since two
    /// daemons serving the same subnet may number it differently.
    pub local_subnet_id: i32,
}

#[derive(Debug, Clone)]
pub struct ReportedHost {
    /// `None` when the reservation is global (not scoped to a subnet); a
    /// subnet is matched to an already-committed subnet by prefix, since
    /// subnets are committed before hosts within the same report.
    pub subnet_prefix: Option<String>,
    pub identifiers: Vec<HostIdentifier>,
    pub ip_reservations: Vec<IpReservation>,
    pub hostname: Option<String>,
    pub data_source: HostDataSource,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ReportedInventory {
    pub address: String,
    pub agent_port: u16,
    pub apps: Vec<ReportedApp>,
}

/// Commits one agent's reported inventory in full: machine, apps,
/// daemons, shared networks, subnets, hosts, and their join rows, then
/// prunes orphans. Steps follow the eight-step algorithm: upsert
/// machine; upsert/delete apps; upsert daemons; upsert shared networks;
/// upsert subnets and replace their pools; upsert hosts; attach
/// `LocalSubnet`/`LocalHost` joins and prune stale ones; finally delete
/// subnets left with no `LocalSubnet` at all.
///
/// Idempotent: committing the same `inventory` twice leaves the store in
/// the same observable state as committing it once.
pub fn commit(store: &mut impl ReconciliationStore, inventory: &ReportedInventory) -> CoreResult<()> {
    let machine_id = store.upsert_machine(&inventory.address, inventory.agent_port)?;

    let mut seen_app_keys = HashSet::new();
    for reported_app in &inventory.apps {
        let Some(control_point) = reported_app
            .access_points
            .iter()
            .find(|ap| ap.kind == crate::model::AccessPointKind::Control)
        else {
            // No control access point means the app cannot be identified;
            // skip rather than fail the whole commit.
            continue;
        };

        let app_id = store.upsert_app(machine_id, reported_app.kind, control_point)?;
        store.set_access_points(app_id, reported_app.access_points.clone())?;
        seen_app_keys.insert(app_id);

        for reported_daemon in &reported_app.daemons {
            let daemon_id = store.upsert_daemon(app_id, reported_daemon.name.clone())?;
            commit_daemon_subnets_and_hosts(store, daemon_id, reported_daemon)?;
        }
    }

    // Step 2's back half: delete apps of the machine not seen in this
    // report.
    for app_id in store.apps_of_machine(machine_id) {
        if !seen_app_keys.contains(&app_id) {
            store.delete_app(app_id)?;
        }
    }

    // Step 8: prune subnets with no surviving LocalSubnet at all, across
    // every daemon, not just the ones touched by this report.
    store.delete_orphaned_subnets();

    Ok(())
}

fn commit_daemon_subnets_and_hosts(
    store: &mut impl ReconciliationStore,
    daemon_id: DaemonId,
    reported_daemon: &ReportedDaemon,
) -> CoreResult<()> {
    let mut subnet_ids_by_prefix = std::collections::HashMap::new();
    let mut kept_subnets = HashSet::new();

    for reported_subnet in &reported_daemon.subnets {
        let shared_network_id = match &reported_subnet.shared_network_name {
            Some(name) => Some(store.upsert_shared_network(name, reported_subnet.family)?),
            None => None,
        };
        let subnet_id = store.upsert_subnet(&reported_subnet.prefix, reported_subnet.family, shared_network_id)?;
        store.replace_pools(
            subnet_id,
            reported_subnet.address_pools.clone(),
            reported_subnet.prefix_pools.clone(),
        );
        store.upsert_local_subnet(subnet_id, daemon_id, reported_subnet.local_subnet_id)?;
        subnet_ids_by_prefix.insert(reported_subnet.prefix.clone(), subnet_id);
        kept_subnets.insert(subnet_id);
    }
    store.prune_local_subnets(daemon_id, &kept_subnets);

    let mut kept_hosts: HashSet<HostId> = HashSet::new();
    for reported_host in &reported_daemon.hosts {
        let subnet_id: Option<SubnetId> = match &reported_host.subnet_prefix {
            Some(prefix) => subnet_ids_by_prefix.get(prefix).copied(),
            None => None,
        };
        let host_id = store.upsert_host(
            subnet_id,
            &reported_host.identifiers,
            reported_host.ip_reservations.clone(),
            reported_host.hostname.clone(),
            reported_host.data_source,
        )?;
        store.upsert_local_host(host_id, daemon_id, reported_host.data_source, reported_host.options.clone())?;
        kept_hosts.insert(host_id);
    }
    store.prune_local_hosts(daemon_id, &kept_hosts);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessPointKind, IdentifierKind};
    use crate::store::InMemoryStore;

    fn control_point(port: u16) -> AccessPoint {
        AccessPoint {
            kind: AccessPointKind::Control,
            address: "127.0.0.1".into(),
            port,
            key: None,
            use_secure_protocol: false,
        }
    }

    fn sample_inventory() -> ReportedInventory {
        ReportedInventory {
            address: "10.0.0.5".into(),
            agent_port: 8080,
            apps: vec![ReportedApp {
                kind: AppKind::Kea,
                access_points: vec![control_point(8000)],
                daemons: vec![ReportedDaemon {
                    name: DaemonName::Dhcp4,
                    subnets: vec![ReportedSubnet {
                        prefix: "192.0.2.0/24".into(),
                        family: Family::V4,
                        shared_network_name: Some("floor-1".into()),
                        address_pools: vec![AddressPool {
                            lower_bound: "192.0.2.10".into(),
                            upper_bound: "192.0.2.20".into(),
                        }],
                        prefix_pools: vec![],
                        local_subnet_id: 1,
                    }],
                    hosts: vec![ReportedHost {
                        subnet_prefix: Some("192.0.2.0/24".into()),
                        identifiers: vec![HostIdentifier {
                            kind: IdentifierKind::HwAddress,
                            value_hex: "aabbccddeeff".into(),
                        }],
                        ip_reservations: vec![],
                        hostname: Some("printer".into()),
                        data_source: HostDataSource::ConfigFile,
                        options: serde_json::json!({}),
                    }],
                }],
            }],
        }
    }

    #[test]
    fn commit_is_idempotent() {
        let mut store = InMemoryStore::new();
        let inventory = sample_inventory();
        commit(&mut store, &inventory).unwrap();
        let subnets_after_first = store.subnet_count();
        commit(&mut store, &inventory).unwrap();
        assert_eq!(store.subnet_count(), subnets_after_first);
        assert_eq!(store.subnet_count(), 1);
    }

    #[test]
    fn second_commit_without_the_subnet_prunes_it() {
        let mut store = InMemoryStore::new();
        let mut inventory = sample_inventory();
        commit(&mut store, &inventory).unwrap();
        assert_eq!(store.subnet_count(), 1);

        inventory.apps[0].daemons[0].subnets.clear();
        inventory.apps[0].daemons[0].hosts.clear();
        commit(&mut store, &inventory).unwrap();
        assert_eq!(store.subnet_count(), 0, "orphaned subnet must be pruned");
    }

    #[test]
    fn deleting_an_app_not_seen_again_cascades_joins() {
        let mut store = InMemoryStore::new();
        let inventory = sample_inventory();
        commit(&mut store, &inventory).unwrap();

        let empty = ReportedInventory {
            address: inventory.address.clone(),
            agent_port: inventory.agent_port,
            apps: vec![],
        };
        commit(&mut store, &empty).unwrap();
        assert_eq!(store.subnet_count(), 0);
    }

    #[test]
    fn monitored_flag_is_preserved_across_rediscovery() {
        let mut store = InMemoryStore::new();
        let inventory = sample_inventory();
        commit(&mut store, &inventory).unwrap();

        let machine_id = store.upsert_machine(&inventory.address, inventory.agent_port).unwrap();
        let app_id = store.apps_of_machine(machine_id)[0];
        let daemon_id = store.daemons_of_app(app_id)[0];
        store.set_daemon_monitored(daemon_id, false);

        commit(&mut store, &inventory).unwrap();
        assert_eq!(store.daemon_monitored(daemon_id), Some(false));
    }
}
