//! Repository traits the reconciliation/commit layer is generic over,
//! split by aggregate into narrow load/store/delete trait bounds composed
//! at the call site rather than one monolithic persistence interface.
//! `stork-server` implements these against Postgres; [`InMemoryStore`] is
//! the in-memory fake the commit algorithm is tested against here, with
//! no database required.

use std::collections::{HashMap, HashSet};

use crate::error::CoreResult;
use crate::model::{
    AccessPoint, AddressPool, AppId, AppKind, DaemonId, DaemonName, Family, HostDataSource, HostId,
    HostIdentifier, IpReservation, MachineId, PrefixPool, SharedNetworkId, SubnetId,
};

pub trait MachineRepository {
    /// Upserts by `(address, agent_port)`, the machine's stable identity.
    fn upsert_machine(&mut self, address: &str, agent_port: u16) -> CoreResult<MachineId>;
}

pub trait AppRepository {
    /// Upserts by `(machine_id, kind, control_access_point.address,
    /// control_access_point.port)`.
    fn upsert_app(
        &mut self,
        machine_id: MachineId,
        kind: AppKind,
        control_point: &AccessPoint,
    ) -> CoreResult<AppId>;

    fn set_access_points(&mut self, app_id: AppId, access_points: Vec<AccessPoint>) -> CoreResult<()>;

    fn apps_of_machine(&self, machine_id: MachineId) -> Vec<AppId>;

    /// Deletes the app and, transitively, its daemons and their joins.
    fn delete_app(&mut self, app_id: AppId) -> CoreResult<()>;
}

pub trait DaemonRepository {
    /// Upserts by `(app_id, name)`. `monitored` is preserved across
    /// rediscoveries: a freshly-upserted daemon keeps whatever value it
    /// already had, defaulting to `true` only the first time it is seen.
    fn upsert_daemon(&mut self, app_id: AppId, name: DaemonName) -> CoreResult<DaemonId>;

    fn daemons_of_app(&self, app_id: AppId) -> Vec<DaemonId>;
}

pub trait SharedNetworkRepository {
    /// Upserts by `(name, family)`.
    fn upsert_shared_network(&mut self, name: &str, family: Family) -> CoreResult<SharedNetworkId>;
}

pub trait SubnetRepository {
    /// Upserts by normalized prefix scoped to family.
    fn upsert_subnet(
        &mut self,
        prefix: &str,
        family: Family,
        shared_network_id: Option<SharedNetworkId>,
    ) -> CoreResult<SubnetId>;

    /// Replaces the subnet's pool set wholesale: pool order carries no
    /// meaning, so this is a delete-then-insert rather than a diff.
    fn replace_pools(&mut self, subnet_id: SubnetId, address_pools: Vec<AddressPool>, prefix_pools: Vec<PrefixPool>);

    /// Upserts the `(subnet_id, daemon_id)` join, updating the daemon-local
    /// numeric id in place.
    fn upsert_local_subnet(&mut self, subnet_id: SubnetId, daemon_id: DaemonId, local_subnet_id: i32) -> CoreResult<()>;

    /// Removes every `LocalSubnet` for `daemon_id` whose `subnet_id` is not
    /// in `keep` — the per-daemon half of orphan pruning (step 7).
    fn prune_local_subnets(&mut self, daemon_id: DaemonId, keep: &HashSet<SubnetId>);

    /// Removes every subnet with no remaining `LocalSubnet` row at all and
    /// returns their ids — step 8 of the commit algorithm, run once after
    /// the whole report is committed.
    fn delete_orphaned_subnets(&mut self) -> Vec<SubnetId>;
}

pub trait HostRepository {
    /// Upserts by `(subnet_id, identifiers-set, data_source)`.
    fn upsert_host(
        &mut self,
        subnet_id: Option<SubnetId>,
        identifiers: &[HostIdentifier],
        ip_reservations: Vec<IpReservation>,
        hostname: Option<String>,
        data_source: HostDataSource,
    ) -> CoreResult<HostId>;

    /// Upserts the `(host_id, daemon_id)` join and its options blob,
    /// recomputing `options_hash`.
    fn upsert_local_host(
        &mut self,
        host_id: HostId,
        daemon_id: DaemonId,
        source: HostDataSource,
        options: serde_json::Value,
    ) -> CoreResult<()>;

    /// Removes every `LocalHost` for `daemon_id` whose `host_id` is not in
    /// `keep`.
    fn prune_local_hosts(&mut self, daemon_id: DaemonId, keep: &HashSet<HostId>);
}

/// Composes every narrow repository trait into the single bound the
/// commit algorithm requires. Anything implementing the five pieces gets
/// this for free.
pub trait ReconciliationStore:
    MachineRepository + AppRepository + DaemonRepository + SharedNetworkRepository + SubnetRepository + HostRepository
{
}

impl<T> ReconciliationStore for T where
    T: MachineRepository + AppRepository + DaemonRepository + SharedNetworkRepository + SubnetRepository + HostRepository
{
}

// --- In-memory fake, used by stork-core's own tests and available to
// stork-server for fixtures/smoke tests ahead of a real database. ---

#[derive(Debug, Clone, PartialEq)]
struct StoredApp {
    machine_id: MachineId,
    kind: AppKind,
    access_points: Vec<AccessPoint>,
}

#[derive(Debug, Clone, PartialEq)]
struct StoredDaemon {
    app_id: AppId,
    name: DaemonName,
    monitored: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct StoredSubnet {
    prefix: String,
    family: Family,
    shared_network_id: Option<SharedNetworkId>,
    address_pools: Vec<AddressPool>,
    prefix_pools: Vec<PrefixPool>,
}

#[derive(Debug, Clone, PartialEq)]
struct StoredHost {
    subnet_id: Option<SubnetId>,
    identifiers: Vec<HostIdentifier>,
    ip_reservations: Vec<IpReservation>,
    hostname: Option<String>,
    data_source: HostDataSource,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    next_id: i64,
    machines: HashMap<(String, u16), MachineId>,
    apps: HashMap<AppId, StoredApp>,
    app_keys: HashMap<(MachineId, AppKind, String, u16), AppId>,
    daemons: HashMap<DaemonId, StoredDaemon>,
    daemon_keys: HashMap<(AppId, DaemonName), DaemonId>,
    shared_networks: HashMap<(String, Family), SharedNetworkId>,
    subnets: HashMap<SubnetId, StoredSubnet>,
    subnet_keys: HashMap<(String, Family), SubnetId>,
    local_subnets: HashMap<(SubnetId, DaemonId), i32>,
    hosts: HashMap<HostId, StoredHost>,
    host_keys: HashMap<(Option<SubnetId>, Vec<HostIdentifier>, HostDataSource), HostId>,
    local_hosts: HashSet<(HostId, DaemonId)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn subnet_count(&self) -> usize {
        self.subnets.len()
    }

    pub fn local_subnet_count_for_daemon(&self, daemon_id: DaemonId) -> usize {
        self.local_subnets.keys().filter(|(_, d)| *d == daemon_id).count()
    }

    pub fn local_host_count_for_daemon(&self, daemon_id: DaemonId) -> usize {
        self.local_hosts.iter().filter(|(_, d)| *d == daemon_id).count()
    }

    pub fn daemon_monitored(&self, daemon_id: DaemonId) -> Option<bool> {
        self.daemons.get(&daemon_id).map(|d| d.monitored)
    }

    pub fn set_daemon_monitored(&mut self, daemon_id: DaemonId, monitored: bool) {
        if let Some(d) = self.daemons.get_mut(&daemon_id) {
            d.monitored = monitored;
        }
    }
}

impl MachineRepository for InMemoryStore {
    fn upsert_machine(&mut self, address: &str, agent_port: u16) -> CoreResult<MachineId> {
        let key = (address.to_string(), agent_port);
        if let Some(id) = self.machines.get(&key) {
            return Ok(*id);
        }
        let id = MachineId(self.next());
        self.machines.insert(key, id);
        Ok(id)
    }
}

impl AppRepository for InMemoryStore {
    fn upsert_app(&mut self, machine_id: MachineId, kind: AppKind, control_point: &AccessPoint) -> CoreResult<AppId> {
        let key = (machine_id, kind, control_point.address.clone(), control_point.port);
        if let Some(id) = self.app_keys.get(&key) {
            return Ok(*id);
        }
        let id = AppId(self.next());
        self.app_keys.insert(key, id);
        self.apps.insert(
            id,
            StoredApp {
                machine_id,
                kind,
                access_points: vec![control_point.clone()],
            },
        );
        Ok(id)
    }

    fn set_access_points(&mut self, app_id: AppId, access_points: Vec<AccessPoint>) -> CoreResult<()> {
        if let Some(app) = self.apps.get_mut(&app_id) {
            app.access_points = access_points;
        }
        Ok(())
    }

    fn apps_of_machine(&self, machine_id: MachineId) -> Vec<AppId> {
        self.apps
            .iter()
            .filter(|(_, a)| a.machine_id == machine_id)
            .map(|(id, _)| *id)
            .collect()
    }

    fn delete_app(&mut self, app_id: AppId) -> CoreResult<()> {
        self.apps.remove(&app_id);
        self.app_keys.retain(|_, id| *id != app_id);
        let daemon_ids: Vec<DaemonId> = self
            .daemons
            .iter()
            .filter(|(_, d)| d.app_id == app_id)
            .map(|(id, _)| *id)
            .collect();
        for daemon_id in daemon_ids {
            self.daemons.remove(&daemon_id);
            self.daemon_keys.retain(|_, id| *id != daemon_id);
            self.local_subnets.retain(|(_, d), _| *d != daemon_id);
            self.local_hosts.retain(|(_, d)| *d != daemon_id);
        }
        Ok(())
    }
}

impl DaemonRepository for InMemoryStore {
    fn upsert_daemon(&mut self, app_id: AppId, name: DaemonName) -> CoreResult<DaemonId> {
        let key = (app_id, name.clone());
        if let Some(id) = self.daemon_keys.get(&key) {
            return Ok(*id);
        }
        let id = DaemonId(self.next());
        self.daemon_keys.insert(key, id);
        self.daemons.insert(
            id,
            StoredDaemon {
                app_id,
                name,
                monitored: true,
            },
        );
        Ok(id)
    }

    fn daemons_of_app(&self, app_id: AppId) -> Vec<DaemonId> {
        self.daemons
            .iter()
            .filter(|(_, d)| d.app_id == app_id)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl SharedNetworkRepository for InMemoryStore {
    fn upsert_shared_network(&mut self, name: &str, family: Family) -> CoreResult<SharedNetworkId> {
        let key = (name.to_string(), family);
        if let Some(id) = self.shared_networks.get(&key) {
            return Ok(*id);
        }
        let id = SharedNetworkId(self.next());
        self.shared_networks.insert(key, id);
        Ok(id)
    }
}

impl SubnetRepository for InMemoryStore {
    fn upsert_subnet(&mut self, prefix: &str, family: Family, shared_network_id: Option<SharedNetworkId>) -> CoreResult<SubnetId> {
        let key = (prefix.to_string(), family);
        if let Some(id) = self.subnet_keys.get(&key) {
            if let Some(existing) = self.subnets.get_mut(id) {
                existing.shared_network_id = shared_network_id;
            }
            return Ok(*id);
        }
        let id = SubnetId(self.next());
        self.subnet_keys.insert(key, id);
        self.subnets.insert(
            id,
            StoredSubnet {
                prefix: prefix.to_string(),
                family,
                shared_network_id,
                address_pools: Vec::new(),
                prefix_pools: Vec::new(),
            },
        );
        Ok(id)
    }

    fn replace_pools(&mut self, subnet_id: SubnetId, address_pools: Vec<AddressPool>, prefix_pools: Vec<PrefixPool>) {
        if let Some(subnet) = self.subnets.get_mut(&subnet_id) {
            subnet.address_pools = address_pools;
            subnet.prefix_pools = prefix_pools;
        }
    }

    fn upsert_local_subnet(&mut self, subnet_id: SubnetId, daemon_id: DaemonId, local_subnet_id: i32) -> CoreResult<()> {
        self.local_subnets.insert((subnet_id, daemon_id), local_subnet_id);
        Ok(())
    }

    fn prune_local_subnets(&mut self, daemon_id: DaemonId, keep: &HashSet<SubnetId>) {
        self.local_subnets
            .retain(|(subnet_id, d), _| *d != daemon_id || keep.contains(subnet_id));
    }

    fn delete_orphaned_subnets(&mut self) -> Vec<SubnetId> {
        let live: HashSet<SubnetId> = self.local_subnets.keys().map(|(s, _)| *s).collect();
        let orphans: Vec<SubnetId> = self
            .subnets
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in &orphans {
            if let Some(subnet) = self.subnets.remove(id) {
                self.subnet_keys.remove(&(subnet.prefix, subnet.family));
            }
            self.hosts.retain(|_, h| h.subnet_id != Some(*id));
            self.host_keys.retain(|(subnet_id, _, _), _| *subnet_id != Some(*id));
        }
        orphans
    }
}

impl HostRepository for InMemoryStore {
    fn upsert_host(
        &mut self,
        subnet_id: Option<SubnetId>,
        identifiers: &[HostIdentifier],
        ip_reservations: Vec<IpReservation>,
        hostname: Option<String>,
        data_source: HostDataSource,
    ) -> CoreResult<HostId> {
        let mut ids = identifiers.to_vec();
        ids.sort_by(|a, b| (a.kind as u8, &a.value_hex).cmp(&(b.kind as u8, &b.value_hex)));
        let key = (subnet_id, ids, data_source);
        if let Some(id) = self.host_keys.get(&key) {
            if let Some(existing) = self.hosts.get_mut(id) {
                existing.ip_reservations = ip_reservations;
                existing.hostname = hostname;
            }
            return Ok(*id);
        }
        let id = HostId(self.next());
        self.host_keys.insert(key.clone(), id);
        self.hosts.insert(
            id,
            StoredHost {
                subnet_id,
                identifiers: key.1,
                ip_reservations,
                hostname,
                data_source,
            },
        );
        Ok(id)
    }

    fn upsert_local_host(&mut self, host_id: HostId, daemon_id: DaemonId, _source: HostDataSource, _options: serde_json::Value) -> CoreResult<()> {
        self.local_hosts.insert((host_id, daemon_id));
        Ok(())
    }

    fn prune_local_hosts(&mut self, daemon_id: DaemonId, keep: &HashSet<HostId>) {
        self.local_hosts.retain(|(host_id, d)| *d != daemon_id || keep.contains(host_id));
    }
}
