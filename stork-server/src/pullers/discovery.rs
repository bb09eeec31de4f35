//! Full inventory discovery for one machine: liveness, detected apps, and
//! — for each Kea app — its daemons' subnets and config-file host
//! reservations, probed one Kea service at a time over the same agent
//! channel `GetState` used to enumerate apps in the first place.
//!
//! Run by [`super::machine_state::MachineStatePuller`] on its own
//! schedule, and once synchronously right after a machine is authorized
//! so its daemons exist in time for the next tick of the narrower,
//! per-daemon pullers (stats, host_cmds, HA, review) rather than waiting
//! a full interval for them to have anything to iterate over.

use stork_core::model::{AccessPoint, AccessPointKind, AppKind, DaemonId, DaemonName, MachineId};
use stork_core::puller::PullError;
use stork_core::reconcile::{self, ReportedApp, ReportedDaemon, ReportedInventory};
use stork_proto::agent::PingRequest;

use crate::db::{PgStore, Paging};

use super::client::AgentClientFactory;
use super::kea;

/// Not a real daemon — discovery runs before any daemon row exists for a
/// freshly-detected machine. Only used to label [`PullError`]s the same
/// way a per-daemon puller would.
const PRE_DISCOVERY: DaemonId = DaemonId(0);

pub fn discover_machine(store: &PgStore, clients: &AgentClientFactory, machine_id: MachineId) -> Result<(), PullError> {
    // Serializes the whole discover-then-commit sequence per machine
    // (spec.md §5): a second report for this machine arriving while one
    // is already being committed waits here rather than interleaving with
    // it.
    let machine_lock = store.lock_for_machine(machine_id);
    let _machine_guard = machine_lock.lock().expect("per-machine lock poisoned");

    let machine = store
        .get_machine(machine_id)
        .ok_or_else(|| PullError::Unreachable(PRE_DISCOVERY, "machine not found".to_string()))?;

    let mut client = clients.client_for_machine(machine_id, PRE_DISCOVERY)?;

    let reachable = store
        .block_on(client.ping(PingRequest { machine_id: machine_id.0 }))
        .map_err(|status| PullError::Unreachable(PRE_DISCOVERY, status.message().to_string()))?
        .into_inner()
        .reachable;

    if !reachable {
        store.record_machine_contact_error(machine_id, Some("agent ping reported unreachable"));
        return Err(PullError::Unreachable(PRE_DISCOVERY, "ping reported unreachable".to_string()));
    }

    let state = kea::get_state(store, &mut client, PRE_DISCOVERY, machine_id.0)?;
    store.record_machine_contact_error(machine_id, None);

    let mut apps = Vec::new();
    // (app index, daemon name) -> raw settings, written back after commit
    // assigns surrogate ids we can look up again by identity.
    let mut configs: Vec<(usize, DaemonName, serde_json::Value)> = Vec::new();

    for (app_index, detected) in state.apps.into_iter().enumerate() {
        let kind = if detected.kind == "bind9" { AppKind::Bind9 } else { AppKind::Kea };
        let access_points = detected.access_points.into_iter().map(to_access_point).collect::<Vec<_>>();

        let daemons = match kind {
            AppKind::Bind9 => vec![ReportedDaemon { name: DaemonName::Named, subnets: vec![], hosts: vec![] }],
            AppKind::Kea => probe_kea_daemons(store, &mut client, &access_points, app_index, &mut configs),
        };

        apps.push(ReportedApp { kind, access_points, daemons });
    }

    let inventory = ReportedInventory { address: machine.address.clone(), agent_port: machine.agent_port, apps };

    // The eight-step commit runs against one held transaction (spec.md
    // §4.E, §5): a `Conflict` partway through rolls the whole report back
    // rather than leaving machine/apps/daemons already committed with the
    // failing step's writes missing.
    let mut tx_store = store
        .begin_transaction()
        .map_err(|e| PullError::BadResponse(PRE_DISCOVERY, e.to_string()))?;
    match reconcile::commit(&mut tx_store, &inventory) {
        Ok(()) => {
            tx_store.commit().map_err(|e| PullError::BadResponse(PRE_DISCOVERY, e.to_string()))?;
        }
        Err(e) => {
            let _ = tx_store.rollback();
            return Err(PullError::BadResponse(PRE_DISCOVERY, e.to_string()));
        }
    }

    write_back_configs(store, machine_id, &inventory, configs);

    Ok(())
}

fn to_access_point(detected: stork_proto::agent::DetectedAccessPoint) -> AccessPoint {
    AccessPoint {
        kind: if detected.kind == "statistics" { AccessPointKind::Statistics } else { AccessPointKind::Control },
        address: detected.address,
        port: detected.port as u16,
        key: if detected.key.is_empty() { None } else { Some(detected.key) },
        use_secure_protocol: detected.use_secure_protocol,
    }
}

fn control_url(access_points: &[AccessPoint]) -> Option<String> {
    let ap = access_points.iter().find(|ap| ap.kind == AccessPointKind::Control)?;
    let scheme = if ap.use_secure_protocol { "https" } else { "http" };
    Some(format!("{scheme}://{}:{}/", ap.address, ap.port))
}

/// Probes `dhcp4` and `dhcp6` over the app's control channel: a Kea
/// Control Agent answers `config-get` for a service it fronts with
/// `result: 0`, and with a non-zero result (or simply declines to answer
/// for daemons it doesn't front) otherwise. Daemons that never answer are
/// never recorded — a deployment only ever has the Kea daemons it
/// actually runs.
fn probe_kea_daemons(
    store: &PgStore,
    client: &mut stork_proto::AgentServiceClient<tonic::transport::Channel>,
    access_points: &[AccessPoint],
    app_index: usize,
    configs: &mut Vec<(usize, DaemonName, serde_json::Value)>,
) -> Vec<ReportedDaemon> {
    let Some(url) = control_url(access_points) else {
        return vec![];
    };

    let mut daemons = Vec::new();
    for (service, name) in [("dhcp4", DaemonName::Dhcp4), ("dhcp6", DaemonName::Dhcp6)] {
        let result = kea::send_command(store, client, PRE_DISCOVERY, &url, "config-get", service, None);
        let Ok(result) = result else { continue };
        if result.code != 0 {
            continue;
        }
        let settings = super::kea_config::daemon_settings(name, &result.arguments);
        let subnets = super::kea_config::parse_subnets(name, &settings);
        let hosts = super::kea_config::parse_config_file_reservations(name, &settings);
        configs.push((app_index, name, settings));
        daemons.push(ReportedDaemon { name, subnets, hosts });
    }
    daemons
}

/// After `commit` has assigned surrogate ids, matches each probed Kea
/// daemon back up by `(control access point, daemon name)` — the same
/// identity the commit algorithm itself upserts by — and persists its raw
/// settings onto the `Daemon` row for the review engine to read later.
fn write_back_configs(
    store: &PgStore,
    machine_id: MachineId,
    inventory: &ReportedInventory,
    configs: Vec<(usize, DaemonName, serde_json::Value)>,
) {
    if configs.is_empty() {
        return;
    }
    let apps = store.list_apps(Some(machine_id), &Paging { offset: 0, limit: 1000 });
    for (app_index, daemon_name, settings) in configs {
        let Some(reported_app) = inventory.apps.get(app_index) else { continue };
        let Some(control) = reported_app.access_points.iter().find(|ap| ap.kind == AccessPointKind::Control) else {
            continue;
        };
        let Some(app) = apps.items.iter().find(|a| {
            a.control_access_point().map(|ap| (ap.address.as_str(), ap.port)) == Some((control.address.as_str(), control.port))
        }) else {
            continue;
        };
        let daemons = store.list_daemons_of_app(app.id);
        if let Some(daemon) = daemons.iter().find(|d| d.name == daemon_name) {
            store.record_daemon_config(daemon.id, &settings);
        }
    }
}
