//! Postgres-backed implementation of [`stork_core::store`]'s repository
//! traits, plus the read-side queries the REST layer needs that the core
//! commit algorithm itself never touches (listing, filtering, paging).
//!
//! The repository traits in `stork-core` are deliberately synchronous —
//! that is what lets the commit algorithm be unit-tested against
//! [`stork_core::store::InMemoryStore`] with no async runtime at all.
//! `sqlx` is async-only, so [`PgStore`] bridges the gap with a
//! stored [`tokio::runtime::Handle`] that `block_on`s each query. Callers
//! already on a Tokio worker thread (the REST handlers) must run the
//! whole commit inside `tokio::task::spawn_blocking` first — `block_on`
//! from within a runtime's own worker thread panics, but a dedicated
//! blocking-pool thread is exactly where `block_on` is meant to be used.
//! Puller threads are plain `std::thread`s, so they call straight through.

mod read;
mod tx;
mod write;

pub use read::*;
pub use tx::PgTxStore;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use stork_core::model::MachineId;
use tokio::runtime::Handle;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    rt: Handle,
    /// One mutex per machine, created on first use and shared by every
    /// clone of this `PgStore` (the map itself lives behind an `Arc`).
    /// Held for the duration of `discovery::discover_machine`'s commit so
    /// two reports for the same machine serialize rather than interleave,
    /// per spec.md §5.
    machine_locks: Arc<Mutex<HashMap<MachineId, Arc<Mutex<()>>>>>,
}

impl PgStore {
    pub fn new(pool: PgPool, rt: Handle) -> Self {
        Self { pool, rt, machine_locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    /// Returns the mutex guarding commits for `machine_id`, creating it on
    /// first use. Callers lock it for the full discover-then-commit
    /// sequence so a second report for the same machine waits rather than
    /// interleaving with the first.
    pub fn lock_for_machine(&self, machine_id: MachineId) -> Arc<Mutex<()>> {
        self.machine_locks
            .lock()
            .expect("machine lock map poisoned")
            .entry(machine_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub(crate) fn app_kind_str(kind: stork_core::model::AppKind) -> &'static str {
    match kind {
        stork_core::model::AppKind::Kea => "kea",
        stork_core::model::AppKind::Bind9 => "bind9",
    }
}

pub(crate) fn app_kind_from_str(s: &str) -> stork_core::model::AppKind {
    match s {
        "bind9" => stork_core::model::AppKind::Bind9,
        _ => stork_core::model::AppKind::Kea,
    }
}

pub(crate) fn daemon_name_str(name: stork_core::model::DaemonName) -> &'static str {
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

pub(crate) fn daemon_name_from_str(s: &str) -> stork_core::model::DaemonName {
    use stork_core::model::DaemonName::*;
    match s {
        "dhcp6" => Dhcp6,
        "d2" => D2,
        "ca" => Ca,
        "netconf" => Netconf,
        "named" => Named,
        _ => Dhcp4,
    }
}

pub(crate) fn family_i16(family: stork_core::model::Family) -> i16 {
    match family {
        stork_core::model::Family::V4 => 4,
        stork_core::model::Family::V6 => 6,
    }
}

pub(crate) fn family_from_i16(v: i16) -> stork_core::model::Family {
    if v == 6 {
        stork_core::model::Family::V6
    } else {
        stork_core::model::Family::V4
    }
}

pub(crate) fn access_point_kind_str(kind: stork_core::model::AccessPointKind) -> &'static str {
    match kind {
        stork_core::model::AccessPointKind::Control => "control",
        stork_core::model::AccessPointKind::Statistics => "statistics",
    }
}

pub(crate) fn access_point_kind_from_str(s: &str) -> stork_core::model::AccessPointKind {
    match s {
        "statistics" => stork_core::model::AccessPointKind::Statistics,
        _ => stork_core::model::AccessPointKind::Control,
    }
}

pub(crate) fn identifier_kind_str(kind: stork_core::model::IdentifierKind) -> &'static str {
    use stork_core::model::IdentifierKind::*;
    match kind {
        HwAddress => "hw-address",
        Duid => "duid",
        CircuitId => "circuit-id",
        ClientId => "client-id",
        Flex => "flex-id",
    }
}

pub(crate) fn identifier_kind_from_str(s: &str) -> stork_core::model::IdentifierKind {
    use stork_core::model::IdentifierKind::*;
    match s {
        "duid" => Duid,
        "circuit-id" => CircuitId,
        "client-id" => ClientId,
        "flex-id" => Flex,
        _ => HwAddress,
    }
}

pub(crate) fn host_data_source_str(source: stork_core::model::HostDataSource) -> &'static str {
    match source {
        stork_core::model::HostDataSource::ConfigFile => "config_file",
        stork_core::model::HostDataSource::HostCmds => "host_cmds",
    }
}

pub(crate) fn host_data_source_from_str(s: &str) -> stork_core::model::HostDataSource {
    match s {
        "host_cmds" => stork_core::model::HostDataSource::HostCmds,
        _ => stork_core::model::HostDataSource::ConfigFile,
    }
}

pub(crate) fn level_str(level: stork_core::model::Level) -> &'static str {
    match level {
        stork_core::model::Level::Info => "info",
        stork_core::model::Level::Warning => "warning",
        stork_core::model::Level::Error => "error",
    }
}

pub(crate) fn level_from_str(s: &str) -> stork_core::model::Level {
    match s {
        "warning" => stork_core::model::Level::Warning,
        "error" => stork_core::model::Level::Error,
        _ => stork_core::model::Level::Info,
    }
}

fn sqlx_to_core(err: sqlx::Error) -> stork_core::CoreError {
    match &err {
        sqlx::Error::RowNotFound => stork_core::CoreError::NotFound(err.to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            stork_core::CoreError::Conflict(db_err.to_string())
        }
        _ => stork_core::CoreError::Internal(err.to_string()),
    }
}
