//! A transaction-scoped mirror of [`super::write`]'s repository impls.
//! [`PgTxStore`] exists so [`stork_core::reconcile::commit`] runs its
//! eight steps against one held `sqlx::Transaction` instead of one
//! autocommitting statement per step, per spec.md §4.E ("runs in one ACID
//! transaction") and §5 ("all writes are atomic"). Every other write path
//! in this crate (agent registration's `upsert_machine`, the `kea_hosts`
//! puller's host upserts) is a single statement with no cross-step
//! atomicity to preserve, so it keeps going straight through the
//! pool-backed [`super::PgStore`] impls in `write.rs`.

use std::cell::RefCell;
use std::collections::HashSet;

use serde_json::json;
use sqlx::{Postgres, Transaction};
use stork_core::error::CoreResult;
use stork_core::model::{
    AccessPoint, AddressPool, AppId, AppKind, DaemonId, DaemonName, Family, HostDataSource, HostId,
    HostIdentifier, IpReservation, LocalHost, MachineId, PrefixPool, SharedNetworkId, SubnetId,
};
use stork_core::store::{
    AppRepository, DaemonRepository, HostRepository, MachineRepository, SharedNetworkRepository, SubnetRepository,
};
use tokio::runtime::Handle;

use super::{
    access_point_kind_str, app_kind_str, daemon_name_str, family_i16, host_data_source_str, identifier_kind_str,
    sqlx_to_core, PgStore,
};

/// Holds the one connection a single `reconcile::commit` call runs
/// against. The handful of `&self` lookups the commit algorithm needs
/// (e.g. `apps_of_machine`) still have to run a query against that same
/// connection, hence the `RefCell`; `&mut self` methods skip the runtime
/// borrow check with `RefCell::get_mut`.
pub struct PgTxStore {
    tx: RefCell<Transaction<'static, Postgres>>,
    rt: Handle,
}

impl PgStore {
    /// Opens the transaction a single `reconcile::commit` call will run
    /// every repository call against.
    pub fn begin_transaction(&self) -> CoreResult<PgTxStore> {
        let tx = self.block_on(self.pool.begin()).map_err(sqlx_to_core)?;
        Ok(PgTxStore { tx: RefCell::new(tx), rt: self.rt.clone() })
    }
}

impl PgTxStore {
    /// Commits the underlying transaction. Call once `reconcile::commit`
    /// has returned `Ok`.
    pub fn commit(self) -> CoreResult<()> {
        let PgTxStore { tx, rt } = self;
        rt.block_on(tx.into_inner().commit()).map_err(sqlx_to_core)
    }

    /// Rolls the underlying transaction back, undoing every step already
    /// applied. Call when `reconcile::commit` returns `Err` (e.g. a
    /// unique-constraint `Conflict` partway through), so the losing
    /// commit leaves no partial state behind.
    pub fn rollback(self) -> CoreResult<()> {
        let PgTxStore { tx, rt } = self;
        rt.block_on(tx.into_inner().rollback()).map_err(sqlx_to_core)
    }
}

impl MachineRepository for PgTxStore {
    fn upsert_machine(&mut self, address: &str, agent_port: u16) -> CoreResult<MachineId> {
        let fut = sqlx::query_as(
            "INSERT INTO machine (address, agent_port) VALUES ($1, $2) \
             ON CONFLICT (address, agent_port) DO UPDATE SET address = EXCLUDED.address \
             RETURNING id",
        )
        .bind(address)
        .bind(agent_port as i32)
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(MachineId(row.0))
    }
}

impl AppRepository for PgTxStore {
    fn upsert_app(&mut self, machine_id: MachineId, kind: AppKind, control_point: &AccessPoint) -> CoreResult<AppId> {
        let fut = sqlx::query_as(
            "INSERT INTO app (machine_id, kind, control_address, control_port) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (machine_id, kind, control_address, control_port) \
             DO UPDATE SET kind = EXCLUDED.kind \
             RETURNING id",
        )
        .bind(machine_id.0)
        .bind(app_kind_str(kind))
        .bind(&control_point.address)
        .bind(control_point.port as i32)
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(AppId(row.0))
    }

    fn set_access_points(&mut self, app_id: AppId, access_points: Vec<AccessPoint>) -> CoreResult<()> {
        let encoded: Vec<serde_json::Value> = access_points
            .iter()
            .map(|ap| {
                json!({
                    "kind": access_point_kind_str(ap.kind),
                    "address": ap.address,
                    "port": ap.port,
                    "key": ap.key,
                    "use_secure_protocol": ap.use_secure_protocol,
                })
            })
            .collect();
        let fut = sqlx::query("UPDATE app SET access_points = $2 WHERE id = $1")
            .bind(app_id.0)
            .bind(json!(encoded))
            .execute(self.tx.get_mut());
        self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(())
    }

    fn apps_of_machine(&self, machine_id: MachineId) -> Vec<AppId> {
        let mut guard = self.tx.borrow_mut();
        let fut = sqlx::query_as("SELECT id FROM app WHERE machine_id = $1")
            .bind(machine_id.0)
            .fetch_all(&mut *guard);
        let rows: Vec<(i64,)> = self.rt.block_on(fut).unwrap_or_default();
        rows.into_iter().map(|(id,)| AppId(id)).collect()
    }

    fn delete_app(&mut self, app_id: AppId) -> CoreResult<()> {
        // ON DELETE CASCADE on daemon/app covers the rest; local_subnet and
        // local_host cascade transitively through daemon.
        let fut = sqlx::query("DELETE FROM app WHERE id = $1").bind(app_id.0).execute(self.tx.get_mut());
        self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(())
    }
}

impl DaemonRepository for PgTxStore {
    fn upsert_daemon(&mut self, app_id: AppId, name: DaemonName) -> CoreResult<DaemonId> {
        let fut = sqlx::query_as(
            "INSERT INTO daemon (app_id, name) VALUES ($1, $2) \
             ON CONFLICT (app_id, name) DO UPDATE SET active = TRUE \
             RETURNING id",
        )
        .bind(app_id.0)
        .bind(daemon_name_str(name))
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(DaemonId(row.0))
    }

    fn daemons_of_app(&self, app_id: AppId) -> Vec<DaemonId> {
        let mut guard = self.tx.borrow_mut();
        let fut = sqlx::query_as("SELECT id FROM daemon WHERE app_id = $1")
            .bind(app_id.0)
            .fetch_all(&mut *guard);
        let rows: Vec<(i64,)> = self.rt.block_on(fut).unwrap_or_default();
        rows.into_iter().map(|(id,)| DaemonId(id)).collect()
    }
}

impl SharedNetworkRepository for PgTxStore {
    fn upsert_shared_network(&mut self, name: &str, family: Family) -> CoreResult<SharedNetworkId> {
        let fut = sqlx::query_as(
            "INSERT INTO shared_network (name, family) VALUES ($1, $2) \
             ON CONFLICT (name, family) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id",
        )
        .bind(name)
        .bind(family_i16(family))
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(SharedNetworkId(row.0))
    }
}

impl SubnetRepository for PgTxStore {
    fn upsert_subnet(&mut self, prefix: &str, family: Family, shared_network_id: Option<SharedNetworkId>) -> CoreResult<SubnetId> {
        let fut = sqlx::query_as(
            "INSERT INTO subnet (prefix, family, shared_network_id) VALUES ($1, $2, $3) \
             ON CONFLICT (prefix, family) DO UPDATE SET shared_network_id = EXCLUDED.shared_network_id \
             RETURNING id",
        )
        .bind(prefix)
        .bind(family_i16(family))
        .bind(shared_network_id.map(|id| id.0))
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(SubnetId(row.0))
    }

    /// Runs the delete-then-insert against the same held transaction
    /// rather than opening a sub-transaction of its own — a second
    /// `pool.begin()` here would borrow a different connection and commit
    /// independently of the outer one, defeating the point of this type.
    fn replace_pools(&mut self, subnet_id: SubnetId, address_pools: Vec<AddressPool>, prefix_pools: Vec<PrefixPool>) {
        let conn = self.tx.get_mut();
        let fut = async {
            sqlx::query("DELETE FROM address_pool WHERE subnet_id = $1")
                .bind(subnet_id.0)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM prefix_pool WHERE subnet_id = $1")
                .bind(subnet_id.0)
                .execute(&mut *conn)
                .await?;
            for pool in &address_pools {
                sqlx::query("INSERT INTO address_pool (subnet_id, lower_bound, upper_bound) VALUES ($1, $2, $3)")
                    .bind(subnet_id.0)
                    .bind(&pool.lower_bound)
                    .bind(&pool.upper_bound)
                    .execute(&mut *conn)
                    .await?;
            }
            for pool in &prefix_pools {
                sqlx::query(
                    "INSERT INTO prefix_pool (subnet_id, prefix, prefix_len, delegated_len, excluded_prefix) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(subnet_id.0)
                .bind(&pool.prefix)
                .bind(pool.prefix_len as i16)
                .bind(pool.delegated_len as i16)
                .bind(&pool.excluded_prefix)
                .execute(&mut *conn)
                .await?;
            }
            Ok::<(), sqlx::Error>(())
        };
        let _ = self.rt.block_on(fut);
    }

    fn upsert_local_subnet(&mut self, subnet_id: SubnetId, daemon_id: DaemonId, local_subnet_id: i32) -> CoreResult<()> {
        let fut = sqlx::query(
            "INSERT INTO local_subnet (subnet_id, daemon_id, local_subnet_id) VALUES ($1, $2, $3) \
             ON CONFLICT (subnet_id, daemon_id) DO UPDATE SET local_subnet_id = EXCLUDED.local_subnet_id",
        )
        .bind(subnet_id.0)
        .bind(daemon_id.0)
        .bind(local_subnet_id)
        .execute(self.tx.get_mut());
        self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(())
    }

    fn prune_local_subnets(&mut self, daemon_id: DaemonId, keep: &HashSet<SubnetId>) {
        let keep_ids: Vec<i64> = keep.iter().map(|id| id.0).collect();
        let fut = sqlx::query("DELETE FROM local_subnet WHERE daemon_id = $1 AND NOT (subnet_id = ANY($2))")
            .bind(daemon_id.0)
            .bind(&keep_ids)
            .execute(self.tx.get_mut());
        let _ = self.rt.block_on(fut);
    }

    fn delete_orphaned_subnets(&mut self) -> Vec<SubnetId> {
        let fut = sqlx::query_as("DELETE FROM subnet WHERE id NOT IN (SELECT DISTINCT subnet_id FROM local_subnet) RETURNING id")
            .fetch_all(self.tx.get_mut());
        let rows: Vec<(i64,)> = self.rt.block_on(fut).unwrap_or_default();
        rows.into_iter().map(|(id,)| SubnetId(id)).collect()
    }
}

impl HostRepository for PgTxStore {
    fn upsert_host(
        &mut self,
        subnet_id: Option<SubnetId>,
        identifiers: &[HostIdentifier],
        ip_reservations: Vec<IpReservation>,
        hostname: Option<String>,
        data_source: HostDataSource,
    ) -> CoreResult<HostId> {
        let mut sorted = identifiers.to_vec();
        sorted.sort_by(|a, b| (identifier_kind_str(a.kind), &a.value_hex).cmp(&(identifier_kind_str(b.kind), &b.value_hex)));
        let identifiers_json: Vec<serde_json::Value> = sorted
            .iter()
            .map(|ident| json!({"kind": identifier_kind_str(ident.kind), "value_hex": ident.value_hex}))
            .collect();
        let reservations_json: Vec<serde_json::Value> = ip_reservations
            .iter()
            .map(|r| json!({"address": r.address, "prefix_len": r.prefix_len}))
            .collect();

        let fut = sqlx::query_as(
            "INSERT INTO host (subnet_id, identifiers, ip_reservations, hostname, data_source) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (subnet_id, identifiers, data_source) \
             DO UPDATE SET ip_reservations = EXCLUDED.ip_reservations, hostname = EXCLUDED.hostname \
             RETURNING id",
        )
        .bind(subnet_id.map(|id| id.0))
        .bind(json!(identifiers_json))
        .bind(json!(reservations_json))
        .bind(&hostname)
        .bind(host_data_source_str(data_source))
        .fetch_one(self.tx.get_mut());
        let row: (i64,) = self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(HostId(row.0))
    }

    fn upsert_local_host(&mut self, host_id: HostId, daemon_id: DaemonId, source: HostDataSource, options: serde_json::Value) -> CoreResult<()> {
        let options_hash = LocalHost::hash_options(&options);
        let fut = sqlx::query(
            "INSERT INTO local_host (host_id, daemon_id, source, options, options_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (host_id, daemon_id) \
             DO UPDATE SET source = EXCLUDED.source, options = EXCLUDED.options, options_hash = EXCLUDED.options_hash",
        )
        .bind(host_id.0)
        .bind(daemon_id.0)
        .bind(host_data_source_str(source))
        .bind(options)
        .bind(options_hash)
        .execute(self.tx.get_mut());
        self.rt.block_on(fut).map_err(sqlx_to_core)?;
        Ok(())
    }

    fn prune_local_hosts(&mut self, daemon_id: DaemonId, keep: &HashSet<HostId>) {
        let keep_ids: Vec<i64> = keep.iter().map(|id| id.0).collect();
        let fut = sqlx::query("DELETE FROM local_host WHERE daemon_id = $1 AND NOT (host_id = ANY($2))")
            .bind(daemon_id.0)
            .bind(&keep_ids)
            .execute(self.tx.get_mut());
        let _ = self.rt.block_on(fut);
    }
}
