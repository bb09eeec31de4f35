//! The write side: [`PgStore`] implementing every repository trait the
//! commit algorithm is generic over, against the schema in
//! `migrations/20240101000000_initial.up.sql`.

use std::collections::HashSet;

use serde_json::json;
use stork_core::error::CoreResult;
use stork_core::model::{
    AccessPoint, AddressPool, AppId, AppKind, DaemonId, DaemonName, Family, HostDataSource, HostId,
    HostIdentifier, IpReservation, LocalHost, MachineId, PrefixPool, SharedNetworkId, SubnetId,
};
use stork_core::store::{AppRepository, DaemonRepository, HostRepository, MachineRepository, SharedNetworkRepository, SubnetRepository};

use super::{
    access_point_kind_str, app_kind_str, daemon_name_str, family_i16, host_data_source_str, identifier_kind_str,
    sqlx_to_core, PgStore,
};

impl MachineRepository for PgStore {
    fn upsert_machine(&mut self, address: &str, agent_port: u16) -> CoreResult<MachineId> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO machine (address, agent_port) VALUES ($1, $2) \
                     ON CONFLICT (address, agent_port) DO UPDATE SET address = EXCLUDED.address \
                     RETURNING id",
                )
                .bind(address)
                .bind(agent_port as i32)
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(MachineId(row.0))
    }
}

impl AppRepository for PgStore {
    fn upsert_app(&mut self, machine_id: MachineId, kind: AppKind, control_point: &AccessPoint) -> CoreResult<AppId> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO app (machine_id, kind, control_address, control_port) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (machine_id, kind, control_address, control_port) \
                     DO UPDATE SET kind = EXCLUDED.kind \
                     RETURNING id",
                )
                .bind(machine_id.0)
                .bind(app_kind_str(kind))
                .bind(&control_point.address)
                .bind(control_point.port as i32)
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
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
        self.block_on(
            sqlx::query("UPDATE app SET access_points = $2 WHERE id = $1")
                .bind(app_id.0)
                .bind(json!(encoded))
                .execute(&self.pool),
        )
        .map_err(sqlx_to_core)?;
        Ok(())
    }

    fn apps_of_machine(&self, machine_id: MachineId) -> Vec<AppId> {
        let rows: Vec<(i64,)> = self
            .block_on(
                sqlx::query_as("SELECT id FROM app WHERE machine_id = $1")
                    .bind(machine_id.0)
                    .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(|(id,)| AppId(id)).collect()
    }

    fn delete_app(&mut self, app_id: AppId) -> CoreResult<()> {
        // ON DELETE CASCADE on daemon/app covers the rest; local_subnet and
        // local_host cascade transitively through daemon.
        self.block_on(sqlx::query("DELETE FROM app WHERE id = $1").bind(app_id.0).execute(&self.pool))
            .map_err(sqlx_to_core)?;
        Ok(())
    }
}

impl DaemonRepository for PgStore {
    fn upsert_daemon(&mut self, app_id: AppId, name: DaemonName) -> CoreResult<DaemonId> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO daemon (app_id, name) VALUES ($1, $2) \
                     ON CONFLICT (app_id, name) DO UPDATE SET active = TRUE \
                     RETURNING id",
                )
                .bind(app_id.0)
                .bind(daemon_name_str(name))
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(DaemonId(row.0))
    }

    fn daemons_of_app(&self, app_id: AppId) -> Vec<DaemonId> {
        let rows: Vec<(i64,)> = self
            .block_on(
                sqlx::query_as("SELECT id FROM daemon WHERE app_id = $1")
                    .bind(app_id.0)
                    .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(|(id,)| DaemonId(id)).collect()
    }
}

impl SharedNetworkRepository for PgStore {
    fn upsert_shared_network(&mut self, name: &str, family: Family) -> CoreResult<SharedNetworkId> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO shared_network (name, family) VALUES ($1, $2) \
                     ON CONFLICT (name, family) DO UPDATE SET name = EXCLUDED.name \
                     RETURNING id",
                )
                .bind(name)
                .bind(family_i16(family))
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(SharedNetworkId(row.0))
    }
}

impl SubnetRepository for PgStore {
    fn upsert_subnet(&mut self, prefix: &str, family: Family, shared_network_id: Option<SharedNetworkId>) -> CoreResult<SubnetId> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO subnet (prefix, family, shared_network_id) VALUES ($1, $2, $3) \
                     ON CONFLICT (prefix, family) DO UPDATE SET shared_network_id = EXCLUDED.shared_network_id \
                     RETURNING id",
                )
                .bind(prefix)
                .bind(family_i16(family))
                .bind(shared_network_id.map(|id| id.0))
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(SubnetId(row.0))
    }

    fn replace_pools(&mut self, subnet_id: SubnetId, address_pools: Vec<AddressPool>, prefix_pools: Vec<PrefixPool>) {
        let _ = self.block_on(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM address_pool WHERE subnet_id = $1")
                .bind(subnet_id.0)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM prefix_pool WHERE subnet_id = $1")
                .bind(subnet_id.0)
                .execute(&mut *tx)
                .await?;
            for pool in &address_pools {
                sqlx::query("INSERT INTO address_pool (subnet_id, lower_bound, upper_bound) VALUES ($1, $2, $3)")
                    .bind(subnet_id.0)
                    .bind(&pool.lower_bound)
                    .bind(&pool.upper_bound)
                    .execute(&mut *tx)
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
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await
        });
    }

    fn upsert_local_subnet(&mut self, subnet_id: SubnetId, daemon_id: DaemonId, local_subnet_id: i32) -> CoreResult<()> {
        self.block_on(
            sqlx::query(
                "INSERT INTO local_subnet (subnet_id, daemon_id, local_subnet_id) VALUES ($1, $2, $3) \
                 ON CONFLICT (subnet_id, daemon_id) DO UPDATE SET local_subnet_id = EXCLUDED.local_subnet_id",
            )
            .bind(subnet_id.0)
            .bind(daemon_id.0)
            .bind(local_subnet_id)
            .execute(&self.pool),
        )
        .map_err(sqlx_to_core)?;
        Ok(())
    }

    fn prune_local_subnets(&mut self, daemon_id: DaemonId, keep: &HashSet<SubnetId>) {
        let keep_ids: Vec<i64> = keep.iter().map(|id| id.0).collect();
        let _ = self.block_on(
            sqlx::query("DELETE FROM local_subnet WHERE daemon_id = $1 AND NOT (subnet_id = ANY($2))")
                .bind(daemon_id.0)
                .bind(&keep_ids)
                .execute(&self.pool),
        );
    }

    fn delete_orphaned_subnets(&mut self) -> Vec<SubnetId> {
        let rows: Vec<(i64,)> = self
            .block_on(
                sqlx::query_as(
                    "DELETE FROM subnet WHERE id NOT IN (SELECT DISTINCT subnet_id FROM local_subnet) RETURNING id",
                )
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(|(id,)| SubnetId(id)).collect()
    }
}

impl HostRepository for PgStore {
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

        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
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
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(HostId(row.0))
    }

    fn upsert_local_host(&mut self, host_id: HostId, daemon_id: DaemonId, source: HostDataSource, options: serde_json::Value) -> CoreResult<()> {
        let options_hash = LocalHost::hash_options(&options);
        self.block_on(
            sqlx::query(
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
            .execute(&self.pool),
        )
        .map_err(sqlx_to_core)?;
        Ok(())
    }

    fn prune_local_hosts(&mut self, daemon_id: DaemonId, keep: &HashSet<HostId>) {
        let keep_ids: Vec<i64> = keep.iter().map(|id| id.0).collect();
        let _ = self.block_on(
            sqlx::query("DELETE FROM local_host WHERE daemon_id = $1 AND NOT (host_id = ANY($2))")
                .bind(daemon_id.0)
                .bind(&keep_ids)
                .execute(&self.pool),
        );
    }
}

impl PgStore {
    /// Scoped variant of [`HostRepository::prune_local_hosts`] used by the
    /// `host_cmds`-only puller: prunes just the reservations sourced from
    /// that puller, leaving `config_file`-sourced joins (owned by the
    /// discovery puller's own commit) untouched.
    pub fn prune_local_hosts_by_source(&self, daemon_id: DaemonId, source: HostDataSource, keep: &HashSet<HostId>) {
        let keep_ids: Vec<i64> = keep.iter().map(|id| id.0).collect();
        let _ = self.block_on(
            sqlx::query("DELETE FROM local_host WHERE daemon_id = $1 AND source = $2 AND NOT (host_id = ANY($3))")
                .bind(daemon_id.0)
                .bind(host_data_source_str(source))
                .bind(&keep_ids)
                .execute(&self.pool),
        );
    }
}
