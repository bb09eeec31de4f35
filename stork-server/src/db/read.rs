//! Read-side queries the REST layer needs and the commit algorithm never
//! touches: listing, filtering and paging over the fleet inventory, plus
//! the handful of supplementary tables (`ha_status`, `checker_state`,
//! `config_report`, `event`) that live alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stork_core::model::{
    AccessPoint, AddressPool, App, AppId, Daemon, DaemonId, Event, Family, HaRole, HaStatus, HaState, Host, HostId,
    HostIdentifier, IpReservation, Level, LocalSubnet, Machine, MachineId, PrefixPool, Relations, SharedNetwork,
    SharedNetworkId, Subnet, SubnetId, SubnetStats,
};

use super::{
    access_point_kind_from_str, app_kind_from_str, daemon_name_from_str, family_from_i16, identifier_kind_from_str,
    level_from_str, level_str, sqlx_to_core, PgStore,
};

/// Shared shape for every paged list endpoint: `{items, total}`.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
}

impl Paging {
    pub(crate) fn bounded_limit(&self) -> i64 {
        if self.limit <= 0 {
            50
        } else {
            self.limit.min(1000)
        }
    }
}

impl PgStore {
    // --- machines ---

    pub fn list_machines(&self, authorized: Option<bool>, paging: &Paging) -> Page<Machine> {
        let limit = paging.bounded_limit();
        let rows: Vec<MachineRow> = self
            .block_on(async {
                match authorized {
                    Some(value) => {
                        sqlx::query_as::<_, MachineRow>(
                            "SELECT id, address, agent_port, authorized, last_contact_error, agent_token_fingerprint \
                             FROM machine WHERE authorized = $1 ORDER BY id LIMIT $2 OFFSET $3",
                        )
                        .bind(value)
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, MachineRow>(
                            "SELECT id, address, agent_port, authorized, last_contact_error, agent_token_fingerprint \
                             FROM machine ORDER BY id LIMIT $1 OFFSET $2",
                        )
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                }
            })
            .unwrap_or_default();

        let total: (i64,) = self
            .block_on(async {
                match authorized {
                    Some(value) => {
                        sqlx::query_as("SELECT count(*) FROM machine WHERE authorized = $1")
                            .bind(value)
                            .fetch_one(&self.pool)
                            .await
                    }
                    None => sqlx::query_as("SELECT count(*) FROM machine").fetch_one(&self.pool).await,
                }
            })
            .unwrap_or((0,));

        Page {
            items: rows.into_iter().map(MachineRow::into_model).collect(),
            total: total.0,
        }
    }

    /// `(authorized, unauthorized, unreachable)` machine counts for the
    /// metrics collector, read in one round trip so a scrape never blends
    /// counts taken at different instants.
    pub fn machine_counts(&self) -> (i64, i64, i64) {
        let row: (i64, i64, i64) = self
            .block_on(
                sqlx::query_as(
                    "SELECT \
                       count(*) FILTER (WHERE authorized), \
                       count(*) FILTER (WHERE NOT authorized), \
                       count(*) FILTER (WHERE last_contact_error IS NOT NULL) \
                     FROM machine",
                )
                .fetch_one(&self.pool),
            )
            .unwrap_or((0, 0, 0));
        row
    }

    pub fn get_machine(&self, id: MachineId) -> Option<Machine> {
        let row: Option<MachineRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT id, address, agent_port, authorized, last_contact_error, agent_token_fingerprint \
                     FROM machine WHERE id = $1",
                )
                .bind(id.0)
                .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(MachineRow::into_model)
    }

    pub fn set_machine_authorized(&self, id: MachineId, authorized: bool) -> stork_core::CoreResult<()> {
        self.block_on(
            sqlx::query("UPDATE machine SET authorized = $2 WHERE id = $1")
                .bind(id.0)
                .bind(authorized)
                .execute(&self.pool),
        )
        .map_err(sqlx_to_core)?;
        Ok(())
    }

    pub fn get_agent_certificate(&self, id: MachineId) -> Option<String> {
        let row: Option<(Option<String>,)> = self
            .block_on(
                sqlx::query_as("SELECT agent_cert_pem FROM machine WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.and_then(|(pem,)| pem)
    }

    pub fn record_machine_contact_error(&self, id: MachineId, error: Option<&str>) {
        let _ = self.block_on(
            sqlx::query("UPDATE machine SET last_contact_error = $2 WHERE id = $1")
                .bind(id.0)
                .bind(error),
        );
    }

    // --- apps ---

    pub fn list_apps(&self, machine_id: Option<MachineId>, paging: &Paging) -> Page<App> {
        let limit = paging.bounded_limit();
        let rows: Vec<AppRow> = self
            .block_on(async {
                match machine_id {
                    Some(mid) => {
                        sqlx::query_as::<_, AppRow>(
                            "SELECT id, machine_id, kind, access_points FROM app \
                             WHERE machine_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
                        )
                        .bind(mid.0)
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, AppRow>(
                            "SELECT id, machine_id, kind, access_points FROM app ORDER BY id LIMIT $1 OFFSET $2",
                        )
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                }
            })
            .unwrap_or_default();

        let total: (i64,) = self
            .block_on(async {
                match machine_id {
                    Some(mid) => {
                        sqlx::query_as("SELECT count(*) FROM app WHERE machine_id = $1")
                            .bind(mid.0)
                            .fetch_one(&self.pool)
                            .await
                    }
                    None => sqlx::query_as("SELECT count(*) FROM app").fetch_one(&self.pool).await,
                }
            })
            .unwrap_or((0,));

        Page {
            items: rows.into_iter().map(AppRow::into_model).collect(),
            total: total.0,
        }
    }

    pub fn get_app(&self, id: AppId) -> Option<App> {
        let row: Option<AppRow> = self
            .block_on(
                sqlx::query_as("SELECT id, machine_id, kind, access_points FROM app WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(AppRow::into_model)
    }

    // --- daemons ---

    pub fn list_daemons_of_app(&self, app_id: AppId) -> Vec<Daemon> {
        let rows: Vec<DaemonRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT id, app_id, name, active, monitored, version, uptime_seconds, reloaded_at, \
                     last_error, reload_count, config FROM daemon WHERE app_id = $1 ORDER BY id",
                )
                .bind(app_id.0)
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(DaemonRow::into_model).collect()
    }

    pub fn get_daemon(&self, id: DaemonId) -> Option<Daemon> {
        let row: Option<DaemonRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT id, app_id, name, active, monitored, version, uptime_seconds, reloaded_at, \
                     last_error, reload_count, config FROM daemon WHERE id = $1",
                )
                .bind(id.0)
                .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(DaemonRow::into_model)
    }

    /// Every monitored daemon id, fed to the puller scheduler on each tick
    /// so a newly-discovered daemon is picked up without a restart.
    pub fn all_daemon_ids(&self) -> Vec<DaemonId> {
        let rows: Vec<(i64,)> = self
            .block_on(sqlx::query_as("SELECT id FROM daemon WHERE monitored = TRUE").fetch_all(&self.pool))
            .unwrap_or_default();
        rows.into_iter().map(|(id,)| DaemonId(id)).collect()
    }

    pub fn set_daemon_monitored(&self, id: DaemonId, monitored: bool) -> stork_core::CoreResult<()> {
        self.block_on(
            sqlx::query("UPDATE daemon SET monitored = $2 WHERE id = $1")
                .bind(id.0)
                .bind(monitored)
                .execute(&self.pool),
        )
        .map_err(sqlx_to_core)?;
        Ok(())
    }

    /// Overwrites a daemon's opaque configuration blob, fetched fresh on
    /// every discovery pull. The review engine reads it back unparsed.
    pub fn record_daemon_config(&self, id: DaemonId, config: &serde_json::Value) {
        let _ = self.block_on(
            sqlx::query("UPDATE daemon SET config = $2 WHERE id = $1")
                .bind(id.0)
                .bind(config),
        );
    }

    pub fn record_daemon_state(
        &self,
        id: DaemonId,
        version: Option<&str>,
        uptime_seconds: Option<i64>,
        last_error: Option<&str>,
        reloaded: bool,
    ) {
        let _ = self.block_on(async {
            if reloaded {
                sqlx::query(
                    "UPDATE daemon SET version = $2, uptime_seconds = $3, last_error = $4, \
                     reloaded_at = now(), reload_count = reload_count + 1 WHERE id = $1",
                )
                .bind(id.0)
                .bind(version)
                .bind(uptime_seconds)
                .bind(last_error)
                .execute(&self.pool)
                .await
            } else {
                sqlx::query("UPDATE daemon SET version = $2, uptime_seconds = $3, last_error = $4 WHERE id = $1")
                    .bind(id.0)
                    .bind(version)
                    .bind(uptime_seconds)
                    .bind(last_error)
                    .execute(&self.pool)
                    .await
            }
        });
    }

    // --- shared networks & subnets ---

    pub fn list_shared_networks(&self, family: Option<Family>, paging: &Paging) -> Page<SharedNetwork> {
        let limit = paging.bounded_limit();
        let rows: Vec<SharedNetworkRow> = self
            .block_on(async {
                match family {
                    Some(f) => {
                        sqlx::query_as::<_, SharedNetworkRow>(
                            "SELECT id, name, family FROM shared_network WHERE family = $1 ORDER BY id LIMIT $2 OFFSET $3",
                        )
                        .bind(super::family_i16(f))
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, SharedNetworkRow>(
                            "SELECT id, name, family FROM shared_network ORDER BY id LIMIT $1 OFFSET $2",
                        )
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                }
            })
            .unwrap_or_default();
        let total: (i64,) = self
            .block_on(sqlx::query_as("SELECT count(*) FROM shared_network").fetch_one(&self.pool))
            .unwrap_or((0,));
        Page {
            items: rows.into_iter().map(SharedNetworkRow::into_model).collect(),
            total: total.0,
        }
    }

    /// Persists the per-shared-network aggregate utilization (×10 integer
    /// percentage) computed by [`stork_core::utilization::aggregate`].
    pub fn set_shared_network_utilization(&self, id: SharedNetworkId, addr_utilization: Option<i16>, pd_utilization: Option<i16>) {
        let _ = self.block_on(
            sqlx::query("UPDATE shared_network SET addr_utilization = $2, pd_utilization = $3 WHERE id = $1")
                .bind(id.0)
                .bind(addr_utilization)
                .bind(pd_utilization),
        );
    }

    pub fn list_subnets(&self, shared_network_id: Option<SharedNetworkId>, paging: &Paging) -> Page<Subnet> {
        let limit = paging.bounded_limit();
        let rows: Vec<SubnetRow> = self
            .block_on(async {
                match shared_network_id {
                    Some(sn) => {
                        sqlx::query_as::<_, SubnetRow>(
                            "SELECT id, prefix, family, shared_network_id FROM subnet \
                             WHERE shared_network_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
                        )
                        .bind(sn.0)
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, SubnetRow>(
                            "SELECT id, prefix, family, shared_network_id FROM subnet ORDER BY id LIMIT $1 OFFSET $2",
                        )
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                }
            })
            .unwrap_or_default();

        let total: (i64,) = self
            .block_on(sqlx::query_as("SELECT count(*) FROM subnet").fetch_one(&self.pool))
            .unwrap_or((0,));

        let mut subnets = Vec::with_capacity(rows.len());
        for row in rows {
            let address_pools = self.address_pools_of(SubnetId(row.id));
            let prefix_pools = self.prefix_pools_of(SubnetId(row.id));
            subnets.push(row.into_model(address_pools, prefix_pools));
        }

        Page { items: subnets, total: total.0 }
    }

    pub fn get_subnet(&self, id: SubnetId) -> Option<Subnet> {
        let row: Option<SubnetRow> = self
            .block_on(
                sqlx::query_as("SELECT id, prefix, family, shared_network_id FROM subnet WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(|row| {
            let address_pools = self.address_pools_of(SubnetId(row.id));
            let prefix_pools = self.prefix_pools_of(SubnetId(row.id));
            row.into_model(address_pools, prefix_pools)
        })
    }

    fn address_pools_of(&self, subnet_id: SubnetId) -> Vec<AddressPool> {
        let rows: Vec<(String, String)> = self
            .block_on(
                sqlx::query_as("SELECT lower_bound, upper_bound FROM address_pool WHERE subnet_id = $1")
                    .bind(subnet_id.0)
                    .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter()
            .map(|(lower_bound, upper_bound)| AddressPool { lower_bound, upper_bound })
            .collect()
    }

    fn prefix_pools_of(&self, subnet_id: SubnetId) -> Vec<PrefixPool> {
        let rows: Vec<(String, i16, i16, Option<String>)> = self
            .block_on(
                sqlx::query_as(
                    "SELECT prefix, prefix_len, delegated_len, excluded_prefix FROM prefix_pool WHERE subnet_id = $1",
                )
                .bind(subnet_id.0)
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter()
            .map(|(prefix, prefix_len, delegated_len, excluded_prefix)| PrefixPool {
                prefix,
                prefix_len: prefix_len as u8,
                delegated_len: delegated_len as u8,
                excluded_prefix,
            })
            .collect()
    }

    /// Every subnet, unpaged — the metrics collector folds the whole fleet
    /// on each scrape rather than a page of it.
    pub fn all_subnets_for_metrics(&self) -> Vec<Subnet> {
        let rows: Vec<SubnetRow> = self
            .block_on(sqlx::query_as("SELECT id, prefix, family, shared_network_id FROM subnet").fetch_all(&self.pool))
            .unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let address_pools = self.address_pools_of(SubnetId(row.id));
                let prefix_pools = self.prefix_pools_of(SubnetId(row.id));
                row.into_model(address_pools, prefix_pools)
            })
            .collect()
    }

    /// Per subnet, the stats of whichever daemon reported most recently —
    /// avoids double-counting an HA pair that both monitor the same
    /// subnet.
    pub fn latest_stats_per_subnet(&self) -> std::collections::HashMap<SubnetId, SubnetStats> {
        let rows: Vec<(i64, serde_json::Value)> = self
            .block_on(
                sqlx::query_as(
                    "SELECT DISTINCT ON (subnet_id) subnet_id, stats FROM local_subnet \
                     ORDER BY subnet_id, stats_collected_at DESC NULLS LAST",
                )
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter()
            .map(|(subnet_id, stats)| (SubnetId(subnet_id), serde_json::from_value(stats).unwrap_or_default()))
            .collect()
    }

    pub fn local_subnets_of(&self, subnet_id: SubnetId) -> Vec<LocalSubnet> {
        let rows: Vec<LocalSubnetRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT subnet_id, daemon_id, local_subnet_id, config, stats, stats_collected_at \
                     FROM local_subnet WHERE subnet_id = $1",
                )
                .bind(subnet_id.0)
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(LocalSubnetRow::into_model).collect()
    }

    /// The reverse of [`Self::local_subnets_of`]: every subnet a given
    /// daemon currently monitors, keyed by the daemon's own numbering —
    /// what the stats and host-reservation pullers need to translate a
    /// Kea-local subnet id back into a surrogate [`SubnetId`].
    pub fn local_subnets_of_daemon(&self, daemon_id: DaemonId) -> Vec<LocalSubnet> {
        let rows: Vec<LocalSubnetRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT subnet_id, daemon_id, local_subnet_id, config, stats, stats_collected_at \
                     FROM local_subnet WHERE daemon_id = $1",
                )
                .bind(daemon_id.0)
                .fetch_all(&self.pool),
            )
            .unwrap_or_default();
        rows.into_iter().map(LocalSubnetRow::into_model).collect()
    }

    pub fn record_local_subnet_stats(&self, subnet_id: SubnetId, daemon_id: DaemonId, stats: &SubnetStats, collected_at: DateTime<Utc>) {
        let stats_json = serde_json::to_value(stats).unwrap_or_default();
        let _ = self.block_on(
            sqlx::query(
                "UPDATE local_subnet SET stats = $3, stats_collected_at = $4 WHERE subnet_id = $1 AND daemon_id = $2",
            )
            .bind(subnet_id.0)
            .bind(daemon_id.0)
            .bind(stats_json)
            .bind(collected_at),
        );
    }

    // --- hosts ---

    pub fn list_hosts(&self, subnet_id: Option<SubnetId>, paging: &Paging) -> Page<Host> {
        let limit = paging.bounded_limit();
        let rows: Vec<HostRow> = self
            .block_on(async {
                match subnet_id {
                    Some(id) => {
                        sqlx::query_as::<_, HostRow>(
                            "SELECT id, subnet_id, identifiers, ip_reservations, hostname FROM host \
                             WHERE subnet_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
                        )
                        .bind(id.0)
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, HostRow>(
                            "SELECT id, subnet_id, identifiers, ip_reservations, hostname FROM host \
                             ORDER BY id LIMIT $1 OFFSET $2",
                        )
                        .bind(limit)
                        .bind(paging.offset)
                        .fetch_all(&self.pool)
                        .await
                    }
                }
            })
            .unwrap_or_default();
        let total: (i64,) = self
            .block_on(sqlx::query_as("SELECT count(*) FROM host").fetch_one(&self.pool))
            .unwrap_or((0,));
        Page {
            items: rows.into_iter().map(HostRow::into_model).collect(),
            total: total.0,
        }
    }

    pub fn get_host(&self, id: HostId) -> Option<Host> {
        let row: Option<HostRow> = self
            .block_on(
                sqlx::query_as("SELECT id, subnet_id, identifiers, ip_reservations, hostname FROM host WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(HostRow::into_model)
    }

    // --- HA status ---

    pub fn get_ha_status(&self, daemon_id: DaemonId) -> Option<HaStatus> {
        let row: Option<HaStatusRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT role, state, partner_state, scopes, failover_time, heartbeat_at \
                     FROM ha_status WHERE daemon_id = $1",
                )
                .bind(daemon_id.0)
                .fetch_optional(&self.pool),
            )
            .ok()
            .flatten();
        row.map(HaStatusRow::into_model)
    }

    pub fn upsert_ha_status(&self, daemon_id: DaemonId, status: &HaStatus) {
        let scopes = serde_json::to_value(&status.scopes).unwrap_or_default();
        let _ = self.block_on(
            sqlx::query(
                "INSERT INTO ha_status (daemon_id, role, state, partner_state, scopes, failover_time, heartbeat_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (daemon_id) DO UPDATE SET role = EXCLUDED.role, state = EXCLUDED.state, \
                 partner_state = EXCLUDED.partner_state, scopes = EXCLUDED.scopes, \
                 failover_time = EXCLUDED.failover_time, heartbeat_at = EXCLUDED.heartbeat_at",
            )
            .bind(daemon_id.0)
            .bind(ha_role_str(status.role))
            .bind(ha_state_str(status.state))
            .bind(status.partner_state.map(ha_state_str))
            .bind(scopes)
            .bind(status.failover_time)
            .bind(status.heartbeat_at),
        );
    }

    // --- events ---

    pub fn record_event(&self, event: &Event) -> stork_core::CoreResult<i64> {
        let row: (i64,) = self
            .block_on(
                sqlx::query_as(
                    "INSERT INTO event (created_at, level, text, machine_id, app_id, daemon_id, user_id) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                )
                .bind(event.created_at)
                .bind(level_str(event.level))
                .bind(&event.text)
                .bind(event.relations.machine_id.map(|id| id.0))
                .bind(event.relations.app_id.map(|id| id.0))
                .bind(event.relations.daemon_id.map(|id| id.0))
                .bind(event.relations.user_id.map(|id| id.0))
                .fetch_one(&self.pool),
            )
            .map_err(sqlx_to_core)?;
        Ok(row.0)
    }

    /// Lists events newest-first, optionally filtered by exact severity
    /// and/or relation, with `since_id` backing SSE's `Last-Event-ID` resume.
    pub fn list_events(&self, level: Option<Level>, machine_id: Option<MachineId>, since_id: Option<i64>, paging: &Paging) -> Page<Event> {
        let limit = paging.bounded_limit();
        let rows: Vec<EventRow> = self
            .block_on(
                sqlx::query_as(
                    "SELECT id, created_at, level, text, machine_id, app_id, daemon_id, user_id FROM event \
                     WHERE ($1::TEXT IS NULL OR level = $1) \
                       AND ($2::BIGINT IS NULL OR machine_id = $2) \
                       AND ($3::BIGINT IS NULL OR id > $3) \
                     ORDER BY id DESC LIMIT $4 OFFSET $5",
                )
                .bind(level.map(level_str))
                .bind(machine_id.map(|id| id.0))
                .bind(since_id)
                .bind(limit)
                .bind(paging.offset),
            )
            .unwrap_or_default();
        let total: (i64,) = self
            .block_on(sqlx::query_as("SELECT count(*) FROM event").fetch_one(&self.pool))
            .unwrap_or((0,));
        Page {
            items: rows.into_iter().map(EventRow::into_model).collect(),
            total: total.0,
        }
    }

    // --- config review ---

    pub fn record_config_report(&self, daemon_id: DaemonId, checker: &str, content: &str) {
        let _ = self.block_on(
            sqlx::query("INSERT INTO config_report (daemon_id, checker, content) VALUES ($1, $2, $3)")
                .bind(daemon_id.0)
                .bind(checker)
                .bind(content),
        );
    }

    pub fn replace_config_reports(&self, daemon_id: DaemonId, reports: &[(String, String)]) {
        let _ = self.block_on(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM config_report WHERE daemon_id = $1").bind(daemon_id.0).execute(&mut *tx).await?;
            for (checker, content) in reports {
                sqlx::query("INSERT INTO config_report (daemon_id, checker, content) VALUES ($1, $2, $3)")
                    .bind(daemon_id.0)
                    .bind(checker)
                    .bind(content)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await
        });
    }

    pub fn list_config_reports(&self, daemon_id: DaemonId) -> Vec<(String, String, DateTime<Utc>)> {
        self.block_on(
            sqlx::query_as("SELECT checker, content, created_at FROM config_report WHERE daemon_id = $1 ORDER BY created_at DESC")
                .bind(daemon_id.0)
                .fetch_all(&self.pool),
        )
        .unwrap_or_default()
    }

    pub fn checker_states(&self) -> (std::collections::HashMap<String, stork_core::review::controller::CheckerState>,
        std::collections::HashMap<DaemonId, std::collections::HashMap<String, stork_core::review::controller::CheckerState>>) {
        use stork_core::review::controller::CheckerState;

        let rows: Vec<(String, Option<i64>, String, String)> = self
            .block_on(sqlx::query_as("SELECT scope, daemon_id, checker, state FROM checker_state").fetch_all(&self.pool))
            .unwrap_or_default();

        let mut global = std::collections::HashMap::new();
        let mut per_daemon: std::collections::HashMap<DaemonId, std::collections::HashMap<String, CheckerState>> =
            std::collections::HashMap::new();

        for (scope, daemon_id, checker, state) in rows {
            let state = if state == "enabled" { CheckerState::Enabled } else { CheckerState::Disabled };
            if scope == "global" {
                global.insert(checker, state);
            } else if let Some(id) = daemon_id {
                per_daemon.entry(DaemonId(id)).or_default().insert(checker, state);
            }
        }

        (global, per_daemon)
    }

    pub fn set_checker_state(&self, daemon_id: Option<DaemonId>, checker: &str, enabled: bool) {
        let scope = if daemon_id.is_some() { "daemon" } else { "global" };
        let state = if enabled { "enabled" } else { "disabled" };
        let _ = self.block_on(
            sqlx::query(
                "INSERT INTO checker_state (scope, daemon_id, checker, state) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (scope, daemon_id, checker) DO UPDATE SET state = EXCLUDED.state",
            )
            .bind(scope)
            .bind(daemon_id.map(|id| id.0))
            .bind(checker)
            .bind(state),
        );
    }
}

fn ha_role_str(role: HaRole) -> &'static str {
    match role {
        HaRole::Primary => "primary",
        HaRole::Secondary => "secondary",
        HaRole::Standby => "standby",
        HaRole::Backup => "backup",
    }
}

fn ha_role_from_str(s: &str) -> HaRole {
    match s {
        "secondary" => HaRole::Secondary,
        "standby" => HaRole::Standby,
        "backup" => HaRole::Backup,
        _ => HaRole::Primary,
    }
}

fn ha_state_str(state: HaState) -> &'static str {
    match state {
        HaState::LoadBalancing => "load-balancing",
        HaState::HotStandby => "hot-standby",
        HaState::Partnerdown => "partner-down",
        HaState::CommunicationInterrupted => "communication-interrupted",
        HaState::WaitingToTerminate => "waiting-to-terminate",
        HaState::Terminated => "terminated",
        HaState::Unavailable => "unavailable",
    }
}

fn ha_state_from_str(s: &str) -> HaState {
    match s {
        "hot-standby" => HaState::HotStandby,
        "partner-down" => HaState::Partnerdown,
        "communication-interrupted" => HaState::CommunicationInterrupted,
        "waiting-to-terminate" => HaState::WaitingToTerminate,
        "terminated" => HaState::Terminated,
        "unavailable" => HaState::Unavailable,
        _ => HaState::LoadBalancing,
    }
}

#[derive(sqlx::FromRow)]
struct MachineRow {
    id: i64,
    address: String,
    agent_port: i32,
    authorized: bool,
    last_contact_error: Option<String>,
    agent_token_fingerprint: Option<String>,
}

impl MachineRow {
    fn into_model(self) -> Machine {
        Machine {
            id: MachineId(self.id),
            address: self.address,
            agent_port: self.agent_port as u16,
            authorized: self.authorized,
            last_contact_error: self.last_contact_error,
            agent_token_fingerprint: self.agent_token_fingerprint,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AppRow {
    id: i64,
    machine_id: i64,
    kind: String,
    access_points: serde_json::Value,
}

impl AppRow {
    fn into_model(self) -> App {
        let access_points = self
            .access_points
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| {
                Some(AccessPoint {
                    kind: access_point_kind_from_str(value.get("kind")?.as_str()?),
                    address: value.get("address")?.as_str()?.to_string(),
                    port: value.get("port")?.as_u64()? as u16,
                    key: value.get("key").and_then(|v| v.as_str()).map(str::to_string),
                    use_secure_protocol: value.get("use_secure_protocol").and_then(|v| v.as_bool()).unwrap_or(false),
                })
            })
            .collect();
        App {
            id: AppId(self.id),
            machine_id: MachineId(self.machine_id),
            kind: app_kind_from_str(&self.kind),
            access_points,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DaemonRow {
    id: i64,
    app_id: i64,
    name: String,
    active: bool,
    monitored: bool,
    version: Option<String>,
    uptime_seconds: Option<i64>,
    reloaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    reload_count: i64,
    config: serde_json::Value,
}

impl DaemonRow {
    fn into_model(self) -> Daemon {
        Daemon {
            id: DaemonId(self.id),
            app_id: AppId(self.app_id),
            name: daemon_name_from_str(&self.name),
            active: self.active,
            monitored: self.monitored,
            version: self.version,
            uptime_seconds: self.uptime_seconds.map(|v| v as u64),
            reloaded_at: self.reloaded_at,
            last_error: self.last_error,
            reload_count: self.reload_count as u64,
            config: self.config,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SharedNetworkRow {
    id: i64,
    name: String,
    family: i16,
}

impl SharedNetworkRow {
    fn into_model(self) -> SharedNetwork {
        SharedNetwork {
            id: SharedNetworkId(self.id),
            name: self.name,
            family: family_from_i16(self.family),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubnetRow {
    id: i64,
    prefix: String,
    family: i16,
    shared_network_id: Option<i64>,
}

impl SubnetRow {
    fn into_model(self, address_pools: Vec<AddressPool>, prefix_pools: Vec<PrefixPool>) -> Subnet {
        Subnet {
            id: SubnetId(self.id),
            prefix: self.prefix,
            family: family_from_i16(self.family),
            shared_network_id: self.shared_network_id.map(SharedNetworkId),
            address_pools,
            prefix_pools,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocalSubnetRow {
    subnet_id: i64,
    daemon_id: i64,
    local_subnet_id: i32,
    config: serde_json::Value,
    stats: serde_json::Value,
    stats_collected_at: Option<DateTime<Utc>>,
}

impl LocalSubnetRow {
    fn into_model(self) -> LocalSubnet {
        LocalSubnet {
            subnet_id: SubnetId(self.subnet_id),
            daemon_id: DaemonId(self.daemon_id),
            local_subnet_id: self.local_subnet_id,
            config: self.config,
            stats: serde_json::from_value(self.stats).unwrap_or_default(),
            stats_collected_at: self.stats_collected_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HostRow {
    id: i64,
    subnet_id: Option<i64>,
    identifiers: serde_json::Value,
    ip_reservations: serde_json::Value,
    hostname: Option<String>,
}

impl HostRow {
    fn into_model(self) -> Host {
        let identifiers = self
            .identifiers
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| {
                Some(HostIdentifier {
                    kind: identifier_kind_from_str(value.get("kind")?.as_str()?),
                    value_hex: value.get("value_hex")?.as_str()?.to_string(),
                })
            })
            .collect();
        let ip_reservations = self
            .ip_reservations
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| {
                Some(IpReservation {
                    address: value.get("address")?.as_str()?.to_string(),
                    prefix_len: value.get("prefix_len").and_then(|v| v.as_u64()).map(|v| v as u8),
                })
            })
            .collect();
        Host {
            id: HostId(self.id),
            subnet_id: self.subnet_id.map(SubnetId),
            identifiers,
            ip_reservations,
            hostname: self.hostname,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HaStatusRow {
    role: String,
    state: String,
    partner_state: Option<String>,
    scopes: serde_json::Value,
    failover_time: Option<DateTime<Utc>>,
    heartbeat_at: DateTime<Utc>,
}

impl HaStatusRow {
    fn into_model(self) -> HaStatus {
        HaStatus {
            role: ha_role_from_str(&self.role),
            state: ha_state_from_str(&self.state),
            partner_state: self.partner_state.as_deref().map(ha_state_from_str),
            scopes: serde_json::from_value(self.scopes).unwrap_or_default(),
            failover_time: self.failover_time,
            heartbeat_at: self.heartbeat_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    created_at: DateTime<Utc>,
    level: String,
    text: String,
    machine_id: Option<i64>,
    app_id: Option<i64>,
    daemon_id: Option<i64>,
    user_id: Option<i64>,
}

impl EventRow {
    fn into_model(self) -> Event {
        Event {
            id: self.id,
            created_at: self.created_at,
            level: level_from_str(&self.level),
            text: self.text,
            relations: Relations {
                machine_id: self.machine_id.map(MachineId),
                app_id: self.app_id.map(AppId),
                daemon_id: self.daemon_id.map(DaemonId),
                user_id: self.user_id.map(stork_core::model::UserId),
            },
        }
    }
}
