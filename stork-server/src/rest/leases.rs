//! `/leases`. Leases are never stored server-side — see
//! [`stork_core::model::lease`] — so every request here is forwarded live
//! to one of the daemons serving the requested subnet and the daemon's
//! answer is reshaped into [`stork_core::model::Lease`] on the way back.

use actix_web::{get, web, HttpResponse};
use stork_core::model::{AccessPointKind, DaemonId, DaemonName, Family, Lease, LeaseState, SubnetId};
use stork_core::puller::PullError;

use crate::db::PgStore;
use crate::pullers::client::AgentClientFactory;
use crate::pullers::kea;

#[derive(serde::Deserialize, Default)]
pub struct LeasesQuery {
    subnet: Option<i64>,
    hostname: Option<String>,
}

fn kea_service_name(name: DaemonName) -> Option<&'static str> {
    match name {
        DaemonName::Dhcp4 => Some("dhcp4"),
        DaemonName::Dhcp6 => Some("dhcp6"),
        _ => None,
    }
}

fn fetch_command(family: Family, hostname: &Option<String>) -> (&'static str, serde_json::Value) {
    match (family, hostname) {
        (Family::V4, Some(name)) => ("lease4-get-by-hostname", serde_json::json!({"hostname": name})),
        (Family::V6, Some(name)) => ("lease6-get-by-hostname", serde_json::json!({"hostname": name})),
        (Family::V4, None) => ("lease4-get-all", serde_json::Value::Null),
        (Family::V6, None) => ("lease6-get-all", serde_json::Value::Null),
    }
}

fn parse_state(code: Option<i64>) -> LeaseState {
    match code {
        Some(0) => LeaseState::Default,
        Some(1) => LeaseState::Declined,
        Some(2) => LeaseState::Expired,
        _ => LeaseState::Released,
    }
}

fn parse_leases(daemon_id: DaemonId, subnet_id: SubnetId, arguments: &serde_json::Value) -> Vec<Lease> {
    let Some(entries) = arguments.get("leases").and_then(|v| v.as_array()) else {
        return vec![];
    };
    entries
        .iter()
        .map(|entry| Lease {
            daemon_id,
            subnet_id: Some(subnet_id),
            ip_address: entry.get("ip-address").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            hw_address: entry.get("hw-address").and_then(|v| v.as_str()).map(String::from),
            duid: entry.get("duid").and_then(|v| v.as_str()).map(String::from),
            hostname: entry.get("hostname").and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(String::from),
            state: parse_state(entry.get("state").and_then(|v| v.as_i64())),
            cltt: entry
                .get("cltt")
                .and_then(|v| v.as_i64())
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .unwrap_or_else(chrono::Utc::now),
            valid_lifetime_seconds: entry.get("valid-lft").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        })
        .collect()
}

fn fetch_leases(store: &PgStore, clients: &AgentClientFactory, subnet_id: SubnetId, hostname: Option<String>) -> Result<Vec<Lease>, PullError> {
    let subnet = store
        .get_subnet(subnet_id)
        .ok_or_else(|| PullError::Unreachable(DaemonId(0), "subnet not found".to_string()))?;
    let local_subnets = store.local_subnets_of(subnet_id);
    let mut leases = vec![];
    for local_subnet in local_subnets {
        let Some(daemon) = store.get_daemon(local_subnet.daemon_id) else {
            continue;
        };
        let Some(service) = kea_service_name(daemon.name) else {
            continue;
        };
        let Some(app) = store.get_app(daemon.app_id) else {
            continue;
        };
        let Some(control) = app.access_points.iter().find(|ap| ap.kind == AccessPointKind::Control) else {
            continue;
        };
        let scheme = if control.use_secure_protocol { "https" } else { "http" };
        let url = format!("{scheme}://{}:{}/", control.address, control.port);

        let mut client = clients.client_for(daemon.id)?;
        let (command, arguments) = fetch_command(subnet.family, &hostname);
        let result = kea::send_command(store, &mut client, daemon.id, &url, command, service, Some(arguments))?;
        if result.code != 0 {
            continue;
        }
        leases.extend(parse_leases(daemon.id, subnet_id, &result.arguments));
    }
    Ok(leases)
}

#[get("/leases")]
pub async fn list_leases(store: web::Data<PgStore>, clients: web::Data<AgentClientFactory>, query: web::Query<LeasesQuery>) -> HttpResponse {
    let Some(subnet) = query.subnet else {
        return HttpResponse::BadRequest().json(serde_json::json!({"message": "subnet is required"}));
    };
    let store = store.get_ref().clone();
    let clients = clients.get_ref().clone();
    let hostname = query.hostname.clone();
    let subnet_id = SubnetId(subnet);

    let result = web::block(move || fetch_leases(&store, &clients, subnet_id, hostname)).await;
    match result {
        Ok(Ok(leases)) => {
            let total = leases.len() as i64;
            HttpResponse::Ok().json(serde_json::json!({"items": leases, "total": total}))
        }
        Ok(Err(e)) => HttpResponse::BadGateway().json(serde_json::json!({"message": e.to_string()})),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}
