//! Fleet-wide Prometheus metrics, folded from the database in one pass
//! per scrape so a consumer never observes a partially updated snapshot,
//! mirroring the agent's own `/metrics` endpoint.

use actix_web::{get, web, HttpResponse};
use stork_core::utilization::{aggregate, SubnetContribution};

use crate::db::PgStore;

#[get("/metrics")]
pub async fn metrics_handler(store: web::Data<PgStore>) -> HttpResponse {
    let store = store.get_ref().clone();
    let rendered = web::block(move || render(&store)).await.unwrap_or_default();
    HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(rendered)
}

fn render(store: &PgStore) -> String {
    let (authorized, unauthorized, unreachable) = store.machine_counts();

    let mut out = String::new();
    out.push_str("# HELP stork_authorized_machines_total Machines the operator has authorized.\n");
    out.push_str("# TYPE stork_authorized_machines_total gauge\n");
    out.push_str(&format!("stork_authorized_machines_total {authorized}\n"));
    out.push_str("# HELP stork_unauthorized_machines_total Machines pending authorization.\n");
    out.push_str("# TYPE stork_unauthorized_machines_total gauge\n");
    out.push_str(&format!("stork_unauthorized_machines_total {unauthorized}\n"));
    out.push_str("# HELP stork_unreachable_machines_total Machines whose last contact attempt failed.\n");
    out.push_str("# TYPE stork_unreachable_machines_total gauge\n");
    out.push_str(&format!("stork_unreachable_machines_total {unreachable}\n"));

    let subnets = store.all_subnets_for_metrics();
    let stats_by_subnet = store.latest_stats_per_subnet();
    let empty_stats = stork_core::model::SubnetStats::default();
    let contributions: Vec<SubnetContribution> = subnets
        .iter()
        .map(|subnet| SubnetContribution {
            subnet,
            stats: stats_by_subnet.get(&subnet.id).unwrap_or(&empty_stats),
        })
        .collect();
    let (by_shared_network, _fleet) = aggregate(contributions);

    out.push_str("# HELP stork_subnet_addr_utilization_permille Address utilization per subnet, in tenths of a percent.\n");
    out.push_str("# TYPE stork_subnet_addr_utilization_permille gauge\n");
    out.push_str("# HELP stork_subnet_pd_utilization_permille Prefix-delegation utilization per subnet, in tenths of a percent.\n");
    out.push_str("# TYPE stork_subnet_pd_utilization_permille gauge\n");
    for subnet in &subnets {
        let totals = stork_core::utilization::aggregate([SubnetContribution {
            subnet,
            stats: stats_by_subnet.get(&subnet.id).unwrap_or(&empty_stats),
        }])
        .1;
        if let Some(addr) = totals.addr_utilization_permille_x10() {
            out.push_str(&format!(
                "stork_subnet_addr_utilization_permille{{subnet=\"{}\"}} {addr}\n",
                escape_label(&subnet.prefix)
            ));
        }
        if let Some(pd) = totals.pd_utilization_permille_x10() {
            out.push_str(&format!(
                "stork_subnet_pd_utilization_permille{{subnet=\"{}\"}} {pd}\n",
                escape_label(&subnet.prefix)
            ));
        }
    }

    let shared_networks = store.list_shared_networks(None, &crate::db::Paging { offset: 0, limit: 10_000 });
    out.push_str("# HELP stork_shared_network_addr_utilization_permille Address utilization per shared network, in tenths of a percent.\n");
    out.push_str("# TYPE stork_shared_network_addr_utilization_permille gauge\n");
    out.push_str("# HELP stork_shared_network_pd_utilization_permille Prefix-delegation utilization per shared network, in tenths of a percent.\n");
    out.push_str("# TYPE stork_shared_network_pd_utilization_permille gauge\n");
    for sn in &shared_networks.items {
        if let Some(totals) = by_shared_network.get(&sn.id) {
            if let Some(addr) = totals.addr_utilization_permille_x10() {
                out.push_str(&format!(
                    "stork_shared_network_addr_utilization_permille{{shared_network=\"{}\"}} {addr}\n",
                    escape_label(&sn.name)
                ));
            }
            if let Some(pd) = totals.pd_utilization_permille_x10() {
                out.push_str(&format!(
                    "stork_shared_network_pd_utilization_permille{{shared_network=\"{}\"}} {pd}\n",
                    escape_label(&sn.name)
                ));
            }
        }
    }

    out
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
