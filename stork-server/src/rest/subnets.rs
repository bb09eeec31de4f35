//! `/shared-networks` and `/subnets`.

use actix_web::{get, web, HttpResponse};
use stork_core::model::{Family, SharedNetworkId, SubnetId};

use crate::db::{Page, PgStore, Paging};

#[derive(serde::Deserialize, Default)]
pub struct SharedNetworksQuery {
    family: Option<String>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

fn parse_family(value: &str) -> Option<Family> {
    match value {
        "v4" | "4" => Some(Family::V4),
        "v6" | "6" => Some(Family::V6),
        _ => None,
    }
}

#[get("/shared-networks")]
pub async fn list_shared_networks(store: web::Data<PgStore>, query: web::Query<SharedNetworksQuery>) -> HttpResponse {
    let store = store.get_ref().clone();
    let query = query.into_inner();
    let family = query.family.as_deref().and_then(parse_family);
    let paging = Paging { offset: query.offset, limit: query.limit };
    let page = web::block(move || store.list_shared_networks(family, &paging))
        .await
        .unwrap_or(Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}

#[derive(serde::Deserialize, Default)]
pub struct SubnetsQuery {
    #[serde(rename = "sharedNetwork")]
    shared_network: Option<i64>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[get("/subnets")]
pub async fn list_subnets(store: web::Data<PgStore>, query: web::Query<SubnetsQuery>) -> HttpResponse {
    let store = store.get_ref().clone();
    let query = query.into_inner();
    let shared_network_id = query.shared_network.map(SharedNetworkId);
    let paging = Paging { offset: query.offset, limit: query.limit };
    let page = web::block(move || store.list_subnets(shared_network_id, &paging))
        .await
        .unwrap_or(Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}

#[get("/subnets/{id}")]
pub async fn get_subnet(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let subnet_id = SubnetId(id.into_inner());
    match web::block(move || store.get_subnet(subnet_id)).await {
        Ok(Some(subnet)) => HttpResponse::Ok().json(subnet),
        _ => HttpResponse::NotFound().finish(),
    }
}
