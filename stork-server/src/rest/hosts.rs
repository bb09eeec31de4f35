//! `/hosts`: reservations collected from `config-get` and `reservation-get-all`.

use actix_web::{get, web, HttpResponse};
use stork_core::model::{HostId, SubnetId};

use crate::db::{Page, PgStore, Paging};

#[derive(serde::Deserialize, Default)]
pub struct HostsQuery {
    subnet: Option<i64>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[get("/hosts")]
pub async fn list_hosts(store: web::Data<PgStore>, query: web::Query<HostsQuery>) -> HttpResponse {
    let store = store.get_ref().clone();
    let query = query.into_inner();
    let subnet_id = query.subnet.map(SubnetId);
    let paging = Paging { offset: query.offset, limit: query.limit };
    let page = web::block(move || store.list_hosts(subnet_id, &paging))
        .await
        .unwrap_or(Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}

#[get("/hosts/{id}")]
pub async fn get_host(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let host_id = HostId(id.into_inner());
    match web::block(move || store.get_host(host_id)).await {
        Ok(Some(host)) => HttpResponse::Ok().json(host),
        _ => HttpResponse::NotFound().finish(),
    }
}
