//! Per-daemon resources that don't fit neatly under `/apps`.

use actix_web::{get, web, HttpResponse};
use stork_core::model::DaemonId;

use crate::db::PgStore;

#[get("/daemons/{id}/ha-status")]
pub async fn get_ha_status(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let daemon_id = DaemonId(id.into_inner());
    match web::block(move || store.get_ha_status(daemon_id)).await {
        Ok(Some(status)) => HttpResponse::Ok().json(status),
        _ => HttpResponse::NotFound().finish(),
    }
}
