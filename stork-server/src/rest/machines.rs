//! `/machines` and the apps hosted on them. Authorizing a machine is the
//! one action endpoint here: it flips the flag and, the first time, runs
//! a synchronous discovery pass so the machine already has daemons by the
//! time the narrower per-daemon pullers next tick, instead of waiting a
//! full `machine_state` interval for the first one to find them.

use actix_web::{get, post, web, HttpResponse};
use stork_core::model::{AppId, MachineId};

use crate::db::{PgStore, Paging};
use crate::pullers::client::AgentClientFactory;
use crate::pullers::discovery;

#[get("/machines")]
pub async fn list_machines(store: web::Data<PgStore>, paging: web::Query<Paging>) -> HttpResponse {
    let store = store.get_ref().clone();
    let paging = paging.into_inner();
    let page = web::block(move || store.list_machines(None, &paging)).await.unwrap_or(crate::db::Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}

#[get("/machines/{id}")]
pub async fn get_machine(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let machine_id = MachineId(id.into_inner());
    match web::block(move || store.get_machine(machine_id)).await {
        Ok(Some(machine)) => HttpResponse::Ok().json(machine),
        _ => HttpResponse::NotFound().finish(),
    }
}

#[derive(serde::Deserialize)]
pub struct AuthorizeRequest {
    pub authorized: bool,
}

#[post("/machines/{id}/authorize")]
pub async fn authorize_machine(
    store: web::Data<PgStore>,
    clients: web::Data<AgentClientFactory>,
    id: web::Path<i64>,
    body: web::Json<AuthorizeRequest>,
) -> HttpResponse {
    let store = store.get_ref().clone();
    let clients = clients.get_ref().clone();
    let machine_id = MachineId(id.into_inner());
    let authorize = body.authorized;

    let result = web::block(move || -> Result<(), stork_core::error::CoreError> {
        store.set_machine_authorized(machine_id, authorize)?;
        if authorize {
            // Best-effort: a failed first discovery just means the
            // machine_state puller picks it up on its own schedule.
            let _ = discovery::discover_machine(&store, &clients, machine_id);
        }
        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().finish(),
        Ok(Err(e)) => super::core_error_response(e),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

#[derive(serde::Deserialize, Default)]
pub struct AppsQuery {
    #[serde(default)]
    machine: Option<i64>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[get("/apps")]
pub async fn list_apps(store: web::Data<PgStore>, query: web::Query<AppsQuery>) -> HttpResponse {
    let store = store.get_ref().clone();
    let query = query.into_inner();
    let machine_id = query.machine.map(MachineId);
    let paging = Paging { offset: query.offset, limit: query.limit };
    let page = web::block(move || store.list_apps(machine_id, &paging)).await.unwrap_or(crate::db::Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}

#[get("/apps/{id}")]
pub async fn get_app(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let app_id = AppId(id.into_inner());
    match web::block(move || store.get_app(app_id)).await {
        Ok(Some(app)) => HttpResponse::Ok().json(app),
        _ => HttpResponse::NotFound().finish(),
    }
}
