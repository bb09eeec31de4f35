//! `/events`: the same backlog the SSE stream replays on reconnect,
//! paged for a plain list view.

use actix_web::{get, web, HttpResponse};
use stork_core::model::{Level, MachineId};

use crate::db::{Page, PgStore, Paging};

#[derive(serde::Deserialize, Default)]
pub struct EventsQuery {
    level: Option<String>,
    machine: Option<i64>,
    #[serde(rename = "sinceId")]
    since_id: Option<i64>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

fn parse_level(value: &str) -> Option<Level> {
    match value {
        "info" => Some(Level::Info),
        "warning" => Some(Level::Warning),
        "error" => Some(Level::Error),
        _ => None,
    }
}

#[get("/events")]
pub async fn list_events(store: web::Data<PgStore>, query: web::Query<EventsQuery>) -> HttpResponse {
    let store = store.get_ref().clone();
    let query = query.into_inner();
    let level = query.level.as_deref().and_then(parse_level);
    let machine_id = query.machine.map(MachineId);
    let paging = Paging { offset: query.offset, limit: query.limit };
    let page = web::block(move || store.list_events(level, machine_id, query.since_id, &paging))
        .await
        .unwrap_or(Page { items: vec![], total: 0 });
    HttpResponse::Ok().json(page)
}
