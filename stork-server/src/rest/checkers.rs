//! `/daemons/{id}/config-checkers` and `/daemons/{id}/config-reports`: the
//! per-daemon checker on/off switches and the findings from their last run.

use actix_web::{get, post, put, web, HttpResponse};
use stork_core::model::DaemonId;
use stork_core::review::{controller::resolve, default_checkers, CheckerState};

use crate::db::PgStore;
use crate::pullers::config_review;

#[derive(serde::Serialize)]
struct CheckerStatus {
    name: &'static str,
    enabled: bool,
}

#[get("/daemons/{id}/config-checkers")]
pub async fn get_config_checkers(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let daemon_id = DaemonId(id.into_inner());
    let statuses = web::block(move || {
        let (global, per_daemon) = store.checker_states();
        default_checkers()
            .iter()
            .map(|c| CheckerStatus {
                name: c.name(),
                enabled: resolve(&global, &per_daemon, daemon_id, c.name(), CheckerState::Enabled) == CheckerState::Enabled,
            })
            .collect::<Vec<_>>()
    })
    .await
    .unwrap_or_default();
    HttpResponse::Ok().json(statuses)
}

#[derive(serde::Deserialize)]
pub struct SetCheckerRequest {
    pub checker: String,
    pub enabled: bool,
    #[serde(default)]
    pub global: bool,
}

#[put("/daemons/{id}/config-checkers")]
pub async fn set_config_checker(store: web::Data<PgStore>, id: web::Path<i64>, body: web::Json<SetCheckerRequest>) -> HttpResponse {
    let store = store.get_ref().clone();
    let daemon_id = DaemonId(id.into_inner());
    let body = body.into_inner();
    let scope = if body.global { None } else { Some(daemon_id) };
    web::block(move || store.set_checker_state(scope, &body.checker, body.enabled))
        .await
        .ok();
    HttpResponse::Ok().finish()
}

#[get("/daemons/{id}/config-reports")]
pub async fn get_config_reports(store: web::Data<PgStore>, id: web::Path<i64>) -> HttpResponse {
    let store = store.get_ref().clone();
    let daemon_id = DaemonId(id.into_inner());
    let reports = web::block(move || store.list_config_reports(daemon_id)).await.unwrap_or_default();
    let items: Vec<_> = reports
        .into_iter()
        .map(|(checker, content, created_at)| serde_json::json!({"checker": checker, "content": content, "createdAt": created_at}))
        .collect();
    HttpResponse::Ok().json(serde_json::json!({"items": items}))
}

/// Triggers an immediate review run for a single daemon, outside the
/// `config_review` puller's own schedule — the "manual" trigger kind.
#[post("/daemons/{id}/config-reports")]
pub async fn run_config_review(
    store: web::Data<PgStore>,
    events: web::Data<std::sync::Arc<stork_core::event_bus::EventBus>>,
    id: web::Path<i64>,
) -> HttpResponse {
    let store = store.get_ref().clone();
    let events = events.get_ref().clone();
    let daemon_id = DaemonId(id.into_inner());
    let result = web::block(move || config_review::run_review_for_daemon(&store, &events, daemon_id)).await;
    match result {
        Ok(Ok(())) => HttpResponse::Ok().finish(),
        _ => HttpResponse::InternalServerError().finish(),
    }
}
