//! The REST surface the UI talks to: paged JSON listings over the fleet
//! inventory plus a handful of action endpoints (authorize a machine,
//! toggle a checker, trigger a review). Every handler follows the same
//! shape as [`crate::metrics::metrics_handler`] and
//! [`crate::sse::sse_handler`] — extract `web::Data<PgStore>`, run the
//! blocking query inside [`actix_web::web::block`], map the result to
//! JSON.

mod checkers;
mod daemons;
mod events;
mod hosts;
mod install;
mod leases;
mod machines;
mod pullers;
mod subnets;

use actix_web::web;

/// Registers every REST route on an actix-web `App`. Kept as one function
/// so `main.rs` only has to call it once, rather than knowing the
/// resource layout itself.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(machines::list_machines)
        .service(machines::get_machine)
        .service(machines::authorize_machine)
        .service(machines::list_apps)
        .service(machines::get_app)
        .service(subnets::list_shared_networks)
        .service(subnets::list_subnets)
        .service(subnets::get_subnet)
        .service(hosts::list_hosts)
        .service(hosts::get_host)
        .service(leases::list_leases)
        .service(events::list_events)
        .service(daemons::get_ha_status)
        .service(checkers::get_config_checkers)
        .service(checkers::set_config_checker)
        .service(checkers::get_config_reports)
        .service(checkers::run_config_review)
        .service(pullers::list_pullers)
        .service(install::swagger_json);
}

/// Maps a [`stork_core::error::CoreError`] to the REST status code for its
/// [`stork_core::error::ErrorKind`], mirroring [`crate::registration`]'s
/// gRPC status mapping for the same error kinds.
fn core_error_response(err: stork_core::error::CoreError) -> actix_web::HttpResponse {
    use actix_web::HttpResponse;
    use stork_core::error::ErrorKind;

    let message = err.to_string();
    match err.kind() {
        ErrorKind::NotFound => HttpResponse::NotFound().json(serde_json::json!({"message": message})),
        ErrorKind::InvalidInput => HttpResponse::BadRequest().json(serde_json::json!({"message": message})),
        ErrorKind::Conflict => HttpResponse::Conflict().json(serde_json::json!({"message": message})),
        ErrorKind::Unreachable => HttpResponse::ServiceUnavailable().json(serde_json::json!({"message": message})),
        ErrorKind::Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({"message": message})),
        ErrorKind::Internal => HttpResponse::InternalServerError().json(serde_json::json!({"message": message})),
    }
}
