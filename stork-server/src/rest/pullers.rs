//! `/pullers`: a plain snapshot of the scheduler's own bookkeeping, not a
//! store query — there's nothing in Postgres to page through here.

use std::sync::Arc;
use std::time::SystemTime;

use actix_web::{get, web, HttpResponse};
use stork_core::puller::PullerRegistry;

#[derive(serde::Serialize)]
struct PullerInfo {
    name: &'static str,
    interval_setting_name: &'static str,
    interval_seconds: Option<u64>,
    last_executed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[get("/pullers")]
pub async fn list_pullers(registry: web::Data<Arc<PullerRegistry>>) -> HttpResponse {
    let now_instant = std::time::Instant::now();
    let now_system = SystemTime::now();
    let items: Vec<PullerInfo> = registry
        .statuses()
        .into_iter()
        .map(|s| PullerInfo {
            name: s.name,
            interval_setting_name: s.interval_setting_name,
            interval_seconds: s.interval.map(|d| d.as_secs()),
            last_executed_at: s.last_executed_at.map(|instant| {
                let delta = now_instant.saturating_duration_since(instant);
                chrono::DateTime::<chrono::Utc>::from(now_system - delta)
            }),
        })
        .collect();
    HttpResponse::Ok().json(serde_json::json!({"items": items}))
}
