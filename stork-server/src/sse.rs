//! `GET /sse`: streams fleet [`Event`]s as they're published, each frame
//! carrying a monotonic `id:` so a reconnecting client can resume via
//! `Last-Event-ID`. The event bus hands out a `crossbeam` receiver per
//! subscriber; a dedicated forwarding thread bridges it onto the async
//! response body actix-web streams to the client.

use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use stork_core::event_bus::EventBus;
use stork_core::model::{AppKind, DaemonName, Event, Level};

use crate::db::PgStore;

#[derive(Debug, Deserialize, Default)]
pub struct SseFilter {
    machine: Option<i64>,
    #[serde(rename = "appType")]
    app_type: Option<String>,
    #[serde(rename = "daemonType")]
    daemon_type: Option<String>,
    user: Option<i64>,
    level: Option<String>,
}

impl SseFilter {
    fn matches(&self, event: &Event, store: &PgStore) -> bool {
        if let Some(machine) = self.machine {
            if event.relations.machine_id.map(|id| id.0) != Some(machine) {
                return false;
            }
        }
        if let Some(user) = self.user {
            if event.relations.user_id.map(|id| id.0) != Some(user) {
                return false;
            }
        }
        if let Some(level) = &self.level {
            if level_name(event.level) != level {
                return false;
            }
        }
        if let Some(wanted) = &self.app_type {
            let Some(app_id) = event.relations.app_id else { return false };
            let Some(app) = store.get_app(app_id) else { return false };
            if app_kind_name(app.kind) != wanted {
                return false;
            }
        }
        if let Some(wanted) = &self.daemon_type {
            let Some(daemon_id) = event.relations.daemon_id else { return false };
            let Some(daemon) = store.get_daemon(daemon_id) else { return false };
            if daemon_name_name(daemon.name) != wanted {
                return false;
            }
        }
        true
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Info => "info",
        Level::Warning => "warning",
        Level::Error => "error",
    }
}

fn app_kind_name(kind: AppKind) -> &'static str {
    match kind {
        AppKind::Kea => "kea",
        AppKind::Bind9 => "bind9",
    }
}

fn daemon_name_name(name: DaemonName) -> &'static str {
    match name {
        DaemonName::Dhcp4 => "dhcp4",
        DaemonName::Dhcp6 => "dhcp6",
        DaemonName::D2 => "d2",
        DaemonName::Ca => "ca",
        DaemonName::Netconf => "netconf",
        DaemonName::Named => "named",
    }
}

fn format_frame(event: &Event) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("id: {}\ndata: {data}\n\n", event.id)
}

#[get("/sse")]
pub async fn sse_handler(
    req: HttpRequest,
    query: web::Query<SseFilter>,
    events: web::Data<Arc<EventBus>>,
    store: web::Data<PgStore>,
) -> HttpResponse {
    let filter = query.into_inner();
    let store = store.get_ref().clone();
    let receiver = events.get_ref().subscribe();

    // Resume support: a reconnecting client's backlog since its
    // Last-Event-ID is replayed from the database before live events
    // start flowing.
    let since_id = req
        .headers()
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    if let Some(since_id) = since_id {
        let backlog = store.list_events(None, None, Some(since_id), &crate::db::Paging { offset: 0, limit: 500 });
        for event in backlog.items.into_iter().rev() {
            if filter.matches(&event, &store) {
                let _ = tx.send(format_frame(&event));
            }
        }
    }

    std::thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            if !filter.matches(&event, &store) {
                continue;
            }
            if tx.send(format_frame(&event)).is_err() {
                break;
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, actix_web::Error>(web::Bytes::from(frame)), rx))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}
