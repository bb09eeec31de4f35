//! Re-exports a handful of agent-local Prometheus gauges/counters on its
//! own `/metrics` endpoint, so the server's metrics puller (or an
//! operator's own Prometheus) can scrape the agent directly without
//! going through the gRPC channel.

use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::{get, HttpResponse};

#[derive(Default)]
pub struct AgentMetrics {
    forwarded_to_kea: AtomicU64,
    forwarded_to_named: AtomicU64,
    forward_errors: AtomicU64,
}

impl AgentMetrics {
    pub fn record_forward_to_kea(&self) {
        self.forwarded_to_kea.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward_to_named(&self) {
        self.forwarded_to_named.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward_error(&self) {
        self.forward_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition format, snapshotted in one pass so a
    /// scrape never observes a partially updated set of counters.
    pub fn render(&self) -> String {
        let kea = self.forwarded_to_kea.load(Ordering::Relaxed);
        let named = self.forwarded_to_named.load(Ordering::Relaxed);
        let errors = self.forward_errors.load(Ordering::Relaxed);

        format!(
            "# HELP stork_agent_forwarded_to_kea_total Commands forwarded to the Kea Control Agent.\n\
             # TYPE stork_agent_forwarded_to_kea_total counter\n\
             stork_agent_forwarded_to_kea_total {kea}\n\
             # HELP stork_agent_forwarded_to_named_total Commands forwarded to named's statistics channel.\n\
             # TYPE stork_agent_forwarded_to_named_total counter\n\
             stork_agent_forwarded_to_named_total {named}\n\
             # HELP stork_agent_forward_errors_total Forwarding attempts that failed.\n\
             # TYPE stork_agent_forward_errors_total counter\n\
             stork_agent_forward_errors_total {errors}\n"
        )
    }
}

#[get("/metrics")]
pub async fn metrics_handler(metrics: actix_web::web::Data<AgentMetrics>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_recorded_counters() {
        let metrics = AgentMetrics::default();
        metrics.record_forward_to_kea();
        metrics.record_forward_to_kea();
        metrics.record_forward_error();

        let rendered = metrics.render();
        assert!(rendered.contains("stork_agent_forwarded_to_kea_total 2"));
        assert!(rendered.contains("stork_agent_forward_errors_total 1"));
    }
}
