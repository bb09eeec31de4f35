//! The agent side of [`stork_proto::AgentService`]: served over mTLS,
//! called by the server's pullers and REST handlers.

use std::sync::Arc;

use fs::file::reader::FileReader;
use fs::file::LocalFile;
use stork_proto::agent::{
    DetectedAccessPoint as WireAccessPoint, DetectedApp as WireApp,
    ForwardToKeaRequest, ForwardToKeaResponse, ForwardToNamedStatsRequest,
    ForwardToNamedStatsResponse, GetStateRequest, GetStateResponse, PingRequest, PingResponse,
    TailTextFileRequest, TailTextFileResponse,
};
use tonic::{Request, Response, Status};

use crate::detector::{self, DetectedAppKind};
use crate::forwarder::Forwarder;

/// Paths the detector reads on every `GetState` call — detection is cheap
/// and the underlying config can change between pulls, so nothing is
/// cached.
pub struct DetectorPaths {
    pub kea_ca_config: Option<std::path::PathBuf>,
    pub named_conf: Option<std::path::PathBuf>,
}

pub struct AgentServiceImpl {
    paths: DetectorPaths,
    forwarder: Arc<Forwarder>,
    agent_version: String,
    hostname: String,
}

impl AgentServiceImpl {
    pub fn new(paths: DetectorPaths, forwarder: Arc<Forwarder>, agent_version: String) -> Self {
        let hostname = hostname_or_unknown();
        Self {
            paths,
            forwarder,
            agent_version,
            hostname,
        }
    }

    fn detect_apps(&self) -> Vec<WireApp> {
        let local_file = LocalFile;
        let mut apps = Vec::new();

        if let Some(path) = &self.paths.kea_ca_config {
            if let Ok(text) = local_file.read(path) {
                if let Ok(app) = detector::kea::detect(&text) {
                    apps.push(to_wire_app(app));
                }
            }
        }

        if let Some(path) = &self.paths.named_conf {
            if let Ok(text) = local_file.read(path) {
                if let Ok(app) = detector::bind9::detect(&text) {
                    apps.push(to_wire_app(app));
                }
            }
        }

        apps
    }
}

fn to_wire_app(app: detector::DetectedApp) -> WireApp {
    WireApp {
        kind: match app.kind {
            DetectedAppKind::Kea => "kea".to_string(),
            DetectedAppKind::Bind9 => "bind9".to_string(),
        },
        access_points: app
            .access_points
            .into_iter()
            .map(|ap| WireAccessPoint {
                kind: match ap.kind {
                    detector::AccessPointKind::Control => "control".to_string(),
                    detector::AccessPointKind::Statistics => "statistics".to_string(),
                },
                address: ap.address,
                port: ap.port as u32,
                key: ap.key.unwrap_or_default(),
                use_secure_protocol: ap.use_secure_protocol,
            })
            .collect(),
    }
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn core_error_to_status(err: stork_core::CoreError) -> Status {
    match err.kind() {
        stork_core::ErrorKind::Unreachable => Status::unavailable(err.to_string()),
        stork_core::ErrorKind::Unauthorized => Status::unauthenticated(err.to_string()),
        stork_core::ErrorKind::InvalidInput => Status::invalid_argument(err.to_string()),
        stork_core::ErrorKind::NotFound => Status::not_found(err.to_string()),
        stork_core::ErrorKind::Conflict => Status::already_exists(err.to_string()),
        stork_core::ErrorKind::Internal => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl stork_proto::AgentService for AgentServiceImpl {
    async fn get_state(
        &self,
        _request: Request<GetStateRequest>,
    ) -> Result<Response<GetStateResponse>, Status> {
        Ok(Response::new(GetStateResponse {
            agent_version: self.agent_version.clone(),
            hostname: self.hostname.clone(),
            apps: self.detect_apps(),
        }))
    }

    async fn forward_to_kea_over_http(
        &self,
        request: Request<ForwardToKeaRequest>,
    ) -> Result<Response<ForwardToKeaResponse>, Status> {
        let req = request.into_inner();
        let response = self
            .forwarder
            .forward_to_kea_over_http(&req.url, req.request_body)
            .await
            .map_err(core_error_to_status)?;

        Ok(Response::new(ForwardToKeaResponse {
            status_code: response.status_code as u32,
            response_body: response.body,
        }))
    }

    async fn forward_to_named_stats(
        &self,
        request: Request<ForwardToNamedStatsRequest>,
    ) -> Result<Response<ForwardToNamedStatsResponse>, Status> {
        let req = request.into_inner();
        let response = self
            .forwarder
            .forward_to_named_stats(&req.url)
            .await
            .map_err(core_error_to_status)?;

        Ok(Response::new(ForwardToNamedStatsResponse {
            status_code: response.status_code as u32,
            response_body: response.body,
        }))
    }

    async fn tail_text_file(
        &self,
        request: Request<TailTextFileRequest>,
    ) -> Result<Response<TailTextFileResponse>, Status> {
        let req = request.into_inner();
        let local_file = LocalFile;
        let contents = local_file
            .read(std::path::Path::new(&req.path))
            .map_err(|e| Status::not_found(format!("{}: {e}", req.path)))?;

        let lines: Vec<String> = contents
            .lines()
            .skip(req.offset_lines as usize)
            .map(str::to_string)
            .collect();

        Ok(Response::new(TailTextFileResponse { lines }))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        Ok(Response::new(PingResponse { reachable: true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stork_core::credentials::CredentialStore;
    use tokio::sync::RwLock;

    fn service() -> AgentServiceImpl {
        AgentServiceImpl::new(
            DetectorPaths {
                kea_ca_config: None,
                named_conf: None,
            },
            Arc::new(Forwarder::new(Arc::new(RwLock::new(CredentialStore::new())))),
            "1.0.0-test".to_string(),
        )
    }

    #[tokio::test]
    async fn ping_always_reports_reachable() {
        let svc = service();
        let response = stork_proto::AgentService::ping(&svc, Request::new(PingRequest { machine_id: 1 }))
            .await
            .unwrap();
        assert!(response.into_inner().reachable);
    }

    #[tokio::test]
    async fn get_state_reports_no_apps_when_no_config_paths_configured() {
        let svc = service();
        let response = stork_proto::AgentService::get_state(
            &svc,
            Request::new(GetStateRequest { machine_id: 1 }),
        )
        .await
        .unwrap();
        assert!(response.into_inner().apps.is_empty());
    }
}
