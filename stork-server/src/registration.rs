//! The server side of [`stork_proto::Registration`]: called once per agent
//! boot, idempotently, matching on `(address, agent_port)`. A freshly
//! registered machine starts unauthorized; an admin flips it via the REST
//! API before any puller will contact it.

use std::path::PathBuf;
use std::sync::Arc;

use fs::file::reader::FileReader;
use fs::file::LocalFile;
use sha2::{Digest, Sha256};
use stork_core::event_bus::EventBus;
use stork_core::model::{Event, Relations};
use stork_proto::agent::{RegisterRequest, RegisterResponse};
use tonic::{Request, Response, Status};

use crate::db::PgStore;

pub struct RegistrationImpl {
    store: PgStore,
    events: Arc<EventBus>,
    ca_cert_path: PathBuf,
}

impl RegistrationImpl {
    pub fn new(store: PgStore, events: Arc<EventBus>, cert_dir: PathBuf) -> Self {
        Self {
            store,
            events,
            ca_cert_path: cert_dir.join("ca-cert.pem"),
        }
    }
}

#[tonic::async_trait]
impl stork_proto::Registration for RegistrationImpl {
    async fn register(&self, request: Request<RegisterRequest>) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        let agent_port: u16 = req
            .agent_port
            .try_into()
            .map_err(|_| Status::invalid_argument("agent_port out of range"))?;

        let mut store = self.store.clone();
        let machine_id = stork_core::store::MachineRepository::upsert_machine(&mut store, &req.address, agent_port)
            .map_err(core_error_to_status)?;

        let fingerprint = fingerprint(req.certificate_pem.as_bytes());
        let machine = self.store.get_machine(machine_id);
        let already_authorized = machine.as_ref().map(|m| m.authorized).unwrap_or(false);

        let _ = self.store.block_on(
            sqlx::query("UPDATE machine SET agent_token_fingerprint = $2, agent_cert_pem = $3 WHERE id = $1")
                .bind(machine_id.0)
                .bind(&fingerprint)
                .bind(&req.certificate_pem)
                .execute(self.store.pool()),
        );

        if !already_authorized {
            let draft = Event::info(
                0,
                chrono::Utc::now(),
                format!("machine {} ({}) registered, pending authorization", req.hostname, req.address),
            )
            .with_relations(Relations { machine_id: Some(machine_id), ..Default::default() });

            if let Ok(id) = self.store.record_event(&draft) {
                self.events.publish(Event { id, ..draft });
            }
        }

        let local_file = LocalFile;
        let server_ca_pem = local_file.read(&self.ca_cert_path).unwrap_or_default();

        Ok(Response::new(RegisterResponse {
            machine_id: machine_id.0,
            authorized: already_authorized,
            server_ca_pem,
        }))
    }
}

fn fingerprint(cert_pem: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert_pem);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
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
