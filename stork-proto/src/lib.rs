//! Generated gRPC stubs for the agent transport, plus a thin re-export so
//! downstream crates depend on `stork_proto::agent` rather than reaching
//! into `tonic`-generated module paths directly.

pub mod agent {
    tonic::include_proto!("stork.agent");
}

pub use agent::agent_service_client::AgentServiceClient;
pub use agent::agent_service_server::{AgentService, AgentServiceServer};
pub use agent::registration_client::RegistrationClient;
pub use agent::registration_server::{Registration, RegistrationServer};
