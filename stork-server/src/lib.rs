//! Fleet control plane: the Postgres-backed inventory, the periodic
//! pullers that keep it in sync with the agents, the REST/SSE surface the
//! UI talks to, and the gRPC registration endpoint agents enroll through.

pub mod db;
pub mod install_script;
pub mod metrics;
pub mod pullers;
pub mod registration;
pub mod rest;
pub mod settings;
pub mod sse;
pub mod tls;
