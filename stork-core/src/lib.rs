//! Core data model and control-plane algorithms for the fleet monitor:
//! the in-memory types shared by the server and agent, the reconciliation
//! algorithm that merges freshly-pulled state into them, the config review
//! engine, and the statistics utilization aggregator.

pub mod credentials;
pub mod error;
pub mod event_bus;
pub mod model;
pub mod puller;
pub mod reconcile;
pub mod review;
pub mod store;
pub mod telemetry;
pub mod utilization;

pub use error::{CoreError, CoreResult, ErrorKind};
