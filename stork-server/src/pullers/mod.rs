//! Puller implementations and the fixed registry a deployment runs. Each
//! submodule owns one [`stork_core::puller::Puller`]; this file only
//! wires them together against a concrete store, agent client factory,
//! event bus and settings handle.

pub mod app_state;
pub mod client;
pub mod config_review;
pub mod discovery;
pub mod ha_status;
pub mod kea;
pub mod kea_config;
pub mod kea_hosts;
pub mod kea_stats;
pub mod machine_state;

use std::sync::Arc;

use stork_core::event_bus::EventBus;
use stork_core::puller::PullerRegistry;

use crate::db::PgStore;
use crate::settings::SharedSettings;

use app_state::AppStatePuller;
use client::AgentClientFactory;
use config_review::ConfigReviewPuller;
use ha_status::HaStatusPuller;
use kea_hosts::KeaHostsPuller;
use kea_stats::KeaStatsPuller;
use machine_state::MachineStatePuller;

/// Assembles the six mandatory pullers into a registry ready for
/// [`stork_core::puller::Scheduler`]. Registration order doesn't matter —
/// the scheduler indexes by name — but is kept roughly discovery-first,
/// narrower-and-more-frequent last, to match how an operator would reason
/// about the pipeline.
pub fn build_registry(store: PgStore, clients: AgentClientFactory, events: Arc<EventBus>, settings: SharedSettings) -> PullerRegistry {
    PullerRegistry::new()
        .register(Box::new(MachineStatePuller::new(store.clone(), clients.clone(), settings.clone())))
        .register(Box::new(AppStatePuller::new(store.clone(), clients.clone(), settings.clone())))
        .register(Box::new(KeaStatsPuller::new(store.clone(), clients.clone(), settings.clone())))
        .register(Box::new(KeaHostsPuller::new(store.clone(), clients.clone(), settings.clone())))
        .register(Box::new(HaStatusPuller::new(store.clone(), clients, settings.clone())))
        .register(Box::new(ConfigReviewPuller::new(store, events, settings)))
}
