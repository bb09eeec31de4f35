use std::process::exit;
use std::sync::{Arc, RwLock};

use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use stork_core::event_bus::EventBus;
use stork_core::puller::Scheduler;
use stork_server::db::PgStore;
use stork_server::install_script::install_script_handler;
use stork_server::metrics::metrics_handler;
use stork_server::pullers::client::AgentClientFactory;
use stork_server::pullers::build_registry;
use stork_server::registration::RegistrationImpl;
use stork_server::settings::ServerSettings;
use stork_server::sse::sse_handler;
use stork_server::{rest, tls};
use tonic::transport::Server;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, about = "Stork fleet monitor server", long_about = None)]
struct Cli {
    /// Overrides the default config file search path.
    #[arg(long)]
    config_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST/SSE API, gRPC registration service and puller
    /// scheduler (the default when no subcommand is given).
    Run,
}

fn main() {
    let cli = Cli::parse();
    let settings = match ServerSettings::load(cli.config_file.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("could not load server settings: {e}");
            exit(1);
        }
    };

    let _logging_guard = settings.logging.try_init("stork-server").unwrap_or_else(|e| {
        eprintln!("could not initialize logging: {e}");
        exit(1);
    });

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!("could not start the async runtime: {e}");
        exit(1);
    });

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            if let Err(e) = runtime.block_on(run(settings)) {
                error!("stork-server exited with an error: {e}");
                exit(1);
            }
        }
    }
}

async fn run(settings: ServerSettings) -> Result<(), Box<dyn std::error::Error>> {
    // Schema migrations are an operator action (`stork-tool db-up`), not an
    // implicit side effect of starting the server.
    let pool = PgPoolOptions::new().max_connections(10).connect(&settings.database_url).await?;

    let store = PgStore::new(pool, tokio::runtime::Handle::current());
    let events = Arc::new(EventBus::default());
    let clients = AgentClientFactory::new(store.clone(), settings.cert_dir.clone());
    let shared_settings: Arc<RwLock<ServerSettings>> = Arc::new(RwLock::new(settings.clone()));

    let registry = build_registry(store.clone(), clients.clone(), events.clone(), shared_settings.clone());
    let scheduler_store = store.clone();
    let scheduler = Arc::new(Scheduler::new(registry, move || scheduler_store.all_daemon_ids()));
    let registry_handle = scheduler.registry_handle();

    let (stop_tx, stop_rx) = crossbeam::channel::bounded(1);
    let scheduler_thread_handle = scheduler.clone();
    let scheduler_thread = std::thread::spawn(move || scheduler_thread_handle.run(&stop_rx));

    let server_url = format!("https://{}:{}", public_host(&settings.rest_bind_address), settings.rest_port);

    let registration = RegistrationImpl::new(store.clone(), events.clone(), settings.cert_dir.clone());
    let grpc_addr = format!("{}:{}", settings.rpc_bind_address, settings.rpc_port).parse()?;
    let tls_config = tls::server_tls_config(
        &settings.cert_dir.join("server-cert.pem"),
        &settings.cert_dir.join("server-key.pem"),
        &settings.cert_dir.join("ca-cert.pem"),
    );

    let mut builder = Server::builder();
    match tls_config {
        Ok(tls_config) => {
            builder = builder.tls_config(tls_config)?;
        }
        Err(e) => error!("mTLS not configured, serving gRPC without transport security: {e}"),
    }
    let grpc_server = builder.add_service(stork_proto::RegistrationServer::new(registration));

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_signal.notify_one();
    })?;

    let grpc = grpc_server.serve_with_shutdown(grpc_addr, shutdown.notified());

    let http_store = store.clone();
    let http_events = events.clone();
    let http_clients = clients.clone();
    let http_registry = registry_handle.clone();
    let http_settings = shared_settings.clone();
    let http_server_url = server_url.clone();
    let rest_bind_address = settings.rest_bind_address.clone();
    let rest_port = settings.rest_port;

    let http = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_store.clone()))
            .app_data(web::Data::new(http_events.clone()))
            .app_data(web::Data::new(http_clients.clone()))
            .app_data(web::Data::new(http_registry.clone()))
            .app_data(web::Data::new(http_settings.clone()))
            .app_data(web::Data::new(http_server_url.clone()))
            .service(metrics_handler)
            .service(sse_handler)
            .service(install_script_handler)
            .configure(rest::configure)
    })
    .bind((rest_bind_address.as_str(), rest_port))?
    .run();

    info!(%grpc_addr, rest_port, "stork-server listening");

    let result = tokio::select! {
        result = grpc => result.map_err(Into::into),
        result = http => result.map_err(Into::into),
    };

    let _ = stop_tx.send(());
    let _ = scheduler_thread.join();
    result
}

fn public_host(bind_address: &str) -> &str {
    if bind_address == "0.0.0.0" {
        "localhost"
    } else {
        bind_address
    }
}
