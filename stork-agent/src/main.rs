use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stork_agent::credentials_file;
use stork_agent::forwarder::Forwarder;
use stork_agent::metrics::{metrics_handler, AgentMetrics};
use stork_agent::rpc::{AgentServiceImpl, DetectorPaths};
use stork_agent::settings::AgentSettings;
use stork_agent::{register, tls};
use tokio::sync::RwLock;
use tonic::transport::Server;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, about = "Stork fleet monitor agent", long_about = None)]
struct Cli {
    /// Overrides the default config file search path.
    #[arg(long)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent's RPC server and metrics endpoint (the default when
    /// no subcommand is given).
    Run,
    /// Submit (or re-submit) the agent's registration request to `server`.
    Register {
        #[arg(short = 'u', long = "server")]
        server: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let settings = match AgentSettings::load(cli.config_file.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("could not load agent settings: {e}");
            exit(1);
        }
    };

    let _logging_guard = settings
        .logging
        .try_init("stork-agent")
        .unwrap_or_else(|e| {
            eprintln!("could not initialize logging: {e}");
            exit(1);
        });

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!("could not start the async runtime: {e}");
        exit(1);
    });

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => runtime.block_on(run(settings)),
        Command::Register { server } => runtime.block_on(run_register(settings, server)),
    };

    if let Err(e) = result {
        error!("stork-agent exited with an error: {e}");
        exit(1);
    }
}

async fn run_register(settings: AgentSettings, server: String) -> Result<(), Box<dyn std::error::Error>> {
    let cert_path = settings.cert_dir.join("agent-cert.pem");
    let outcome = register::register(
        &server,
        &hostname(),
        &settings.bind_address,
        settings.agent_port,
        &cert_path,
        env!("CARGO_PKG_VERSION"),
    )
    .await?;

    info!(
        machine_id = outcome.machine_id,
        authorized = outcome.authorized,
        "registration request submitted"
    );
    Ok(())
}

async fn run(settings: AgentSettings) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = Arc::new(RwLock::new(
        credentials_file::load(&settings.credentials_file).unwrap_or_else(|e| {
            error!("could not load credentials file, starting with an empty store: {e}");
            stork_core::credentials::CredentialStore::new()
        }),
    ));

    let forwarder = Arc::new(Forwarder::new(credentials));
    let metrics = actix_web::web::Data::new(AgentMetrics::default());

    let detector_paths = DetectorPaths {
        kea_ca_config: Some(PathBuf::from("/etc/kea/kea-ctrl-agent.conf")),
        named_conf: Some(PathBuf::from("/etc/bind/named.conf")),
    };
    let agent_service = AgentServiceImpl::new(detector_paths, forwarder, env!("CARGO_PKG_VERSION").to_string());

    let grpc_addr = format!("{}:{}", settings.bind_address, settings.agent_port).parse()?;

    let tls_config = tls::server_tls_config(
        &settings.cert_dir.join("agent-cert.pem"),
        &settings.cert_dir.join("agent-key.pem"),
        &settings.cert_dir.join("ca-cert.pem"),
    );

    let mut builder = Server::builder();
    match tls_config {
        Ok(tls_config) => {
            builder = builder.tls_config(tls_config)?;
        }
        Err(e) => error!("mTLS not configured, serving gRPC without transport security: {e}"),
    }
    let grpc_server = builder.add_service(stork_proto::AgentServiceServer::new(agent_service));

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_signal.notify_one();
    })?;

    let grpc = grpc_server.serve_with_shutdown(grpc_addr, shutdown.notified());

    let http = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(metrics.clone())
            .service(metrics_handler)
    })
    .bind(("0.0.0.0", 9100))?
    .run();

    info!(%grpc_addr, "stork-agent listening");

    tokio::select! {
        result = grpc => result.map_err(Into::into),
        result = http => result.map_err(Into::into),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
