use std::io::{IsTerminal, Write};
use std::process::exit;

use clap::Parser;
use stork_cli::cert;
use stork_cli::cli::{AdminConnectArgs, Cli, Command, DbConnectArgs};
use stork_cli::db::{self, DbTarget};
use stork_core::telemetry::LoggingConfig;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let _logging_guard = LoggingConfig::default().try_init("stork-tool").unwrap_or_else(|e| {
        eprintln!("could not initialize logging: {e}");
        exit(1);
    });

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("could not start the async runtime: {e}");
        exit(1);
    });

    if let Err(code) = runtime.block_on(run(cli.command)) {
        exit(code);
    }
}

async fn run(command: Command) -> Result<(), i32> {
    match command {
        Command::DbCreate { admin, target } => {
            let admin = resolve_admin(admin);
            let target = resolve_db(target);
            db::create(&admin, &target).await.map_err(|e| fail("db-create", e))
        }
        Command::DbPasswordGen => {
            println!("{}", db::generate_password());
            Ok(())
        }
        Command::DbInit { db } => {
            let target = resolve_db(db);
            db::init(&target).await.map_err(|e| fail("db-init", e))
        }
        Command::DbUp { db, target, migrations_dir } => {
            let target_db = resolve_db(db);
            let version = db::up(&target_db, &migrations_dir, target).await.map_err(|e| fail("db-up", e))?;
            println!("schema now at version {version}");
            Ok(())
        }
        Command::DbDown { db, target, migrations_dir } => {
            let target_db = resolve_db(db);
            let version = db::down(&target_db, &migrations_dir, target).await.map_err(|e| fail("db-down", e))?;
            println!("schema now at version {version}");
            Ok(())
        }
        Command::DbReset { db, migrations_dir } => {
            let target_db = resolve_db(db);
            let version = db::reset(&target_db, &migrations_dir).await.map_err(|e| fail("db-reset", e))?;
            println!("schema now at version {version}");
            Ok(())
        }
        Command::DbVersion { db } => {
            let target_db = resolve_db(db);
            let version = db::version(&target_db).await.map_err(|e| fail("db-version", e))?;
            println!("{version}");
            Ok(())
        }
        Command::DbSetVersion { db, target } => {
            let target_db = resolve_db(db);
            db::set_version_command(&target_db, target).await.map_err(|e| fail("db-set-version", e))
        }
        Command::CertExport { object, output, cert } => {
            let content = cert::export(object, &cert.cert_dir).map_err(|e| fail("cert-export", e))?;
            cert::write_output(output.as_deref(), &content).map_err(|e| fail_io("cert-export", e))
        }
        Command::CertImport { object, input, cert } => {
            let content = cert::read_input(input.as_deref()).map_err(|e| fail_io("cert-import", e))?;
            cert::import(object, &content, &cert.cert_dir).map_err(|e| fail("cert-import", e))
        }
    }
}

fn resolve_db(args: DbConnectArgs) -> DbTarget {
    let password = args.db_password.unwrap_or_else(|| prompt_password("database password"));
    DbTarget {
        host: args.db_host,
        port: args.db_port,
        dbname: args.db_name,
        user: args.db_user,
        password,
    }
}

fn resolve_admin(args: AdminConnectArgs) -> DbTarget {
    let password = args.admin_password.unwrap_or_else(|| prompt_password("admin database password"));
    DbTarget {
        host: args.admin_host,
        port: args.admin_port,
        dbname: "postgres".to_string(),
        user: args.admin_user,
        password,
    }
}

/// Reads a credential from stdin when it's a TTY; falls back to an empty
/// string otherwise so a non-interactive invocation with a
/// trust-authenticated database still proceeds instead of hanging.
fn prompt_password(label: &str) -> String {
    if !std::io::stdin().is_terminal() {
        return String::new();
    }
    eprint!("{label}: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim_end_matches(['\n', '\r']).to_string()
}

fn fail<E: std::fmt::Display>(command: &str, err: E) -> i32 {
    error!("{command} failed: {err}");
    1
}

fn fail_io(command: &str, err: std::io::Error) -> i32 {
    error!("{command} failed: {err}");
    1
}
