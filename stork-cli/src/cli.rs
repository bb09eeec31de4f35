//! Argument parsing for `stork-tool`. Database
//! connection flags double as `STORK_DATABASE_*` environment variables and
//! cert/token flags as `STORK_TOOL_*`, via clap's `env` attribute, so the
//! same binary works unattended in a container or interactively on a
//! workstation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cert::CertObject;

#[derive(Parser, Debug)]
#[command(author, about = "Stork fleet monitor admin tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Creates the role and database described by `--db-*`, connecting as
    /// `--admin-*` to the server's `postgres` maintenance database.
    DbCreate {
        #[command(flatten)]
        admin: AdminConnectArgs,
        #[command(flatten)]
        target: DbConnectArgs,
    },
    /// Prints a freshly generated, shell-safe password and exits; does not
    /// touch the database.
    DbPasswordGen,
    /// Bootstraps the `schema_version` counter on a database that has none
    /// yet.
    DbInit {
        #[command(flatten)]
        db: DbConnectArgs,
    },
    /// Applies pending migrations, optionally stopping at `--target`.
    DbUp {
        #[command(flatten)]
        db: DbConnectArgs,
        #[arg(short = 't', long)]
        target: Option<i64>,
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },
    /// Reverts applied migrations, optionally stopping at `--target`.
    DbDown {
        #[command(flatten)]
        db: DbConnectArgs,
        #[arg(short = 't', long)]
        target: Option<i64>,
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },
    /// Reverts every migration and reapplies them from scratch.
    DbReset {
        #[command(flatten)]
        db: DbConnectArgs,
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },
    /// Prints the currently recorded `schema_version`.
    DbVersion {
        #[command(flatten)]
        db: DbConnectArgs,
    },
    /// Overwrites the recorded `schema_version` without running any
    /// migration.
    DbSetVersion {
        #[command(flatten)]
        db: DbConnectArgs,
        #[arg(short = 't', long)]
        target: i64,
    },
    /// Prints the requested certificate or token, generating it (and any
    /// prerequisite, such as the CA) on first use.
    CertExport {
        #[arg(short = 'f', long, value_enum)]
        object: CertObject,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        cert: CertDirArgs,
    },
    /// Overwrites the requested certificate or token with externally
    /// supplied content.
    CertImport {
        #[arg(short = 'f', long, value_enum)]
        object: CertObject,
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        cert: CertDirArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DbConnectArgs {
    #[arg(long, env = "STORK_DATABASE_HOST", default_value = "localhost")]
    pub db_host: String,
    #[arg(long, env = "STORK_DATABASE_PORT", default_value_t = 5432)]
    pub db_port: u16,
    #[arg(long, env = "STORK_DATABASE_NAME", default_value = "stork")]
    pub db_name: String,
    #[arg(long, env = "STORK_DATABASE_USER", default_value = "stork")]
    pub db_user: String,
    /// Prompted for on a TTY when neither this nor `STORK_DATABASE_PASSWORD`
    /// is set.
    #[arg(long, env = "STORK_DATABASE_PASSWORD")]
    pub db_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AdminConnectArgs {
    #[arg(long, env = "STORK_DATABASE_HOST", default_value = "localhost")]
    pub admin_host: String,
    #[arg(long, env = "STORK_DATABASE_PORT", default_value_t = 5432)]
    pub admin_port: u16,
    #[arg(long, env = "STORK_DATABASE_ADMIN_USER", default_value = "postgres")]
    pub admin_user: String,
    /// Prompted for on a TTY when neither this nor
    /// `STORK_DATABASE_ADMIN_PASSWORD` is set.
    #[arg(long, env = "STORK_DATABASE_ADMIN_PASSWORD")]
    pub admin_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CertDirArgs {
    #[arg(long, env = "STORK_TOOL_CERT_DIR", default_value = "/etc/stork/certs")]
    pub cert_dir: PathBuf,
}
