//! Database provisioning and migration lifecycle: `db-create`,
//! `db-password-gen`, `db-init`, `db-up`, `db-down`, `db-reset`,
//! `db-version`, `db-set-version`. Schema version is a single counter,
//! so migrations are applied/reverted by hand against `schema_version`
//! rather than through `sqlx::migrate!`'s per-file bookkeeping table.

use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::{Connection, Executor, PgConnection};
use thiserror::Error;

use crate::migrations::{discover, Migration, MigrationDiscoveryError};

#[derive(Debug, Clone)]
pub struct DbTarget {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DbTarget {
    fn connection_string(&self, dbname: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencode(&self.user),
            urlencode(&self.password),
            self.host,
            self.port,
            dbname
        )
    }
}

/// Minimal percent-encoding for credentials embedded in a connection URL;
/// `sqlx::postgres::PgConnectOptions` would also do, but a plain URL keeps
/// this module free of an extra builder dependency.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("could not discover migrations: {0}")]
    Discovery(#[from] MigrationDiscoveryError),
    #[error("could not read migration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("target version {0} does not match any known migration")]
    UnknownVersion(i64),
}

/// Generates a random password suitable for `db-create`'s role, the way
/// an operator piping `db-password-gen` into `db-create -p` would expect:
/// alphanumeric only, so it never needs shell-quoting.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Creates the role and database for `target`, connecting as `admin` to
/// the server's always-present `postgres` maintenance database.
pub async fn create(admin: &DbTarget, target: &DbTarget) -> Result<(), DbError> {
    let mut conn = PgConnection::connect(&admin.connection_string("postgres")).await?;

    let role_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(&target.user)
            .fetch_one(&mut conn)
            .await?;
    if !role_exists {
        conn.execute(
            format!(
                "CREATE ROLE \"{}\" LOGIN PASSWORD '{}'",
                target.user,
                target.password.replace('\'', "''")
            )
            .as_str(),
        )
        .await?;
    }

    let db_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&target.dbname)
        .fetch_one(&mut conn)
        .await?;
    if !db_exists {
        conn.execute(format!("CREATE DATABASE \"{}\" OWNER \"{}\"", target.dbname, target.user).as_str())
            .await?;
    }

    Ok(())
}

async fn ensure_schema_version_table(conn: &mut PgConnection) -> Result<(), DbError> {
    conn.execute("CREATE TABLE IF NOT EXISTS schema_version (version BIGINT NOT NULL)")
        .await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&mut *conn)
        .await?;
    if count == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (0)").await?;
    }
    Ok(())
}

async fn current_version(conn: &mut PgConnection) -> Result<i64, DbError> {
    ensure_schema_version_table(conn).await?;
    let version: i64 = sqlx::query_scalar("SELECT version FROM schema_version").fetch_one(conn).await?;
    Ok(version)
}

async fn set_version(conn: &mut PgConnection, version: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE schema_version SET version = $1")
        .bind(version)
        .execute(conn)
        .await?;
    Ok(())
}

/// Applies every pending migration (those whose version is greater than
/// the currently recorded one), up to and including `target` when given,
/// otherwise the latest. Each migration runs in its own transaction,
/// immediately followed by the `schema_version` bump, so a crash mid-run
/// leaves the counter pointing at the last migration that actually
/// committed.
pub async fn up(target_db: &DbTarget, migrations_dir: &Path, target: Option<i64>) -> Result<i64, DbError> {
    let mut conn = PgConnection::connect(&target_db.connection_string(&target_db.dbname)).await?;
    let current = current_version(&mut conn).await?;
    let migrations = discover(migrations_dir)?;

    if let Some(v) = target {
        if v != 0 && !migrations.iter().any(|m| m.version == v) {
            return Err(DbError::UnknownVersion(v));
        }
    }

    let mut applied = current;
    for migration in migrations.iter().filter(|m| m.version > current) {
        if let Some(v) = target {
            if migration.version > v {
                break;
            }
        }
        apply_one(&mut conn, migration.up_sql()?, migration.version).await?;
        applied = migration.version;
    }
    Ok(applied)
}

/// Reverts migrations in descending version order down to (but not
/// including) `target`, or all of them when `target` is `None` (same as
/// `Some(0)`).
pub async fn down(target_db: &DbTarget, migrations_dir: &Path, target: Option<i64>) -> Result<i64, DbError> {
    let mut conn = PgConnection::connect(&target_db.connection_string(&target_db.dbname)).await?;
    let current = current_version(&mut conn).await?;
    let floor = target.unwrap_or(0);

    let mut migrations = discover(migrations_dir)?;
    migrations.sort_by(|a, b| b.version.cmp(&a.version));
    let to_revert: Vec<&Migration> = migrations.iter().filter(|m| m.version <= current && m.version > floor).collect();

    let mut version = current;
    for migration in to_revert {
        let prior_version = migrations
            .iter()
            .map(|m| m.version)
            .filter(|&v| v < migration.version)
            .max()
            .unwrap_or(0);
        apply_one(&mut conn, migration.down_sql()?, prior_version).await?;
        version = prior_version;
    }
    Ok(version)
}

async fn apply_one(conn: &mut PgConnection, sql: String, resulting_version: i64) -> Result<(), DbError> {
    let mut tx = conn.begin().await?;
    tx.execute(sql.as_str()).await?;
    sqlx::query("UPDATE schema_version SET version = $1")
        .bind(resulting_version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Drops and recreates every table by reverting to version 0 and
/// reapplying every migration.
pub async fn reset(target_db: &DbTarget, migrations_dir: &Path) -> Result<i64, DbError> {
    down(target_db, migrations_dir, Some(0)).await?;
    up(target_db, migrations_dir, None).await
}

/// Bootstraps the `schema_version` counter on a database that has none
/// yet, without applying any migration — the prerequisite `db-up` expects
/// before it has anything to count from.
pub async fn init(target_db: &DbTarget) -> Result<(), DbError> {
    let mut conn = PgConnection::connect(&target_db.connection_string(&target_db.dbname)).await?;
    ensure_schema_version_table(&mut conn).await
}

pub async fn version(target_db: &DbTarget) -> Result<i64, DbError> {
    let mut conn = PgConnection::connect(&target_db.connection_string(&target_db.dbname)).await?;
    current_version(&mut conn).await
}

/// Sets the recorded schema version directly, without running any
/// migration — an explicit administrative override for when the schema
/// was brought to that state out of band.
pub async fn set_version_command(target_db: &DbTarget, target: i64) -> Result<(), DbError> {
    let mut conn = PgConnection::connect(&target_db.connection_string(&target_db.dbname)).await?;
    ensure_schema_version_table(&mut conn).await?;
    set_version(&mut conn, target).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_alphanumeric_and_long_enough() {
        let password = generate_password();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("p@ss:word/"), "p%40ss%3Aword%2F");
        assert_eq!(urlencode("simple"), "simple");
    }
}
