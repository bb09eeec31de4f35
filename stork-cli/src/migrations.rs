//! Discovers the `{version}_{name}.up.sql` / `.down.sql` pairs under a
//! migrations directory. The workspace keeps a single numeric
//! `schema_version` counter, not per-migration checksums, so this
//! hand-rolled discovery plus [`crate::db`]'s runner stand in for
//! `sqlx::migrate!`, which tracks migrations individually and has no
//! built-in notion of reverting to an arbitrary target version.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationDiscoveryError {
    #[error("could not read migrations directory {0}: {1}")]
    ReadDir(PathBuf, std::io::Error),
    #[error("migration file `{0}` has no numeric version prefix")]
    MissingVersion(String),
    #[error("migration `{0}` (version {1}) has no matching `.down.sql` file")]
    MissingDown(String, i64),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql_path: PathBuf,
    pub down_sql_path: PathBuf,
}

impl Migration {
    pub fn up_sql(&self) -> Result<String, std::io::Error> {
        fs::read_to_string(&self.up_sql_path)
    }

    pub fn down_sql(&self) -> Result<String, std::io::Error> {
        fs::read_to_string(&self.down_sql_path)
    }
}

/// Returns every migration under `dir`, sorted ascending by version.
pub fn discover(dir: &Path) -> Result<Vec<Migration>, MigrationDiscoveryError> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationDiscoveryError::ReadDir(dir.to_path_buf(), e))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationDiscoveryError::ReadDir(dir.to_path_buf(), e))?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let Some(stem) = file_name.strip_suffix(".up.sql") else {
            continue;
        };

        let (version_str, name) = stem
            .split_once('_')
            .ok_or_else(|| MigrationDiscoveryError::MissingVersion(file_name.to_string()))?;
        let version: i64 = version_str
            .parse()
            .map_err(|_| MigrationDiscoveryError::MissingVersion(file_name.to_string()))?;

        let down_sql_path = dir.join(format!("{stem}.down.sql"));
        if !down_sql_path.is_file() {
            return Err(MigrationDiscoveryError::MissingDown(name.to_string(), version));
        }

        migrations.push(Migration {
            version,
            name: name.to_string(),
            up_sql_path: entry.path(),
            down_sql_path,
        });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn discovers_and_sorts_migrations_by_version() {
        let dir = tempdir().unwrap();
        write(dir.path().join("20240102000000_second.up.sql"), "-- up 2").unwrap();
        write(dir.path().join("20240102000000_second.down.sql"), "-- down 2").unwrap();
        write(dir.path().join("20240101000000_first.up.sql"), "-- up 1").unwrap();
        write(dir.path().join("20240101000000_first.down.sql"), "-- down 1").unwrap();

        let migrations = discover(dir.path()).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 20240101000000);
        assert_eq!(migrations[0].name, "first");
        assert_eq!(migrations[1].version, 20240102000000);
    }

    #[test]
    fn missing_down_file_is_an_error() {
        let dir = tempdir().unwrap();
        write(dir.path().join("20240101000000_first.up.sql"), "-- up").unwrap();

        assert!(discover(dir.path()).is_err());
    }
}
