//! Persists the agent's [`CredentialStore`] to disk: written to a sibling
//! `.tmp` file then renamed into place so a crash mid-write never leaves a
//! half-written credentials file behind.

use std::path::{Path, PathBuf};

use fs::file::reader::FileReader;
use fs::file::renamer::FileRenamer;
use fs::file::writer::FileWriter;
use fs::file::LocalFile;
use stork_core::credentials::CredentialStore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialsFileError {
    #[error("could not read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: stork_core::CoreError,
    },
    #[error("could not write credentials file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: fs::file::writer::WriteError,
    },
    #[error("could not finalize credentials file {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the credential store from `path`. A missing file is treated as an
/// empty store: the agent has not been given any Basic-Auth credentials
/// yet, which is the common case right after installation.
pub fn load(path: &Path) -> Result<CredentialStore, CredentialsFileError> {
    let local_file = LocalFile;
    if !path.exists() {
        return Ok(CredentialStore::new());
    }

    let contents = local_file
        .read(path)
        .map_err(|source| CredentialsFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut store = CredentialStore::new();
    store
        .read(contents.as_bytes())
        .map_err(|source| CredentialsFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(store)
}

pub fn save(path: &Path, store: &CredentialStore) -> Result<(), CredentialsFileError> {
    let local_file = LocalFile;
    let tmp_path = path.with_extension("tmp");
    let json = store
        .to_json()
        .map_err(|source| CredentialsFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    local_file
        .write(&tmp_path, json)
        .map_err(|source| CredentialsFileError::Write {
            path: tmp_path.clone(),
            source,
        })?;

    local_file
        .rename(&tmp_path, path)
        .map_err(|source| CredentialsFileError::Rename {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stork_core::credentials::BasicAuth;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_empty_store() {
        let dir = tempdir().unwrap();
        let store = load(&dir.path().join("absent.json")).unwrap();
        assert!(store.get_basic_auth("10.0.0.1", 80).is_none());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let mut store = CredentialStore::new();
        store
            .add_or_update_basic_auth(
                "10.0.0.1",
                8080,
                BasicAuth {
                    user: "admin".to_string(),
                    password: "secret".to_string(),
                },
            )
            .unwrap();
        save(&path, &store).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(
            loaded.get_basic_auth("10.0.0.1", 8080),
            store.get_basic_auth("10.0.0.1", 8080)
        );
    }
}
