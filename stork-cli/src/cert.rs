//! Certificate and token material management: `cert-export`,
//! `cert-import`. The five objects the CLI exchanges mirror what
//! `stork-server`'s mTLS loader ([`stork_server::tls`], not visible from
//! here, but its constants are) expects under `cert_dir`: a CA keypair
//! used only by this tool to mint the server's own certificate, and the
//! server's own keypair plus its enrollment token.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use fs::file::reader::FileReader;
use fs::file::writer::FileWriter;
use fs::file::LocalFile;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CertObject {
    Cakey,
    Cacert,
    Srvkey,
    Srvcert,
    Srvtkn,
}

impl CertObject {
    /// The filename this object is persisted under within `cert_dir`,
    /// matching the paths `stork-server`'s TLS loader reads at boot.
    fn file_name(self) -> &'static str {
        match self {
            CertObject::Cakey => "ca-key.pem",
            CertObject::Cacert => "ca-cert.pem",
            CertObject::Srvkey => "server-key.pem",
            CertObject::Srvcert => "server-cert.pem",
            CertObject::Srvtkn => "server-token",
        }
    }
}

#[derive(Error, Debug)]
pub enum CertError {
    #[error("could not read {0}: {1}")]
    Read(PathBuf, io::Error),
    #[error("could not write {0}: {1}")]
    Write(PathBuf, fs::file::writer::WriteError),
    #[error("could not create certificate directory {0}: {1}")]
    CreateDir(PathBuf, io::Error),
    #[error("could not generate certificate: {0}")]
    Generate(#[from] rcgen::RcgenError),
}

fn ensure_cert_dir(cert_dir: &Path) -> Result<(), CertError> {
    std::fs::create_dir_all(cert_dir).map_err(|e| CertError::CreateDir(cert_dir.to_path_buf(), e))
}

fn ca_params() -> CertificateParams {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "Stork Fleet Monitor CA");
    params.distinguished_name = dn;
    params
}

fn server_params() -> CertificateParams {
    let mut params = CertificateParams::new(vec!["stork-server".to_string()]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "Stork Fleet Monitor Server");
    params.distinguished_name = dn;
    params
}

/// Loads the CA (generating a fresh self-signed one under `cert_dir` if
/// absent) so the server certificate can be signed by it.
fn load_or_generate_ca(cert_dir: &Path) -> Result<(Certificate, String, String), CertError> {
    let local_file = LocalFile;
    let key_path = cert_dir.join(CertObject::Cakey.file_name());
    let cert_path = cert_dir.join(CertObject::Cacert.file_name());

    if key_path.is_file() && cert_path.is_file() {
        let key_pem = local_file.read(&key_path).map_err(|e| CertError::Read(key_path.clone(), e))?;
        let cert_pem = local_file.read(&cert_path).map_err(|e| CertError::Read(cert_path.clone(), e))?;
        let key_pair = KeyPair::from_pem(&key_pem).map_err(CertError::Generate)?;
        let cert = Certificate::from_ca_cert_pem(&cert_pem, key_pair).map_err(CertError::Generate)?;
        return Ok((cert, key_pem, cert_pem));
    }

    ensure_cert_dir(cert_dir)?;
    let cert = Certificate::from_params(ca_params())?;
    let key_pem = cert.serialize_private_key_pem();
    let cert_pem = cert.serialize_pem()?;
    local_file.write(&key_path, key_pem.clone()).map_err(|e| CertError::Write(key_path, e))?;
    local_file.write(&cert_path, cert_pem.clone()).map_err(|e| CertError::Write(cert_path, e))?;
    Ok((cert, key_pem, cert_pem))
}

fn load_or_generate_server_cert(cert_dir: &Path) -> Result<(String, String), CertError> {
    let local_file = LocalFile;
    let key_path = cert_dir.join(CertObject::Srvkey.file_name());
    let cert_path = cert_dir.join(CertObject::Srvcert.file_name());

    if key_path.is_file() && cert_path.is_file() {
        let key_pem = local_file.read(&key_path).map_err(|e| CertError::Read(key_path.clone(), e))?;
        let cert_pem = local_file.read(&cert_path).map_err(|e| CertError::Read(cert_path.clone(), e))?;
        return Ok((key_pem, cert_pem));
    }

    let (ca_cert, _ca_key_pem, _ca_cert_pem) = load_or_generate_ca(cert_dir)?;
    ensure_cert_dir(cert_dir)?;

    let server_cert = Certificate::from_params(server_params())?;
    let key_pem = server_cert.serialize_private_key_pem();
    let cert_pem = server_cert.serialize_pem_with_signer(&ca_cert)?;

    local_file.write(&key_path, key_pem.clone()).map_err(|e| CertError::Write(key_path, e))?;
    local_file.write(&cert_path, cert_pem.clone()).map_err(|e| CertError::Write(cert_path, e))?;
    Ok((key_pem, cert_pem))
}

fn load_or_generate_token(cert_dir: &Path) -> Result<String, CertError> {
    let local_file = LocalFile;
    let token_path = cert_dir.join(CertObject::Srvtkn.file_name());
    if token_path.is_file() {
        return local_file.read(&token_path).map_err(|e| CertError::Read(token_path, e));
    }
    ensure_cert_dir(cert_dir)?;
    let token: String = rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect();
    local_file.write(&token_path, token.clone()).map_err(|e| CertError::Write(token_path, e))?;
    Ok(token)
}

/// Returns the requested object's content, generating it (and anything it
/// depends on — the server cert depends on the CA) the first time it is
/// asked for.
pub fn export(object: CertObject, cert_dir: &Path) -> Result<String, CertError> {
    match object {
        CertObject::Cakey => Ok(load_or_generate_ca(cert_dir)?.1),
        CertObject::Cacert => Ok(load_or_generate_ca(cert_dir)?.2),
        CertObject::Srvkey => Ok(load_or_generate_server_cert(cert_dir)?.0),
        CertObject::Srvcert => Ok(load_or_generate_server_cert(cert_dir)?.1),
        CertObject::Srvtkn => load_or_generate_token(cert_dir),
    }
}

/// Overwrites the requested object with externally-supplied content —
/// restoring a backed-up CA onto a freshly provisioned server, for
/// instance.
pub fn import(object: CertObject, content: &str, cert_dir: &Path) -> Result<(), CertError> {
    ensure_cert_dir(cert_dir)?;
    let local_file = LocalFile;
    let path = cert_dir.join(object.file_name());
    local_file.write(&path, content.to_string()).map_err(|e| CertError::Write(path, e))
}

pub fn read_input(input: Option<&Path>) -> io::Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn write_output(output: Option<&Path>, content: &str) -> io::Result<()> {
    match output {
        Some(path) => std::fs::write(path, content),
        None => io::stdout().write_all(content.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exporting_ca_key_twice_returns_the_same_material() {
        let dir = tempdir().unwrap();
        let first = export(CertObject::Cakey, dir.path()).unwrap();
        let second = export(CertObject::Cakey, dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn server_cert_generation_creates_a_ca_as_a_side_effect() {
        let dir = tempdir().unwrap();
        export(CertObject::Srvcert, dir.path()).unwrap();
        assert!(dir.path().join("ca-cert.pem").is_file());
        assert!(dir.path().join("server-cert.pem").is_file());
    }

    #[test]
    fn token_export_persists_and_is_stable() {
        let dir = tempdir().unwrap();
        let first = export(CertObject::Srvtkn, dir.path()).unwrap();
        let second = export(CertObject::Srvtkn, dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 48);
    }

    #[test]
    fn import_overwrites_the_named_object() {
        let dir = tempdir().unwrap();
        import(CertObject::Cacert, "fake-pem-content", dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join("ca-cert.pem")).unwrap();
        assert_eq!(content, "fake-pem-content");
    }
}
