use std::{
    fs,
    path::{Path, PathBuf},
};

use redis::{ClientTlsConfig, TlsCertificates, aio::ConnectionManager};

use super::AdminError;

pub const CERT_FILE: &str = "hybrasylCert.pem";
pub const KEY_FILE: &str = "hybrasylKey.pem";
pub const CA_FILE: &str = "eriscoca.pem";

const DEFAULT_DIR: &str = ".grpc";

/// Where the mutual TLS material lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl CredentialPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::with_files(dir, CERT_FILE, KEY_FILE, CA_FILE)
    }

    pub fn with_files(dir: impl AsRef<Path>, cert: &str, key: &str, ca: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            cert: dir.join(cert),
            key: dir.join(key),
            ca: dir.join(ca),
        }
    }

    /// `~/.grpc`
    pub fn default_dir() -> PathBuf {
        expand_home(&format!("~/{DEFAULT_DIR}"))
    }

    pub fn missing(&self) -> Vec<PathBuf> {
        [&self.cert, &self.key, &self.ca]
            .into_iter()
            .filter(|path| !path.is_file())
            .cloned()
            .collect()
    }
}

impl Default for CredentialPaths {
    fn default() -> Self {
        Self::in_dir(Self::default_dir())
    }
}

/// Loaded PEM material.
pub struct CredentialSet {
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
    pub ca: Vec<u8>,
}

impl CredentialSet {
    /// Read all three files. Every missing file is reported at once.
    pub fn load(paths: &CredentialPaths) -> Result<Self, AdminError> {
        let missing = paths.missing();
        if !missing.is_empty() {
            return Err(AdminError::MissingCredentials { paths: missing });
        }

        Ok(Self {
            client_cert: read(&paths.cert)?,
            client_key: read(&paths.key)?,
            ca: read(&paths.ca)?,
        })
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("client_cert", &self.client_cert.len())
            .field("client_key", &"<redacted>")
            .field("ca", &self.ca.len())
            .finish()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, AdminError> {
    fs::read(path).map_err(|source| AdminError::CredentialRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand a leading `~/` to `$HOME`.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// `host:port` to a TLS Redis URL. Full URLs pass through.
pub fn control_url(host: &str) -> String {
    if host.starts_with("redis://") || host.starts_with("rediss://") {
        host.to_string()
    } else {
        format!("rediss://{host}/")
    }
}

/// Mutual TLS connection to a host's control channel.
pub async fn connect_tls(url: &str, credentials: CredentialSet) -> Result<ConnectionManager, AdminError> {
    let client = redis::Client::build_with_tls(
        url,
        TlsCertificates {
            client_tls: Some(ClientTlsConfig {
                client_cert: credentials.client_cert,
                client_key: credentials.client_key,
            }),
            root_cert: Some(credentials.ca),
        },
    )?;
    Ok(ConnectionManager::new(client).await?)
}
