//! # Credential Files
//!
//! Loading of the base client configuration through kube's own kubeconfig
//! support: `Kubeconfig::read_from` for each file, `Kubeconfig::merge` across
//! files, and `Config::from_custom_kubeconfig` for context selection and
//! certificate loading.
//!
//! Every failure here is a [`CredentialFileError`], which the resolver turns
//! into the degraded configuration instead of an error.

use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Why a base configuration could not be built
#[derive(Debug, Error)]
pub enum CredentialFileError {
    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error("invalid certificate authority: {0}")]
    CertificateAuthority(String),

    #[error("invalid proxy URL {url:?}: {reason}")]
    ProxyUrl { url: String, reason: String },
}

/// Which credential files to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// One file that must exist
    Explicit(PathBuf),
    /// Files in precedence order; missing entries are skipped
    Precedence(Vec<PathBuf>),
    /// kube's discovery: `KUBECONFIG`, `~/.kube/config`, then the in-cluster service account
    Discover,
    None,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(path) => write!(f, "{}", path.display()),
            Self::Precedence(paths) => {
                let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::Discover => f.write_str("default discovery"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Build the base client configuration for `source`.
///
/// `Ok(None)` means nothing was found, which is not an error.
pub async fn load_base(
    source: &CredentialSource,
    options: &KubeConfigOptions,
) -> Result<Option<kube::Config>, CredentialFileError> {
    let kubeconfig = match source {
        CredentialSource::Explicit(path) => Kubeconfig::read_from(path)?,
        CredentialSource::Precedence(paths) => merge_existing(paths)?,
        CredentialSource::Discover => return discover(options).await,
        CredentialSource::None => return Ok(None),
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, options).await?;
    Ok(Some(config))
}

/// First definition of a named entry wins, as does the first `current-context`
fn merge_existing(paths: &[PathBuf]) -> Result<Kubeconfig, KubeconfigError> {
    paths.iter().try_fold(Kubeconfig::default(), |merged, path| {
        if !path.is_file() {
            debug!(path = %path.display(), "Skipping missing kubeconfig");
            return Ok(merged);
        }
        merged.merge(Kubeconfig::read_from(path)?)
    })
}

async fn discover(options: &KubeConfigOptions) -> Result<Option<kube::Config>, CredentialFileError> {
    match kube::Config::from_kubeconfig(options).await {
        Ok(config) => return Ok(Some(config)),
        Err(KubeconfigError::FindPath) => {}
        Err(KubeconfigError::ReadConfig(e, path)) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No kubeconfig at the default location");
        }
        Err(e) => return Err(e.into()),
    }

    match kube::Config::incluster() {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            debug!(error = %e, "Not running inside a cluster");
            Ok(None)
        }
    }
}
