//! # Configuration
//!
//! - `provider`: connection inputs (`ProviderConfig`)
//! - `kubeconfig`: base configuration from credential files or in-cluster discovery
//! - `resolver`: layering of the inputs into one `ConnectionConfig`
//! - `connection`: the resolved configuration and its kube client form
//! - `settings`: process-level settings from the environment

pub mod connection;
pub mod kubeconfig;
pub mod provider;
pub mod resolver;
pub mod settings;

pub use connection::{AuthMethod, ConnectionConfig};
pub use kubeconfig::{CredentialFileError, CredentialSource};
pub use provider::{ExecSettings, MetadataFilters, ProviderConfig};
pub use resolver::{normalize_host, resolve, Environment};
pub use settings::RuntimeSettings;

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration errors.
///
/// Credential-file problems are not among them: those degrade to an empty
/// configuration (see [`resolve`]).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("unable to determine the home directory to expand {0:?}")]
    HomeDirectory(String),

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("user agent {0:?} is not a valid header value")]
    InvalidUserAgent(String),

    #[error("failed to load provider configuration from {path}: {source}")]
    ProviderFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to build Kubernetes client: {0}")]
    Client(#[source] anyhow::Error),
}
