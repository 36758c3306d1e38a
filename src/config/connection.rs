//! # Connection Configuration
//!
//! The resolved connection used to authenticate every store call.
//!
//! A [`ConnectionConfig`] is produced once by the resolver and never mutated
//! afterwards. It wraps the `kube::Config` built from the credential files
//! and the explicit overlay; credentials stay inside kube's `SecretString`
//! fields and never reach `Debug` output.

use crate::config::ConfigError;
use crate::constants::UNCONFIGURED_HOST;
use http::header::{HeaderValue, USER_AGENT};
use http::Uri;
use std::fmt;

/// How requests will be authenticated, in the order the kube client prefers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Exec,
    AuthProvider,
    Token,
    TokenFile,
    Basic,
    ClientCertificate,
    Anonymous,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exec => "exec",
            Self::AuthProvider => "auth-provider",
            Self::Token => "token",
            Self::TokenFile => "token-file",
            Self::Basic => "basic",
            Self::ClientCertificate => "client-certificate",
            Self::Anonymous => "anonymous",
        };
        f.write_str(s)
    }
}

/// Fully resolved connection parameters
#[derive(Clone)]
pub struct ConnectionConfig {
    /// `scheme://authority` of the API server; `None` when nothing could be resolved
    pub host: Option<String>,
    pub default_namespace: Option<String>,
    pub user_agent: String,
    kube: Option<kube::Config>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("default_namespace", &self.default_namespace)
            .field("auth", &self.auth_method())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// The degraded configuration: nothing but the user agent
    #[must_use]
    pub fn unconfigured(user_agent: &str) -> Self {
        Self {
            host: None,
            default_namespace: None,
            user_agent: user_agent.to_string(),
            kube: None,
        }
    }

    /// Wrap a resolved client configuration
    #[must_use]
    pub fn from_kube(config: kube::Config, user_agent: &str) -> Self {
        Self {
            host: Some(origin(&config.cluster_url)),
            default_namespace: Some(config.default_namespace.clone()),
            user_agent: user_agent.to_string(),
            kube: Some(config),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.kube.is_some()
    }

    /// The resolved client configuration, `None` when degraded
    #[must_use]
    pub fn kube_config(&self) -> Option<&kube::Config> {
        self.kube.as_ref()
    }

    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        let Some(config) = &self.kube else {
            return AuthMethod::Anonymous;
        };
        let auth = &config.auth_info;
        if auth.exec.is_some() {
            AuthMethod::Exec
        } else if auth.auth_provider.is_some() {
            AuthMethod::AuthProvider
        } else if auth.token.is_some() {
            AuthMethod::Token
        } else if auth.token_file.is_some() {
            AuthMethod::TokenFile
        } else if auth.username.is_some() {
            AuthMethod::Basic
        } else if auth.client_certificate.is_some() || auth.client_certificate_data.is_some() {
            AuthMethod::ClientCertificate
        } else {
            AuthMethod::Anonymous
        }
    }

    /// Build the kube client configuration.
    ///
    /// A degraded connection targets `http://localhost` and fails at first use.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn to_kube_config(&self) -> Result<kube::Config, ConfigError> {
        let mut config = self
            .kube
            .clone()
            .unwrap_or_else(|| kube::Config::new(Uri::from_static(UNCONFIGURED_HOST)));

        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| ConfigError::InvalidUserAgent(self.user_agent.clone()))?;
        config.headers.push((USER_AGENT, user_agent));

        Ok(config)
    }
}

/// `scheme://authority` without the `/` path `Uri` adds
fn origin(uri: &Uri) -> String {
    match (uri.scheme_str(), uri.authority()) {
        (Some(scheme), Some(authority)) => format!("{scheme}://{authority}"),
        _ => uri.to_string(),
    }
}
