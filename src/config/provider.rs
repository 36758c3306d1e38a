//! # Provider Configuration
//!
//! The connection inputs accepted by the resolver.
//!
//! Keys match the provider attributes of the declarative tool so that an
//! existing provider block can be written out as YAML and used unchanged.

use crate::config::settings::{env_var_opt, parse_bool};
use crate::config::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// External credential command
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecSettings {
    pub api_version: Option<String>,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub args: Vec<String>,
}

/// Connection inputs, all optional
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Address of the API server, `scheme://host:port` or `host:port`
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Skip TLS verification of the API server
    pub insecure: Option<bool>,
    pub tls_server_name: Option<String>,
    /// PEM-encoded client certificate
    pub client_certificate: Option<String>,
    /// PEM-encoded client key
    pub client_key: Option<String>,
    /// PEM-encoded root certificates bundle
    pub cluster_ca_certificate: Option<String>,
    /// Single credential file; wins over `config_paths`
    pub config_path: Option<String>,
    /// Credential files in search order
    pub config_paths: Vec<String>,
    pub config_context: Option<String>,
    pub config_context_auth_info: Option<String>,
    pub config_context_cluster: Option<String>,
    pub token: Option<String>,
    pub proxy_url: Option<String>,
    /// Regular expressions of annotation keys managed by external systems
    pub ignore_annotations: Vec<String>,
    /// Regular expressions of label keys managed by external systems
    pub ignore_labels: Vec<String>,
    pub exec: Option<ExecSettings>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("insecure", &self.insecure)
            .field("tls_server_name", &self.tls_server_name)
            .field("client_certificate", &self.client_certificate.is_some())
            .field("client_key", &redact(&self.client_key))
            .field("cluster_ca_certificate", &self.cluster_ca_certificate.is_some())
            .field("config_path", &self.config_path)
            .field("config_paths", &self.config_paths)
            .field("config_context", &self.config_context)
            .field("config_context_auth_info", &self.config_context_auth_info)
            .field("config_context_cluster", &self.config_context_cluster)
            .field("token", &redact(&self.token))
            .field("proxy_url", &self.proxy_url)
            .field("ignore_annotations", &self.ignore_annotations)
            .field("ignore_labels", &self.ignore_labels)
            .field("exec", &self.exec)
            .finish()
    }
}

impl ProviderConfig {
    /// Load from a YAML or JSON file
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProviderFile {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ProviderFile {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Fill unset fields from the `KUBE_*` environment variables.
    ///
    /// `KUBE_CONFIG_PATHS` is not read here: the resolver consults it only when
    /// no credential file was configured at all.
    #[must_use]
    pub fn with_env_defaults(self) -> Self {
        self.with_defaults_from(env_var_opt)
    }

    /// Fill unset fields from `lookup`, keyed by the `KUBE_*` variable names.
    ///
    /// `KUBE_CONFIG_PATH` is skipped when `config_paths` is set, since a single
    /// path always wins over the list.
    #[must_use]
    pub fn with_defaults_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fill = |field: &mut Option<String>, key: &str| {
            if field.as_deref().is_none_or(str::is_empty) {
                if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                    *field = Some(value);
                }
            }
        };
        fill(&mut self.host, "KUBE_HOST");
        fill(&mut self.username, "KUBE_USER");
        fill(&mut self.password, "KUBE_PASSWORD");
        if self.insecure.is_none() {
            self.insecure = lookup("KUBE_INSECURE").map(|v| parse_bool(&v));
        }
        fill(&mut self.tls_server_name, "KUBE_TLS_SERVER_NAME");
        fill(&mut self.client_certificate, "KUBE_CLIENT_CERT_DATA");
        fill(&mut self.client_key, "KUBE_CLIENT_KEY_DATA");
        fill(&mut self.cluster_ca_certificate, "KUBE_CLUSTER_CA_CERT_DATA");
        if self.config_paths.is_empty() {
            fill(&mut self.config_path, "KUBE_CONFIG_PATH");
        }
        fill(&mut self.config_context, "KUBE_CTX");
        fill(&mut self.config_context_auth_info, "KUBE_CTX_AUTH_INFO");
        fill(&mut self.config_context_cluster, "KUBE_CTX_CLUSTER");
        fill(&mut self.token, "KUBE_TOKEN");
        fill(&mut self.proxy_url, "KUBE_PROXY_URL");
        self
    }

    /// Compile the annotation and label ignore lists
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn metadata_filters(&self) -> Result<MetadataFilters, ConfigError> {
        Ok(MetadataFilters {
            annotations: compile_patterns(&self.ignore_annotations)?,
            labels: compile_patterns(&self.ignore_labels)?,
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidIgnorePattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Annotation and label keys owned by external systems
#[derive(Debug, Clone, Default)]
pub struct MetadataFilters {
    annotations: Vec<Regex>,
    labels: Vec<Regex>,
}

impl MetadataFilters {
    #[must_use]
    pub fn ignores_annotation(&self, key: &str) -> bool {
        self.annotations.iter().any(|re| re.is_match(key))
    }

    #[must_use]
    pub fn ignores_label(&self, key: &str) -> bool {
        self.labels.iter().any(|re| re.is_match(key))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.labels.is_empty()
    }
}
