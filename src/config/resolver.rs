//! # Connection Resolver
//!
//! Derives one [`ConnectionConfig`] from the layered connection inputs.
//!
//! ## Resolution Order
//!
//! 1. Credential files: `config_path`, else `config_paths`, else the
//!    `KUBE_CONFIG_PATHS` list, else kube's default discovery (`KUBECONFIG`,
//!    `~/.kube/config`, in-cluster service account)
//! 2. Context selection: explicit context/cluster/user, else `current-context`
//! 3. Explicit fields, in order: insecure, TLS server name, CA, client
//!    certificate, host, username, password, client key, token, exec, proxy URL
//! 4. User agent
//!
//! A base configuration that cannot be built does not fail resolution: the
//! result is an empty configuration and the failure surfaces at first use.
//! A malformed host does fail resolution.

use crate::config::connection::ConnectionConfig;
use crate::config::kubeconfig::{load_base, CredentialFileError, CredentialSource};
use crate::config::provider::{ExecSettings, ProviderConfig};
use crate::config::ConfigError;
use crate::constants::{DEFAULT_EXEC_API_VERSION, KUBE_CONFIG_PATHS_ENV};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::header::HeaderValue;
use http::Uri;
use kube::config::{ExecConfig, KubeConfigOptions};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Ambient process state consulted by the resolver.
///
/// Captured once so resolution depends only on its inputs.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub kube_config_paths: Option<OsString>,
    pub home_dir: Option<PathBuf>,
    /// Fall back to kube's own discovery when no credential file is named
    pub default_discovery: bool,
}

impl Environment {
    /// Snapshot the current process environment
    #[must_use]
    pub fn capture() -> Self {
        Self {
            kube_config_paths: std::env::var_os(KUBE_CONFIG_PATHS_ENV).filter(|v| !v.is_empty()),
            home_dir: dirs::home_dir(),
            default_discovery: true,
        }
    }

    /// An environment with nothing set, for callers that want explicit inputs only
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Resolve the connection configuration.
///
/// # Errors
///
/// - [`ConfigError::InvalidUserAgent`] if `user_agent` is not a valid header value
/// - [`ConfigError::InvalidHost`] if the explicit host cannot be parsed
/// - [`ConfigError::HomeDirectory`] if a `~` path cannot be expanded
pub async fn resolve(
    config: &ProviderConfig,
    user_agent: &str,
    env: &Environment,
) -> Result<ConnectionConfig, ConfigError> {
    HeaderValue::from_str(user_agent)
        .map_err(|_| ConfigError::InvalidUserAgent(user_agent.to_string()))?;

    // The default scheme depends on TLS material supplied alongside the host,
    // not on whatever the credential file carries.
    let overlay_tls = config.insecure == Some(true)
        || non_empty(config.cluster_ca_certificate.as_ref()).is_some()
        || non_empty(config.client_certificate.as_ref()).is_some();
    let host = non_empty(config.host.as_ref())
        .map(|h| parse_host(h, overlay_tls))
        .transpose()?;

    let source = credential_source(config, env)?;
    let options = KubeConfigOptions {
        context: non_empty(config.config_context.as_ref()).map(str::to_string),
        cluster: non_empty(config.config_context_cluster.as_ref()).map(str::to_string),
        user: non_empty(config.config_context_auth_info.as_ref()).map(str::to_string),
    };
    if options.context.is_some() || options.cluster.is_some() || options.user.is_some() {
        debug!(
            context = ?options.context,
            cluster = ?options.cluster,
            user = ?options.user,
            "Using overridden context"
        );
    }

    let resolved = match build(&source, &options, config, host).await {
        Ok(Some(kube)) => ConnectionConfig::from_kube(kube, user_agent),
        Ok(None) => {
            debug!("No cluster connection found");
            ConnectionConfig::unconfigured(user_agent)
        }
        Err(e) => {
            warn!(
                source = %source,
                error = %e,
                "Invalid provider configuration was supplied, provider operations are likely to fail"
            );
            return Ok(ConnectionConfig::unconfigured(user_agent));
        }
    };

    info!(
        source = %source,
        host = resolved.host.as_deref().unwrap_or("<unresolved>"),
        auth = %resolved.auth_method(),
        "Resolved cluster connection"
    );
    Ok(resolved)
}

/// Turn `raw` into `scheme://authority`.
///
/// A value without a scheme gets `https://` when `default_tls` is set and
/// `http://` otherwise. A path other than `/` is rejected.
///
/// # Errors
///
/// [`ConfigError::InvalidHost`] if the value is not a URL or `host:port` pair.
pub fn normalize_host(raw: &str, default_tls: bool) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidHost {
        host: raw.to_string(),
        reason,
    };
    let trimmed = raw.trim();

    let uri = match trimmed
        .parse::<Uri>()
        .ok()
        .filter(|u| u.scheme().is_some() && u.authority().is_some())
    {
        Some(uri) => uri,
        None => {
            let scheme = if default_tls { "https" } else { "http" };
            format!("{scheme}://{trimmed}")
                .parse::<Uri>()
                .map_err(|e| invalid(e.to_string()))?
        }
    };

    let scheme = uri.scheme_str().unwrap_or_default();
    if scheme != "http" && scheme != "https" {
        return Err(invalid(format!("unsupported scheme {scheme:?}")));
    }
    let authority = uri
        .authority()
        .filter(|a| !a.host().is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?;
    if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
        return Err(invalid(
            "host must be a URL or a host:port pair".to_string(),
        ));
    }

    Ok(format!("{scheme}://{authority}"))
}

fn parse_host(raw: &str, default_tls: bool) -> Result<Uri, ConfigError> {
    normalize_host(raw, default_tls)?
        .parse::<Uri>()
        .map_err(|e| ConfigError::InvalidHost {
            host: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Base configuration plus overlay; `None` when there is neither a base nor a host
async fn build(
    source: &CredentialSource,
    options: &KubeConfigOptions,
    config: &ProviderConfig,
    host: Option<Uri>,
) -> Result<Option<kube::Config>, CredentialFileError> {
    let base = match (load_base(source, options).await?, host) {
        (Some(mut base), Some(host)) => {
            base.cluster_url = host;
            base
        }
        (Some(base), None) => base,
        (None, Some(host)) => kube::Config::new(host),
        (None, None) => return Ok(None),
    };
    apply_overrides(base, config).map(Some)
}

fn credential_source(
    config: &ProviderConfig,
    env: &Environment,
) -> Result<CredentialSource, ConfigError> {
    let explicit: Vec<String> = if let Some(path) = non_empty(config.config_path.as_ref()) {
        vec![path.to_string()]
    } else if !config.config_paths.is_empty() {
        config.config_paths.clone()
    } else if let Some(list) = &env.kube_config_paths {
        std::env::split_paths(list)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    } else {
        Vec::new()
    };

    if explicit.is_empty() {
        return Ok(if env.default_discovery {
            CredentialSource::Discover
        } else {
            CredentialSource::None
        });
    }

    let mut expanded = explicit
        .iter()
        .map(|p| expand_home(p, env))
        .collect::<Result<Vec<_>, _>>()?;
    for path in &expanded {
        debug!(path = %path.display(), "Using kubeconfig");
    }
    Ok(if expanded.len() == 1 {
        CredentialSource::Explicit(expanded.remove(0))
    } else {
        CredentialSource::Precedence(expanded)
    })
}

fn expand_home(path: &str, env: &Environment) -> Result<PathBuf, ConfigError> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with(std::path::MAIN_SEPARATOR)) {
        // `~user` forms are left alone
        return Ok(PathBuf::from(path));
    }
    let home = env
        .home_dir
        .as_ref()
        .ok_or_else(|| ConfigError::HomeDirectory(path.to_string()))?;
    let rest = rest.trim_start_matches(['/', std::path::MAIN_SEPARATOR]);
    Ok(if rest.is_empty() {
        home.clone()
    } else {
        home.join(rest)
    })
}

/// Overlay the explicit fields onto the selected cluster and user.
///
/// The host was applied by the caller; everything else follows the fixed order.
fn apply_overrides(
    mut base: kube::Config,
    config: &ProviderConfig,
) -> Result<kube::Config, CredentialFileError> {
    if let Some(insecure) = config.insecure {
        base.accept_invalid_certs = insecure;
    }
    if let Some(name) = non_empty(config.tls_server_name.as_ref()) {
        base.tls_server_name = Some(name.to_string());
    }
    match non_empty(config.cluster_ca_certificate.as_ref()) {
        Some(ca) => base.root_cert = Some(parse_certificates(ca)?),
        // Skipping verification without a replacement CA drops the file's CA
        None if config.insecure == Some(true) => base.root_cert = None,
        None => {}
    }

    let auth = &mut base.auth_info;
    if let Some(cert) = non_empty(config.client_certificate.as_ref()) {
        auth.client_certificate_data = Some(BASE64.encode(cert));
        auth.client_certificate = None;
    }
    if let Some(username) = non_empty(config.username.as_ref()) {
        auth.username = Some(username.to_string());
    }
    if let Some(password) = non_empty(config.password.as_ref()) {
        auth.password = Some(password.into());
    }
    if let Some(key) = non_empty(config.client_key.as_ref()) {
        auth.client_key_data = Some(BASE64.encode(key).into());
        auth.client_key = None;
    }
    if let Some(token) = non_empty(config.token.as_ref()) {
        auth.token = Some(token.into());
        auth.token_file = None;
        auth.exec = None;
        auth.auth_provider = None;
    }
    if let Some(exec) = config.exec.as_ref().filter(|e| !e.command.is_empty()) {
        auth.exec = Some(exec_config(exec));
        auth.token = None;
        auth.token_file = None;
        auth.auth_provider = None;
    }

    if let Some(proxy) = non_empty(config.proxy_url.as_ref()) {
        let uri = proxy
            .parse::<Uri>()
            .map_err(|e| CredentialFileError::ProxyUrl {
                url: proxy.to_string(),
                reason: e.to_string(),
            })?;
        base.proxy_url = Some(uri);
    }
    Ok(base)
}

/// DER certificates of a PEM bundle
fn parse_certificates(pem: &str) -> Result<Vec<Vec<u8>>, CredentialFileError> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .map(|cert| cert.map(|der| der.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialFileError::CertificateAuthority(e.to_string()))?;
    if certs.is_empty() {
        return Err(CredentialFileError::CertificateAuthority(
            "no certificates found".to_string(),
        ));
    }
    Ok(certs)
}

fn exec_config(exec: &ExecSettings) -> ExecConfig {
    let env = exec
        .env
        .iter()
        .map(|(name, value)| {
            HashMap::from([
                ("name".to_string(), name.clone()),
                ("value".to_string(), value.clone()),
            ])
        })
        .collect();
    ExecConfig {
        api_version: Some(
            exec.api_version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_EXEC_API_VERSION.to_string()),
        ),
        command: Some(exec.command.clone()),
        args: Some(exec.args.clone()),
        env: Some(env),
        drop_env: None,
        interactive_mode: None,
        provide_cluster_info: false,
        cluster: None,
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMethod;
    use std::path::Path;

    const TEST_CA: &str = "-----BEGIN CERTIFICATE-----\nY2E=\n-----END CERTIFICATE-----\n";

    const FILE_HOST_CONFIG: &str = r"
apiVersion: v1
kind: Config
current-context: file
clusters:
  - name: file
    cluster:
      server: https://filehost:6443
      certificate-authority: ca.pem
users:
  - name: file-user
    user:
      token: file-token
contexts:
  - name: file
    context:
      cluster: file
      user: file-user
";

    /// Writes the kubeconfig and the CA it references by relative path
    fn write_kubeconfig(dir: &Path, name: &str) -> PathBuf {
        std::fs::write(dir.join("ca.pem"), TEST_CA).expect("write ca");
        let path = dir.join(name);
        std::fs::write(&path, FILE_HOST_CONFIG).expect("write kubeconfig");
        path
    }

    fn kube(resolved: &ConnectionConfig) -> &kube::Config {
        resolved.kube_config().expect("configured")
    }

    #[tokio::test]
    async fn test_explicit_host_overrides_credential_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");

        let config = ProviderConfig {
            host: Some("https://explicit:6443".to_string()),
            config_path: Some(path.display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "test-agent", &Environment::empty())
            .await
            .expect("resolve");

        assert_eq!(resolved.host.as_deref(), Some("https://explicit:6443"));
        assert_eq!(resolved.auth_method(), AuthMethod::Token);
        assert_eq!(resolved.user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_file_host_and_relative_ca_used_without_explicit_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");

        let config = ProviderConfig {
            config_path: Some(path.display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("resolve");
        assert_eq!(resolved.host.as_deref(), Some("https://filehost:6443"));
        assert_eq!(resolved.default_namespace.as_deref(), Some("default"));
        assert_eq!(kube(&resolved).root_cert.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_kube_config_paths_used_when_nothing_explicit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");
        let missing = dir.path().join("missing");

        let env = Environment {
            kube_config_paths: Some(
                std::env::join_paths([missing, path]).expect("join paths"),
            ),
            ..Environment::empty()
        };
        let resolved = resolve(&ProviderConfig::default(), "ua", &env)
            .await
            .expect("resolve");
        assert_eq!(resolved.host.as_deref(), Some("https://filehost:6443"));
    }

    #[tokio::test]
    async fn test_config_path_wins_over_environment_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");
        let env = Environment {
            kube_config_paths: Some(OsString::from(dir.path().join("does-not-exist"))),
            ..Environment::empty()
        };
        let config = ProviderConfig {
            config_path: Some(path.display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &env).await.expect("resolve");
        assert!(resolved.is_configured());
    }

    #[tokio::test]
    async fn test_missing_explicit_file_degrades_to_empty_configuration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ProviderConfig {
            host: Some("https://explicit:6443".to_string()),
            token: Some("t0ken".to_string()),
            config_path: Some(dir.path().join("absent").display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("degrades");
        assert!(!resolved.is_configured());
        assert!(resolved.host.is_none());
        assert_eq!(resolved.auth_method(), AuthMethod::Anonymous);
        assert_eq!(resolved.user_agent, "ua");
    }

    #[tokio::test]
    async fn test_unknown_context_degrades_to_empty_configuration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");
        let config = ProviderConfig {
            config_path: Some(path.display().to_string()),
            config_context: Some("nope".to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("degrades");
        assert!(!resolved.is_configured());
    }

    #[tokio::test]
    async fn test_unreadable_file_ca_degrades_to_empty_configuration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config");
        std::fs::write(
            &path,
            FILE_HOST_CONFIG.replace("ca.pem", "/nonexistent/ca.pem"),
        )
        .expect("write kubeconfig");

        let config = ProviderConfig {
            config_path: Some(path.display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("degrades");
        assert!(!resolved.is_configured());
    }

    #[tokio::test]
    async fn test_malformed_host_is_fatal() {
        let config = ProviderConfig {
            host: Some("https://cluster.example:6443/some/path".to_string()),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            resolve(&config, "ua", &Environment::empty()).await,
            Err(ConfigError::InvalidHost { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_user_agent_is_fatal() {
        assert!(matches!(
            resolve(&ProviderConfig::default(), "bad\nagent", &Environment::empty()).await,
            Err(ConfigError::InvalidUserAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_tilde_expansion_requires_home() {
        let config = ProviderConfig {
            config_path: Some("~/.kube/config".to_string()),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            resolve(&config, "ua", &Environment::empty()).await,
            Err(ConfigError::HomeDirectory(_))
        ));

        let env = Environment {
            home_dir: Some(PathBuf::from("/home/ops")),
            ..Environment::empty()
        };
        assert_eq!(
            expand_home("~/.kube/config", &env).expect("expand"),
            PathBuf::from("/home/ops/.kube/config")
        );
    }

    #[test]
    fn test_normalize_host_default_scheme() {
        assert_eq!(
            normalize_host("cluster.example:6443", true).expect("host"),
            "https://cluster.example:6443"
        );
        assert_eq!(
            normalize_host("cluster.example:8080", false).expect("host"),
            "http://cluster.example:8080"
        );
        assert_eq!(
            normalize_host("https://cluster.example/", false).expect("host"),
            "https://cluster.example"
        );
    }

    #[tokio::test]
    async fn test_insecure_overlay_selects_https_and_drops_file_ca() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");
        let config = ProviderConfig {
            host: Some("10.0.0.1:6443".to_string()),
            insecure: Some(true),
            config_path: Some(path.display().to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("resolve");
        assert_eq!(resolved.host.as_deref(), Some("https://10.0.0.1:6443"));
        assert!(kube(&resolved).accept_invalid_certs);
        assert!(kube(&resolved).root_cert.is_none());
    }

    #[tokio::test]
    async fn test_static_overlay_without_files() {
        let config = ProviderConfig {
            host: Some("explicit:6443".to_string()),
            token: Some("t0ken".to_string()),
            cluster_ca_certificate: Some(TEST_CA.to_string()),
            tls_server_name: Some("kubernetes.default".to_string()),
            proxy_url: Some("http://proxy:3128".to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("resolve");
        assert_eq!(resolved.host.as_deref(), Some("https://explicit:6443"));
        assert_eq!(resolved.auth_method(), AuthMethod::Token);

        let kube = kube(&resolved);
        assert_eq!(kube.tls_server_name.as_deref(), Some("kubernetes.default"));
        let proxy = kube.proxy_url.as_ref().expect("proxy");
        assert_eq!(proxy.host(), Some("proxy"));
        assert_eq!(proxy.port_u16(), Some(3128));
        assert_eq!(kube.root_cert, Some(vec![b"ca".to_vec()]));
    }

    #[tokio::test]
    async fn test_unparsable_ca_overlay_degrades() {
        let config = ProviderConfig {
            host: Some("https://explicit:6443".to_string()),
            cluster_ca_certificate: Some("not a certificate".to_string()),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("degrades");
        assert!(!resolved.is_configured());
    }

    #[tokio::test]
    async fn test_exec_overlay_replaces_file_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_kubeconfig(dir.path(), "config");
        let config = ProviderConfig {
            config_path: Some(path.display().to_string()),
            exec: Some(ExecSettings {
                command: "aws".to_string(),
                args: vec!["eks".to_string(), "get-token".to_string()],
                env: [("AWS_PROFILE".to_string(), "prod".to_string())].into(),
                ..ExecSettings::default()
            }),
            ..ProviderConfig::default()
        };
        let resolved = resolve(&config, "ua", &Environment::empty())
            .await
            .expect("resolve");
        assert_eq!(resolved.auth_method(), AuthMethod::Exec);

        let auth = &kube(&resolved).auth_info;
        assert!(auth.token.is_none());
        let exec = auth.exec.as_ref().expect("exec");
        assert_eq!(exec.api_version.as_deref(), Some(DEFAULT_EXEC_API_VERSION));
        assert_eq!(exec.command.as_deref(), Some("aws"));
        let env = exec.env.as_ref().expect("env");
        assert_eq!(env[0].get("name").map(String::as_str), Some("AWS_PROFILE"));
        assert_eq!(env[0].get("value").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_nothing_found_is_not_an_error() {
        let resolved = resolve(&ProviderConfig::default(), "ua", &Environment::empty())
            .await
            .expect("resolve");
        assert!(!resolved.is_configured());
        assert_eq!(resolved.user_agent, "ua");
    }

    #[test]
    fn test_only_captured_environment_discovers() {
        assert!(Environment::capture().default_discovery);
        assert!(!Environment::empty().default_discovery);
    }
}
