//! # Runtime Initialization
//!
//! Builds a [`ProviderRuntime`] from the connection inputs.

use crate::config::{resolve, ConnectionConfig, Environment, ProviderConfig, RuntimeSettings};
use crate::observability::metrics;
use crate::runtime::{ProviderRuntime, RuntimeError};
use crate::store::KubeObjectStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Initialize the provider runtime
///
/// This function handles:
/// - rustls crypto provider installation
/// - Prometheus metrics registration
/// - Ignore-list compilation
/// - Connection resolution against `env`
/// - Kubernetes client creation
///
/// No request reaches the cluster here. An unconfigured connection is
/// accepted and fails at the first operation; so is a resolved connection
/// whose client cannot be built, which is replaced by the unconfigured one.
///
/// # Errors
///
/// Any fatal [`crate::config::ConfigError`]: a bad host, user agent or ignore
/// pattern, or an unexpandable home directory.
pub async fn initialize(
    config: &ProviderConfig,
    settings: RuntimeSettings,
    env: &Environment,
) -> Result<ProviderRuntime, RuntimeError> {
    // We use ring as the crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed by the host process");
    }

    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register metrics: {e:#}");
    }

    let filters = config.metadata_filters()?;
    let mut connection = resolve(config, &settings.user_agent, env).await?;

    // Client identity and root certificates are parsed here
    let store = match KubeObjectStore::connect(&connection) {
        Ok(store) => store,
        Err(e) if connection.is_configured() => {
            warn!(
                error = %e,
                "Invalid provider configuration was supplied, provider operations are likely to fail"
            );
            connection = ConnectionConfig::unconfigured(&settings.user_agent);
            KubeObjectStore::connect(&connection)?
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        configured = connection.is_configured(),
        namespace = connection.default_namespace.as_deref().unwrap_or_default(),
        "Provider runtime initialized"
    );

    Ok(ProviderRuntime::with_store(connection, Arc::new(store), settings).with_filters(filters))
}
