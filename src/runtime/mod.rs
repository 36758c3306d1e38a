//! # Runtime
//!
//! Entry point for whatever drives the provider (the `valsctl` binary, an
//! embedding plugin host, tests). Built once per process, then shared.
//!
//! The runtime accepts two kinds of requests:
//! - desired-state bytes (YAML or JSON) for [`ProviderRuntime::apply`]
//! - an identity for [`ProviderRuntime::read`], [`ProviderRuntime::delete`],
//!   [`ProviderRuntime::lookup_vals_secret`] and [`ProviderRuntime::lookup_secret`]
//!
//! It makes no assumption about how it is invoked beyond that.

mod initialization;

pub use initialization::initialize;

use crate::codec::{ObjectKey, ResourceKind};
use crate::config::{ConfigError, ConnectionConfig, MetadataFilters, RuntimeSettings};
use crate::controller::{Cancellation, ReconcileError, Reconciler, UpsertOutcome};
use crate::crd::{
    DbSecret, DbSecretSpec, SecretLookup, SecretSummary, ValsSecret, ValsSecretLookup,
    ValsSecretSpec,
};
use crate::store::ObjectStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// The resource kinds the provider manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    ValsSecret,
    DbSecret,
}

impl ResourceType {
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            Self::ValsSecret => ValsSecret::DESCRIPTOR.kind,
            Self::DbSecret => DbSecret::DESCRIPTOR.kind,
        }
    }

    /// JSON Schema of the desired-state model
    #[must_use]
    pub fn json_schema(self) -> serde_json::Value {
        let schema = match self {
            Self::ValsSecret => schemars::schema_for!(ValsSecretSpec),
            Self::DbSecret => schemars::schema_for!(DbSecretSpec),
        };
        schema.to_value()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid {kind} desired state: {source}")]
    InvalidInput {
        kind: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl RuntimeError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Reconcile(e) if e.is_not_found())
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Reconcile(e) if e.is_retryable())
    }
}

/// Observed state of either kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ObservedState {
    ValsSecret(ValsSecretSpec),
    DbSecret(DbSecretSpec),
}

impl From<ValsSecretSpec> for ObservedState {
    fn from(spec: ValsSecretSpec) -> Self {
        Self::ValsSecret(spec)
    }
}

impl From<DbSecretSpec> for ObservedState {
    fn from(spec: DbSecretSpec) -> Self {
        Self::DbSecret(spec)
    }
}

/// What an apply did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub outcome: UpsertOutcome,
    /// Prior identity deleted because the desired identity differs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    pub observed: ObservedState,
}

/// Shared provider state: resolved connection, store-backed reconciler and
/// process settings
#[derive(Clone)]
pub struct ProviderRuntime {
    connection: ConnectionConfig,
    reconciler: Reconciler,
    filters: MetadataFilters,
    settings: RuntimeSettings,
}

impl fmt::Debug for ProviderRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRuntime")
            .field("host", &self.connection.host)
            .field("reconciler", &self.reconciler)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProviderRuntime {
    /// Assemble a runtime around an existing store
    #[must_use]
    pub fn with_store(
        connection: ConnectionConfig,
        store: Arc<dyn ObjectStore>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            connection,
            reconciler: Reconciler::new(store),
            filters: MetadataFilters::default(),
            settings,
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Ignore lists from the provider configuration; collected, not applied
    #[must_use]
    pub fn metadata_filters(&self) -> &MetadataFilters {
        &self.filters
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// A fresh cancellation carrying the configured per-invocation deadline
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.settings
            .operation_timeout()
            .map_or_else(Cancellation::new, Cancellation::with_timeout)
    }

    /// Converge one object to the desired state in `desired` (YAML or JSON).
    ///
    /// When `prior` names a different identity, that object is deleted first
    /// (a missing prior object is fine) and the desired one is upserted. An
    /// object is never updated in place across identities.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn apply(
        &self,
        resource: ResourceType,
        desired: &[u8],
        prior: Option<&ObjectKey>,
        cancel: &Cancellation,
    ) -> Result<ApplyReport, RuntimeError> {
        match resource {
            ResourceType::ValsSecret => {
                let spec = parse::<ValsSecret>(desired)?;
                self.apply_spec::<ValsSecret>(&spec, prior, cancel).await
            }
            ResourceType::DbSecret => {
                let spec = parse::<DbSecret>(desired)?;
                self.apply_spec::<DbSecret>(&spec, prior, cancel).await
            }
        }
    }

    /// Typed form of [`Self::apply`]
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn apply_spec<K>(
        &self,
        spec: &K::Spec,
        prior: Option<&ObjectKey>,
        cancel: &Cancellation,
    ) -> Result<ApplyReport, RuntimeError>
    where
        K: ResourceKind,
        K::Spec: Into<ObservedState>,
    {
        let desired = K::identity(spec);
        let replaced = match prior {
            Some(prior) if *prior != desired => {
                info!(
                    kind = K::DESCRIPTOR.kind,
                    from = %prior,
                    to = %desired,
                    "Identity changed, replacing object"
                );
                match self.reconciler.delete::<K>(prior, cancel).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(key = %prior, "Prior object already gone");
                    }
                    Err(e) => return Err(e.into()),
                }
                Some(prior.to_string())
            }
            _ => None,
        };

        let applied = self.reconciler.upsert::<K>(spec, cancel).await?;
        Ok(ApplyReport {
            outcome: applied.outcome,
            replaced,
            resource_version: applied.resource_version,
            observed: applied.observed.into(),
        })
    }

    /// Observed state of one object; a missing object is a not-found error
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn read(
        &self,
        resource: ResourceType,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<ObservedState, RuntimeError> {
        let observed = match resource {
            ResourceType::ValsSecret => self.reconciler.read::<ValsSecret>(key, cancel).await?.into(),
            ResourceType::DbSecret => self.reconciler.read::<DbSecret>(key, cancel).await?.into(),
        };
        Ok(observed)
    }

    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn delete(
        &self,
        resource: ResourceType,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<(), RuntimeError> {
        match resource {
            ResourceType::ValsSecret => self.reconciler.delete::<ValsSecret>(key, cancel).await?,
            ResourceType::DbSecret => self.reconciler.delete::<DbSecret>(key, cancel).await?,
        }
        Ok(())
    }

    /// Read-only projection of a `ValsSecret`; never writes
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn lookup_vals_secret(
        &self,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<SecretSummary, RuntimeError> {
        Ok(self.reconciler.read::<ValsSecretLookup>(key, cancel).await?)
    }

    /// Name, namespace and type of a core `Secret`, such as one a `ValsSecret` renders
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn lookup_secret(
        &self,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<SecretSummary, RuntimeError> {
        Ok(self.reconciler.read::<SecretLookup>(key, cancel).await?)
    }
}

fn parse<K>(desired: &[u8]) -> Result<K::Spec, RuntimeError>
where
    K: ResourceKind,
    K::Spec: DeserializeOwned,
{
    serde_yaml::from_slice(desired).map_err(|source| RuntimeError::InvalidInput {
        kind: K::DESCRIPTOR.kind,
        source,
    })
}
