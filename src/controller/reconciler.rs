//! # Upsert Reconciler
//!
//! Converges one managed object to its desired state.
//!
//! ## Upsert
//!
//! 1. Encode the desired document (no version token)
//! 2. `get` the current object
//! 3. Not found: `create`. Any other `get` failure is returned as is; the
//!    object may exist and merely be invisible to us.
//! 4. Found: copy its version token onto the desired document and `update`.
//!    A stale token comes back as `Conflict`; there is no internal retry.
//! 5. Decode the stored object into the observed state
//!
//! Get-then-write is not atomic. Concurrent upserts of the same identity can
//! both see "not found" (one create fails with `AlreadyExists`) or both read
//! the same token (one update fails with `Conflict`). Callers serialize per
//! identity or treat both as retryable.

use crate::codec::{decode, encode, CodecError, ManagedObject, ObjectKey, ResourceKind};
use crate::controller::cancel::{Cancellation, Cancelled};
use crate::observability::metrics;
use crate::store::{ObjectStore, Operation, StoreError};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("{kind} {key} was returned without a resource version; refusing to update")]
    MissingResourceVersion { kind: &'static str, key: ObjectKey },
}

impl ReconcileError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }

    /// `AlreadyExists` and `Conflict`: lost a race, safe to re-invoke
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Result of a successful upsert
#[derive(Debug, Clone)]
pub struct Applied<S> {
    pub outcome: UpsertOutcome,
    /// Observed state decoded from the store's response
    pub observed: S,
    pub resource_version: Option<String>,
}

/// Shared, stateless reconciler; clone freely across concurrent invocations
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .finish()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create or version-safely update the object described by `spec`
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn upsert<K: ResourceKind>(
        &self,
        spec: &K::Spec,
        cancel: &Cancellation,
    ) -> Result<Applied<K::Spec>, ReconcileError> {
        let mut desired = encode::<K>(spec)?;
        let key = desired.key();
        let kind = K::DESCRIPTOR.kind;
        let span = info_span!(
            "upsert",
            kind,
            namespace = %key.namespace,
            name = %key.name
        );

        async move {
            let existing = match self
                .call(kind, Operation::Get, cancel, self.store.get(&K::DESCRIPTOR, &key))
                .await
            {
                Ok(existing) => Some(existing),
                Err(e) if e.is_not_found() => {
                    debug!("Object does not exist yet");
                    None
                }
                Err(e) => return Err(e),
            };

            let (outcome, stored) = match existing {
                None => {
                    log_document("Creating object", &desired);
                    let created = self
                        .call(
                            kind,
                            Operation::Create,
                            cancel,
                            self.store.create(&K::DESCRIPTOR, &desired),
                        )
                        .await?;
                    (UpsertOutcome::Created, created)
                }
                Some(existing) => {
                    let version = existing
                        .resource_version()
                        .ok_or_else(|| ReconcileError::MissingResourceVersion {
                            kind,
                            key: key.clone(),
                        })?;
                    desired.metadata.resource_version = Some(version.to_string());
                    log_document("Updating object", &desired);
                    let updated = self
                        .call(
                            kind,
                            Operation::Update,
                            cancel,
                            self.store.update(&K::DESCRIPTOR, &desired),
                        )
                        .await?;
                    (UpsertOutcome::Updated, updated)
                }
            };

            let observed = decode::<K>(&stored)?;
            info!(
                outcome = outcome.as_str(),
                resource_version = stored.resource_version().unwrap_or_default(),
                "Upsert complete"
            );
            Ok(Applied {
                outcome,
                observed,
                resource_version: stored.resource_version().map(str::to_string),
            })
        }
        .instrument(span)
        .await
    }

    /// Get and decode. A missing object is reported as not-found, not defaulted.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn read<K: ResourceKind>(
        &self,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<K::Spec, ReconcileError> {
        let kind = K::DESCRIPTOR.kind;
        let span = info_span!("read", kind, namespace = %key.namespace, name = %key.name);

        async move {
            let object = self
                .call(kind, Operation::Get, cancel, self.store.get(&K::DESCRIPTOR, key))
                .await?;
            Ok(decode::<K>(&object)?)
        }
        .instrument(span)
        .await
    }

    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub async fn delete<K: ResourceKind>(
        &self,
        key: &ObjectKey,
        cancel: &Cancellation,
    ) -> Result<(), ReconcileError> {
        let kind = K::DESCRIPTOR.kind;
        let span = info_span!("delete", kind, namespace = %key.namespace, name = %key.name);

        async move {
            self.call(
                kind,
                Operation::Delete,
                cancel,
                self.store.delete(&K::DESCRIPTOR, key),
            )
            .await?;
            info!("Delete complete");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Run one store call under `cancel` and record it
    async fn call<T>(
        &self,
        kind: &'static str,
        operation: Operation,
        cancel: &Cancellation,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ReconcileError> {
        let start = Instant::now();
        let result = cancel.run(call).await;
        let elapsed = start.elapsed().as_secs_f64();

        metrics::record_operation(kind, operation.as_str(), elapsed);
        match &result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if operation == Operation::Get && e.is_not_found() => {}
            Ok(Err(e)) => {
                metrics::increment_operation_errors(kind, operation.as_str());
                debug!(operation = operation.as_str(), error = %e, "Store call failed");
            }
            Err(cancelled) => {
                metrics::increment_operation_errors(kind, operation.as_str());
                debug!(operation = operation.as_str(), error = %cancelled, "Store call aborted");
            }
        }

        Ok(result??)
    }
}

fn log_document(message: &str, document: &ManagedObject) {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let rendered = serde_json::to_string_pretty(document).unwrap_or_default();
        debug!(document = %rendered, "{message}");
    }
}
