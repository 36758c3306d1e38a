//! # Kubernetes Object Store
//!
//! [`ObjectStore`] over `kube::Api<DynamicObject>`.
//!
//! Documents are converted to and from `DynamicObject` through JSON; metadata
//! the server adds (`uid`, managed fields) is dropped on the way back.

use crate::codec::{ManagedObject, ObjectKey, ResourceDescriptor};
use crate::config::{ConfigError, ConnectionConfig};
use crate::store::{ObjectStore, Operation, StoreError};
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, PostParams};
use kube::Client;
use tracing::debug;

/// Object store backed by the Kubernetes API server.
///
/// Cheap to clone; the underlying client is shared.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the client from a resolved connection.
    ///
    /// No request is made; an unreachable or unconfigured cluster fails at
    /// the first operation.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn connect(connection: &ConnectionConfig) -> Result<Self, ConfigError> {
        let config = connection.to_kube_config()?;
        let client = Client::try_from(config).map_err(|e| ConfigError::Client(e.into()))?;
        Ok(Self::new(client))
    }

    fn api(&self, descriptor: &ResourceDescriptor, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: descriptor.group.to_string(),
            version: descriptor.version.to_string(),
            api_version: descriptor.api_version(),
            kind: descriptor.kind.to_string(),
            plural: descriptor.plural.to_string(),
        };
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

fn to_dynamic(
    descriptor: &ResourceDescriptor,
    object: &ManagedObject,
) -> Result<DynamicObject, StoreError> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|source| StoreError::Malformed {
            kind: descriptor.kind,
            key: object.key(),
            source,
        })
}

fn from_dynamic(
    descriptor: &ResourceDescriptor,
    key: &ObjectKey,
    object: &DynamicObject,
) -> Result<ManagedObject, StoreError> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|source| StoreError::Malformed {
            kind: descriptor.kind,
            key: key.clone(),
            source,
        })
}

/// 404 is always NotFound; 409 means AlreadyExists on create and a stale
/// version token on update.
fn classify(
    error: kube::Error,
    operation: Operation,
    descriptor: &ResourceDescriptor,
    key: &ObjectKey,
) -> StoreError {
    let kind = descriptor.kind;
    let key = key.clone();
    let code = match &error {
        kube::Error::Api(status) => Some(status.code),
        _ => None,
    };
    match (code, operation) {
        (Some(404), _) => StoreError::NotFound { kind, key },
        (Some(409), Operation::Create) => StoreError::AlreadyExists { kind, key },
        (Some(409), Operation::Update) => StoreError::Conflict { kind, key },
        _ => StoreError::Transport {
            operation,
            kind,
            key,
            source: error.into(),
        },
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<ManagedObject, StoreError> {
        let object = self
            .api(descriptor, &key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| classify(e, Operation::Get, descriptor, key))?;
        from_dynamic(descriptor, key, &object)
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let key = object.key();
        let created = self
            .api(descriptor, &key.namespace)
            .create(&PostParams::default(), &to_dynamic(descriptor, object)?)
            .await
            .map_err(|e| classify(e, Operation::Create, descriptor, &key))?;
        from_dynamic(descriptor, &key, &created)
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError> {
        let key = object.key();
        let replaced = self
            .api(descriptor, &key.namespace)
            .replace(&key.name, &PostParams::default(), &to_dynamic(descriptor, object)?)
            .await
            .map_err(|e| classify(e, Operation::Update, descriptor, &key))?;
        from_dynamic(descriptor, &key, &replaced)
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        let outcome = self
            .api(descriptor, &key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, Operation::Delete, descriptor, key))?;
        if outcome.is_left() {
            debug!(kind = descriptor.kind, key = %key, "Deletion in progress (finalizers pending)");
        }
        Ok(())
    }
}
