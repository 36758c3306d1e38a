//! # Object Store
//!
//! Generic access to namespaced objects addressed by a [`ResourceDescriptor`].
//!
//! Implementations carry no business logic. Their one obligation is to report
//! a missing object as [`StoreError::NotFound`] and nothing else, since the
//! reconciler branches on exactly that.
//!
//! - `kubernetes`: the Kubernetes API implementation

pub mod kubernetes;

pub use kubernetes::KubeObjectStore;

use crate::codec::{ManagedObject, ObjectKey, ResourceDescriptor};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} was modified since it was read")]
    Conflict { kind: &'static str, key: ObjectKey },

    #[error("{operation} {kind} {key} failed: {source}")]
    Transport {
        operation: Operation,
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("store returned a malformed {kind} {key}: {source}")]
    Malformed {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Lost races with a concurrent writer; the caller may simply try again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::Conflict { .. })
    }
}

/// Get/create/update/delete of namespaced objects.
///
/// `create` and `update` take the namespace and name from the document;
/// `update` requires the version token from a prior `get`.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        key: &ObjectKey,
    ) -> Result<ManagedObject, StoreError>;

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError>;

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ManagedObject,
    ) -> Result<ManagedObject, StoreError>;

    async fn delete(&self, descriptor: &ResourceDescriptor, key: &ObjectKey)
        -> Result<(), StoreError>;
}
