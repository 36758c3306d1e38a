//! # Model Codec
//!
//! Maps typed desired-state models onto the generic document exchanged with the
//! object store, and decodes store responses back into the typed model.
//!
//! Each resource kind declares a [`ResourceKind`] binding: its descriptor, its
//! desired-state type and the serde layout of its payload. Encoding and
//! decoding are then plain serde conversions through that layout.
//!
//! ## Document Shape
//!
//! ```yaml
//! apiVersion: <group>/<version>
//! kind: <Kind>
//! metadata: { name, namespace, resourceVersion? }
//! spec: { ...kind-specific layout... }
//! ```
//!
//! Core kinds such as `Secret` have no `spec`; their payload sits next to
//! `metadata` ([`Payload::Root`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Addresses one object kind in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    pub group: &'static str,
    pub version: &'static str,
    /// Plural resource name used in request paths
    pub plural: &'static str,
    /// Kind stamped on new documents
    pub kind: &'static str,
}

impl ResourceDescriptor {
    /// # Panics
    ///
    /// When `version`, `plural` or `kind` is empty. Descriptors are constants,
    /// so this fails the build rather than a request.
    #[must_use]
    pub const fn new(
        group: &'static str,
        version: &'static str,
        plural: &'static str,
        kind: &'static str,
    ) -> Self {
        assert!(!version.is_empty(), "resource descriptor needs a version");
        assert!(!plural.is_empty(), "resource descriptor needs a plural name");
        assert!(!kind.is_empty(), "resource descriptor needs a kind");
        Self {
            group,
            version,
            plural,
            kind,
        }
    }

    /// `group/version`, or just `version` for the core group
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.plural, self.group, self.version)
    }
}

/// Identity of a managed object. Immutable for the object's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (namespace, name) = value.split_once('/')?;
        (!namespace.is_empty() && !name.is_empty() && !name.contains('/'))
            .then(|| Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Version token; only ever copied from a prior read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// The generic document exchanged with the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedObject {
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
    /// Every other top-level field (`type`, `data`, `status`, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ManagedObject {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata
            .resource_version
            .as_deref()
            .filter(|v| !v.is_empty())
    }
}

/// Where a kind keeps its payload in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Under `spec`, as custom resources do
    Spec,
    /// Beside `metadata`, as core kinds do
    Root,
}

/// Binding of one resource kind to the generic document
pub trait ResourceKind {
    const DESCRIPTOR: ResourceDescriptor;

    const PAYLOAD: Payload = Payload::Spec;

    /// Typed desired/observed state
    type Spec: Clone + fmt::Debug + Send + Sync;

    /// Serde layout of the payload
    type Wire: Serialize + DeserializeOwned;

    fn identity(spec: &Self::Spec) -> ObjectKey;

    fn to_wire(spec: &Self::Spec) -> Self::Wire;

    /// Rebuild the typed model; identity comes from the document metadata
    fn from_wire(key: ObjectKey, wire: Self::Wire) -> Self::Spec;
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{kind} {key} needs a non-empty name and namespace")]
    MissingIdentity { kind: &'static str, key: ObjectKey },

    #[error("failed to encode {kind} {key}: {source}")]
    Encode {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {kind} {key}: {source}")]
    Decode {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} for {key}, store returned {actual}")]
    KindMismatch {
        expected: String,
        actual: String,
        key: ObjectKey,
    },
}

/// Build the desired document. No version token is set.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn encode<K: ResourceKind>(spec: &K::Spec) -> Result<ManagedObject, CodecError> {
    let key = K::identity(spec);
    if key.name.is_empty() || key.namespace.is_empty() {
        return Err(CodecError::MissingIdentity {
            kind: K::DESCRIPTOR.kind,
            key,
        });
    }

    let payload = serde_json::to_value(K::to_wire(spec)).map_err(|source| CodecError::Encode {
        kind: K::DESCRIPTOR.kind,
        key: key.clone(),
        source,
    })?;
    let (spec, fields) = match (K::PAYLOAD, payload) {
        (Payload::Root, Value::Object(fields)) => (Value::Null, fields),
        (_, payload) => (payload, Map::new()),
    };

    Ok(ManagedObject {
        api_version: K::DESCRIPTOR.api_version(),
        kind: K::DESCRIPTOR.kind.to_string(),
        metadata: ObjectMeta {
            name: key.name,
            namespace: key.namespace,
            resource_version: None,
        },
        spec,
        fields,
    })
}

/// Decode a store document. Absent optional fields take their documented
/// defaults; anything else that does not fit the layout is an error.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn decode<K: ResourceKind>(object: &ManagedObject) -> Result<K::Spec, CodecError> {
    let key = object.key();
    let expected = K::DESCRIPTOR.api_version();
    let kind_matches = object.kind.is_empty() || object.kind == K::DESCRIPTOR.kind;
    if object.api_version != expected || !kind_matches {
        return Err(CodecError::KindMismatch {
            expected: format!("{expected} {}", K::DESCRIPTOR.kind),
            actual: format!("{} {}", object.api_version, object.kind),
            key,
        });
    }

    let decoded = match K::PAYLOAD {
        Payload::Spec => K::Wire::deserialize(&object.spec),
        Payload::Root => K::Wire::deserialize(&Value::Object(object.fields.clone())),
    };
    let wire = decoded.map_err(|source| CodecError::Decode {
        kind: K::DESCRIPTOR.kind,
        key: key.clone(),
        source,
    })?;
    Ok(K::from_wire(key, wire))
}
