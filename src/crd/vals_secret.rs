//! # ValsSecret
//!
//! A Kubernetes secret rendered by vals-operator from external references
//! (`digitalis.io/v1`, plural `valssecrets`).

use crate::codec::{ObjectKey, ResourceDescriptor, ResourceKind};
use crate::constants::{DEFAULT_SECRET_TTL_SECS, DEFAULT_SECRET_TYPE, VALS_OPERATOR_GROUP};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One external value pulled into the secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretReference {
    /// Key of the entry in the rendered secret
    pub name: String,
    /// vals reference, e.g. `ref+vault://secret/data/app#password`
    #[serde(rename = "ref")]
    pub reference: String,
    /// Encoding of the fetched value (`text`, `base64`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// A named Go template rendered into the secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TemplateEntry {
    pub name: String,
    pub value: String,
}

/// Desired state of a `ValsSecret`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ValsSecretSpec {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub secret_ref: Vec<SecretReference>,
    #[serde(default)]
    pub template: Vec<TemplateEntry>,
    /// Kubernetes secret type
    #[serde(rename = "type", default = "default_secret_type")]
    pub secret_type: String,
    /// Seconds before the secret is re-rendered
    #[serde(default = "default_ttl")]
    pub ttl: i64,
}

pub fn default_secret_type() -> String {
    DEFAULT_SECRET_TYPE.to_string()
}

pub fn default_ttl() -> i64 {
    DEFAULT_SECRET_TTL_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataRef {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// `spec` payload of a `ValsSecret` document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValsSecretWire {
    /// Name of the rendered secret; the same as the object name
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    #[serde(rename = "type", default = "default_secret_type")]
    pub secret_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, DataRef>,
    #[serde(default)]
    pub template: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ValsSecret;

impl ResourceKind for ValsSecret {
    const DESCRIPTOR: ResourceDescriptor =
        ResourceDescriptor::new(VALS_OPERATOR_GROUP, "v1", "valssecrets", "ValsSecret");

    type Spec = ValsSecretSpec;
    type Wire = ValsSecretWire;

    fn identity(spec: &ValsSecretSpec) -> ObjectKey {
        ObjectKey::new(&spec.namespace, &spec.name)
    }

    fn to_wire(spec: &ValsSecretSpec) -> ValsSecretWire {
        ValsSecretWire {
            name: spec.name.clone(),
            ttl: spec.ttl,
            secret_type: spec.secret_type.clone(),
            data: spec
                .secret_ref
                .iter()
                .map(|r| {
                    (
                        r.name.clone(),
                        DataRef {
                            reference: r.reference.clone(),
                            encoding: r.encoding.clone(),
                        },
                    )
                })
                .collect(),
            template: spec
                .template
                .iter()
                .map(|t| (t.name.clone(), t.value.clone()))
                .collect(),
        }
    }

    fn from_wire(key: ObjectKey, wire: ValsSecretWire) -> ValsSecretSpec {
        ValsSecretSpec {
            name: key.name,
            namespace: key.namespace,
            secret_ref: wire
                .data
                .into_iter()
                .map(|(name, data)| SecretReference {
                    name,
                    reference: data.reference,
                    encoding: data.encoding,
                })
                .collect(),
            template: wire
                .template
                .into_iter()
                .map(|(name, value)| TemplateEntry { name, value })
                .collect(),
            secret_type: wire.secret_type,
            ttl: wire.ttl,
        }
    }
}

/// Read-only view of a secret for lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct SecretSummary {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub secret_type: String,
}

impl SecretSummary {
    /// A missing or empty type reads as `Opaque`
    pub(crate) fn from_parts(key: ObjectKey, wire: SecretSummaryWire) -> Self {
        Self {
            name: key.name,
            namespace: key.namespace,
            secret_type: wire
                .secret_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_secret_type),
        }
    }

    pub(crate) fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub(crate) fn to_wire(&self) -> SecretSummaryWire {
        SecretSummaryWire {
            secret_type: Some(self.secret_type.clone()),
        }
    }
}

/// Only `type` is read; everything else in the payload is ignored
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecretSummaryWire {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
}

/// The lookup binding: same descriptor, projected layout
#[derive(Debug)]
pub struct ValsSecretLookup;

impl ResourceKind for ValsSecretLookup {
    const DESCRIPTOR: ResourceDescriptor = ValsSecret::DESCRIPTOR;

    type Spec = SecretSummary;
    type Wire = SecretSummaryWire;

    fn identity(summary: &SecretSummary) -> ObjectKey {
        summary.key()
    }

    fn to_wire(summary: &SecretSummary) -> SecretSummaryWire {
        summary.to_wire()
    }

    fn from_wire(key: ObjectKey, wire: SecretSummaryWire) -> SecretSummary {
        SecretSummary::from_parts(key, wire)
    }
}
