//! # DbSecret
//!
//! Rotating database credentials issued by Vault
//! (`digitalis.io/v1beta1`, plural `dbsecrets`).
//!
//! After each rotation vault-operator restarts the rollout targets so the
//! workloads pick up the new credentials.

use crate::codec::{ObjectKey, ResourceDescriptor, ResourceKind};
use crate::constants::VALS_OPERATOR_GROUP;
use crate::crd::vals_secret::TemplateEntry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RolloutKind {
    #[serde(alias = "deployment")]
    Deployment,
    #[serde(alias = "statefulset")]
    StatefulSet,
}

impl fmt::Display for RolloutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => f.write_str("Deployment"),
            Self::StatefulSet => f.write_str("StatefulSet"),
        }
    }
}

/// Workload restarted after a credential rotation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RolloutTarget {
    pub kind: RolloutKind,
    pub name: String,
}

/// Desired state of a `DbSecret`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DbSecretSpec {
    pub name: String,
    pub namespace: String,
    /// Vault database role issuing the credentials
    pub vault_role: String,
    /// Mount path of the Vault database secrets engine
    pub vault_mount: String,
    #[serde(default)]
    pub template: Vec<TemplateEntry>,
    #[serde(default)]
    pub rollout: Vec<RolloutTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VaultSettings {
    pub role: String,
    pub mount: String,
}

/// `spec` payload of a `DbSecret` document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DbSecretWire {
    pub vault: VaultSettings,
    #[serde(default)]
    pub template: BTreeMap<String, String>,
    #[serde(default)]
    pub rollout: Vec<RolloutTarget>,
}

#[derive(Debug)]
pub struct DbSecret;

impl ResourceKind for DbSecret {
    const DESCRIPTOR: ResourceDescriptor =
        ResourceDescriptor::new(VALS_OPERATOR_GROUP, "v1beta1", "dbsecrets", "DbSecret");

    type Spec = DbSecretSpec;
    type Wire = DbSecretWire;

    fn identity(spec: &DbSecretSpec) -> ObjectKey {
        ObjectKey::new(&spec.namespace, &spec.name)
    }

    fn to_wire(spec: &DbSecretSpec) -> DbSecretWire {
        DbSecretWire {
            vault: VaultSettings {
                role: spec.vault_role.clone(),
                mount: spec.vault_mount.clone(),
            },
            template: spec
                .template
                .iter()
                .map(|t| (t.name.clone(), t.value.clone()))
                .collect(),
            rollout: spec.rollout.clone(),
        }
    }

    fn from_wire(key: ObjectKey, wire: DbSecretWire) -> DbSecretSpec {
        DbSecretSpec {
            name: key.name,
            namespace: key.namespace,
            vault_role: wire.vault.role,
            vault_mount: wire.vault.mount,
            template: wire
                .template
                .into_iter()
                .map(|(name, value)| TemplateEntry { name, value })
                .collect(),
            rollout: wire.rollout,
        }
    }
}
