//! # Secret
//!
//! Read-only binding of the core `v1` `Secret`. Only name, namespace and type
//! are decoded; the secret data itself is never read into the model.

use crate::codec::{ObjectKey, Payload, ResourceDescriptor, ResourceKind};
use crate::crd::vals_secret::{SecretSummary, SecretSummaryWire};

#[derive(Debug)]
pub struct SecretLookup;

impl ResourceKind for SecretLookup {
    const DESCRIPTOR: ResourceDescriptor = ResourceDescriptor::new("", "v1", "secrets", "Secret");
    const PAYLOAD: Payload = Payload::Root;

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
