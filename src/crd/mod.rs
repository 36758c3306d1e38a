//! # Resource Kinds
//!
//! The vals-operator resources managed by the provider, and the core
//! `Secret` they render.
//!
//! ## Module Structure
//!
//! - `vals_secret.rs` - `ValsSecret` desired state, wire layout and lookup projection
//! - `db_secret.rs` - `DbSecret` desired state and wire layout
//! - `secret.rs` - read-only projection of core `Secret` objects
//!
//! Each kind binds a descriptor and a field layout to the codec; nothing else
//! about a kind is known to the reconciler.

mod db_secret;
mod secret;
mod vals_secret;

pub use db_secret::{
    DbSecret, DbSecretSpec, DbSecretWire, RolloutKind, RolloutTarget, VaultSettings,
};
pub use secret::SecretLookup;
pub use vals_secret::{
    default_secret_type, default_ttl, DataRef, SecretReference, SecretSummary, TemplateEntry,
    ValsSecret, ValsSecretLookup, ValsSecretSpec, ValsSecretWire,
};
