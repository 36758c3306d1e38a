//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use vals_operator_provider::prelude::*;
//! ```
//!
//! This brings into scope:
//! - Resource kinds and their desired-state models
//! - The codec binding trait and document types
//! - The store trait and its errors
//! - Reconciler, runtime and config types

// Resource kinds - most commonly used
pub use crate::crd::*;

// Codec - needed for implementing new kinds
pub use crate::codec::{ManagedObject, ObjectKey, Payload, ResourceDescriptor, ResourceKind};

// Store - needed for implementing new backends
pub use crate::store::{KubeObjectStore, ObjectStore, StoreError};

// Reconciler types - core provider functionality
pub use crate::controller::{Applied, Cancellation, Cancelled, ReconcileError, Reconciler, UpsertOutcome};

// Config and runtime
pub use crate::config::{ConfigError, ConnectionConfig, ProviderConfig, RuntimeSettings};
pub use crate::runtime::{ApplyReport, ObservedState, ProviderRuntime, ResourceType, RuntimeError};
