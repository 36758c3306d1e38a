//! vals-operator Provider Library
//!
//! Declarative create-or-update of vals-operator resources (`ValsSecret`,
//! `DbSecret`) on Kubernetes, plus read-back of their observed state.
//!
//! ## Quick Start
//!
//! ```rust
//! use vals_operator_provider::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod codec;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
