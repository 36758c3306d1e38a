//! # Controller
//!
//! - `reconciler`: get-then-create-or-update convergence of one object
//! - `cancel`: deadline and cancellation for an invocation

pub mod cancel;
pub mod reconciler;

pub use cancel::{Cancellation, Cancelled};
pub use reconciler::{Applied, ReconcileError, Reconciler, UpsertOutcome};
