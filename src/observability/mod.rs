//! # Observability
//!
//! - `metrics`: Prometheus counters and histograms for store operations
//! - `logging`: tracing subscriber setup

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::*;
